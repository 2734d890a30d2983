//! Frequency tables and the top-N rule shared by every ranked list.
//!
//! Ties are always broken by first-encountered order: accumulators keep keys
//! in insertion order and [`top_n`] uses a stable sort.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Ordered `key → count` association list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    items: Vec<(String, usize)>,
    index: HashMap<String, usize>,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: &str) {
        self.add_n(key, 1);
    }

    pub fn add_n(&mut self, key: &str, n: usize) {
        match self.index.get(key) {
            Some(&pos) => self.items[pos].1 += n,
            None => {
                self.index.insert(key.to_string(), self.items.len());
                self.items.push((key.to_string(), n));
            }
        }
    }

    pub fn get(&self, key: &str) -> usize {
        self.index.get(key).map(|&pos| self.items[pos].1).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Entries in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.items.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|(k, _)| k.as_str())
    }

    /// The `n` most frequent keys, ties in first-seen order.
    pub fn top(&self, n: usize) -> Vec<(String, usize)> {
        top_n(self.items.clone(), n, |(_, count)| *count as f64)
    }
}

impl<S: AsRef<str>> FromIterator<S> for Tally {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut tally = Self::new();
        for key in iter {
            tally.add(key.as_ref());
        }
        tally
    }
}

impl Serialize for Tally {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.items.len()))?;
        for (key, count) in &self.items {
            map.serialize_entry(key, count)?;
        }
        map.end()
    }
}

/// Ordered `key → (sum, occurrences)` accumulator for per-key averages.
#[derive(Debug, Clone, Default)]
pub struct Averager {
    items: Vec<(String, f64, usize)>,
    index: HashMap<String, usize>,
}

impl Averager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: &str, value: f64) {
        match self.index.get(key) {
            Some(&pos) => {
                self.items[pos].1 += value;
                self.items[pos].2 += 1;
            }
            None => {
                self.index.insert(key.to_string(), self.items.len());
                self.items.push((key.to_string(), value, 1));
            }
        }
    }

    /// `sum / occurrences` per key, in first-seen order.
    pub fn averages(&self) -> Vec<(String, f64)> {
        self.items
            .iter()
            .map(|(key, sum, count)| (key.clone(), sum / *count as f64))
            .collect()
    }

    pub fn top(&self, n: usize) -> Vec<(String, f64)> {
        top_n(self.averages(), n, |(_, avg)| *avg)
    }
}

/// Stable-sort `items` by descending `metric` and keep the first `n`.
pub fn top_n<T, F>(mut items: Vec<T>, n: usize, metric: F) -> Vec<T>
where
    F: Fn(&T) -> f64,
{
    items.sort_by(|a, b| metric(b).partial_cmp(&metric(a)).unwrap_or(Ordering::Equal));
    items.truncate(n);
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ties_keep_first_insertion_order() {
        let tally: Tally = ["a", "b", "a", "c", "b", "a", "b"].into_iter().collect();
        assert_eq!(tally.get("a"), 3);
        assert_eq!(tally.get("b"), 3);
        let top = tally.top(2);
        assert_eq!(top, vec![("a".to_string(), 3), ("b".to_string(), 3)]);
    }

    #[test]
    fn ties_are_not_alphabetical() {
        let tally: Tally = ["zeta", "alpha", "zeta", "alpha", "mid"].into_iter().collect();
        let keys: Vec<String> = tally.top(5).into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn higher_counts_outrank_earlier_keys() {
        let tally: Tally = ["x", "y", "y", "z", "z", "z"].into_iter().collect();
        let keys: Vec<String> = tally.top(3).into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["z", "y", "x"]);
    }

    #[test]
    fn averager_ranks_by_mean_with_stable_ties() {
        let mut avg = Averager::new();
        avg.add("breathing", 4.0);
        avg.add("journaling", 5.0);
        avg.add("breathing", 2.0);
        avg.add("walking", 3.0);
        let top = avg.top(5);
        assert_eq!(top[0], ("journaling".to_string(), 5.0));
        // breathing (3.0) was seen before walking (3.0)
        assert_eq!(top[1], ("breathing".to_string(), 3.0));
        assert_eq!(top[2], ("walking".to_string(), 3.0));
    }

    #[test]
    fn top_truncates_to_n() {
        let tally: Tally = (0..10).map(|i| format!("k{i}")).collect();
        assert_eq!(tally.top(5).len(), 5);
        assert_eq!(tally.top(0).len(), 0);
    }

    #[test]
    fn serializes_as_ordered_map() {
        let tally: Tally = ["sad", "happy", "sad"].into_iter().collect();
        let json = serde_json::to_string(&tally).unwrap();
        assert_eq!(json, r#"{"sad":2,"happy":1}"#);
    }
}
