//! Emotional trend and pattern detection over a recency-ordered slice.
//!
//! Works over anything implementing [`EmotionSample`], so the same analysis
//! runs on raw interactions and on progress entries.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ranking::Tally;
use crate::schema::{Interaction, NEUTRAL_EMOTION, ProgressEntry};

/// Intensities strictly above this count as high.
pub const HIGH_INTENSITY_ABOVE: u8 = 7;
/// Intensities strictly below this count as low.
pub const LOW_INTENSITY_BELOW: u8 = 4;

pub trait EmotionSample {
    fn emotion(&self) -> &str;
    fn intensity(&self) -> u8;
    fn timestamp(&self) -> DateTime<Utc>;
}

impl EmotionSample for Interaction {
    fn emotion(&self) -> &str {
        self.main_emotion().unwrap_or(NEUTRAL_EMOTION)
    }

    fn intensity(&self) -> u8 {
        self.intensity
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl EmotionSample for ProgressEntry {
    fn emotion(&self) -> &str {
        let label = self.emotional_state.main_emotion.as_str();
        if label.is_empty() { NEUTRAL_EMOTION } else { label }
    }

    fn intensity(&self) -> u8 {
        self.emotional_state.intensity
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntensityBuckets {
    #[serde(rename = "alta")]
    pub high: usize,
    #[serde(rename = "baja")]
    pub low: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmotionalPatterns {
    #[serde(rename = "intensidad")]
    pub intensity: IntensityBuckets,
    /// Emotions in order with consecutive repeats collapsed.
    #[serde(rename = "fluctuación")]
    pub fluctuation: Vec<String>,
    #[serde(rename = "emocionesDominantes")]
    pub dominant_emotions: Tally,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionPoint {
    pub emotion: String,
    pub intensity: u8,
    pub timestamp: DateTime<Utc>,
}

impl EmotionPoint {
    fn of<S: EmotionSample>(sample: &S) -> Self {
        Self {
            emotion: sample.emotion().to_string(),
            intensity: sample.intensity(),
            timestamp: sample.timestamp(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionalTrend {
    pub latest: Option<EmotionPoint>,
    pub history: Vec<EmotionPoint>,
    pub patterns: EmotionalPatterns,
}

/// `samples` must be ordered most recent first.
pub fn analyze_emotional_trend<S: EmotionSample>(samples: &[S]) -> EmotionalTrend {
    let history: Vec<EmotionPoint> = samples.iter().map(EmotionPoint::of).collect();
    EmotionalTrend {
        latest: history.first().cloned(),
        patterns: detect_emotional_patterns(samples),
        history,
    }
}

/// Single pass computing intensity buckets, the fluctuation sequence and
/// per-emotion frequencies.  Empty input yields the zeroed structure.
pub fn detect_emotional_patterns<S: EmotionSample>(samples: &[S]) -> EmotionalPatterns {
    let mut patterns = EmotionalPatterns::default();

    for sample in samples {
        let intensity = sample.intensity();
        if intensity > HIGH_INTENSITY_ABOVE {
            patterns.intensity.high += 1;
        } else if intensity < LOW_INTENSITY_BELOW {
            patterns.intensity.low += 1;
        }

        let emotion = sample.emotion();
        patterns.dominant_emotions.add(emotion);

        // Compare against the last appended value, not the previous sample.
        if patterns.fluctuation.last().map(String::as_str) != Some(emotion) {
            patterns.fluctuation.push(emotion.to_string());
        }
    }

    patterns
}
