//! Hour-of-day → named period classification.
//!
//! One algorithm, parameterised by a [`PeriodTable`], serves both the internal
//! vocabulary used as histogram keys and the localized labels shown to users.

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;

/// Inclusive hour interval `[start, end]`.  `start > end` wraps midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub name: &'static str,
    pub start: u32,
    pub end: u32,
}

impl Period {
    pub const fn new(name: &'static str, start: u32, end: u32) -> Self {
        Self { name, start, end }
    }

    pub fn contains(&self, hour: u32) -> bool {
        if self.start <= self.end {
            hour >= self.start && hour <= self.end
        } else {
            // Wraps midnight (e.g. 22 – 4)
            hour >= self.start || hour <= self.end
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PeriodTable {
    pub periods: &'static [Period],
    /// Returned when no interval matches.
    pub fallback: &'static str,
}

impl PeriodTable {
    pub fn classify(&self, hour: u32) -> &'static str {
        classify(hour, self)
    }
}

pub const NIGHT: &str = "night";

pub const INTERNAL_PERIODS: PeriodTable = PeriodTable {
    periods: &[
        Period::new("morning", 5, 11),
        Period::new("afternoon", 12, 17),
        Period::new("evening", 18, 21),
        Period::new(NIGHT, 22, 4),
    ],
    fallback: NIGHT,
};

pub const LOCALIZED_PERIODS: PeriodTable = PeriodTable {
    periods: &[
        Period::new("mañana", 5, 11),
        Period::new("tarde", 12, 17),
        Period::new("atardecer", 18, 21),
        Period::new("noche", 22, 4),
    ],
    fallback: "noche",
};

/// First matching interval wins; unmatched hours get the table's fallback.
pub fn classify(hour: u32, table: &PeriodTable) -> &'static str {
    table
        .periods
        .iter()
        .find(|period| period.contains(hour))
        .map(|period| period.name)
        .unwrap_or(table.fallback)
}

/// Hour of day for `at` as seen in `tz`.
pub fn local_hour(at: DateTime<Utc>, tz: Tz) -> u32 {
    at.with_timezone(&tz).hour()
}

/// Parse an IANA timezone name, falling back to UTC.
pub fn parse_timezone(name: &str) -> Tz {
    name.parse().unwrap_or_else(|_| {
        tracing::warn!(tz = %name, "unrecognised timezone, falling back to UTC");
        chrono_tz::UTC
    })
}
