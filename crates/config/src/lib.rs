use std::env;
use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

// ── Storage backend ───────────────────────────────────────────────────────────

/// Which repository implementation backs the insight documents.
///
/// | Backend  | Behaviour                                                    |
/// |----------|--------------------------------------------------------------|
/// | `redb`   | Durable single-file database at `storage.path`.              |
/// | `memory` | Process-local maps; everything is lost on shutdown.          |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Redb,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Database file used by the `redb` backend.  Overridden at runtime by
    /// the `SENTIR_STORAGE_PATH` environment variable when set.
    pub path: String,
    /// Upper bound for every single store read or write, in milliseconds.
    /// A call that exceeds it is abandoned and treated as a storage failure.
    pub timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Redb,
            path: ".sentir/insight.redb".to_string(),
            timeout_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum interactions kept per user, between 1 and 50.  Older entries
    /// are evicted first.
    pub capacity: usize,
    /// Number of recent interactions read when assembling a context bundle.
    pub context_window: usize,
    /// IANA timezone name (e.g. `"America/Mexico_City"`) used to derive the
    /// hour of day for period and time-of-day bucketing.
    /// Falls back to UTC when the name is unrecognised.
    pub timezone: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            context_window: 10,
            timezone: "UTC".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportsConfig {
    /// Length of every ranked list (emotions, topics, coping strategies).
    pub top_n: usize,
    /// Default look-back window for progress summaries.
    pub summary_days: i64,
    /// Maximum insights returned in a progress summary.
    pub recent_insights_limit: usize,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            top_n: 5,
            summary_days: 30,
            recent_insights_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct InsightConfig {
    pub storage: StorageConfig,
    pub history: HistoryConfig,
    pub reports: ReportsConfig,
    pub telemetry: TelemetryConfig,
}

impl InsightConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }

        config.apply_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    /// Apply `SENTIR_*` overrides.  Empty values are ignored so an exported
    /// but blank variable never wipes a configured setting.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(path) = non_empty("SENTIR_STORAGE_PATH") {
            self.storage.path = path;
        }
        if let Some(level) = non_empty("SENTIR_LOG_LEVEL") {
            self.telemetry.log_level = level;
        }
        if let Some(tz) = non_empty("SENTIR_TIMEZONE") {
            self.history.timezone = tz;
        }
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
