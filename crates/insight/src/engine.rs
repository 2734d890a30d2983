use std::sync::Arc;
use std::time::Duration;

use chrono_tz::Tz;
use sentir_config::{InsightConfig, StorageBackend};
use tracing::{info, warn};

use crate::context::ContextAggregator;
use crate::error::Result;
use crate::period::parse_timezone;
use crate::progress::ProgressTracker;
use crate::recorder::InteractionRecorder;
use crate::report::ReportGenerator;
use crate::schema::MAX_HISTORY_CAPACITY;
use crate::store::{InsightRepository, MemoryRepository, RedbRepository};

/// Resolved runtime limits shared by every service.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub history_capacity: usize,
    pub context_window: usize,
    pub store_timeout: Duration,
    pub timezone: Tz,
    pub top_n: usize,
    pub summary_days: i64,
    pub recent_insights_limit: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&InsightConfig::default())
    }
}

impl From<&InsightConfig> for EngineSettings {
    fn from(config: &InsightConfig) -> Self {
        let history_capacity = config.history.capacity.clamp(1, MAX_HISTORY_CAPACITY);
        if history_capacity != config.history.capacity {
            warn!(
                configured = config.history.capacity,
                used = history_capacity,
                "history capacity out of range, clamped"
            );
        }
        Self {
            history_capacity,
            context_window: config.history.context_window,
            store_timeout: Duration::from_millis(config.storage.timeout_ms),
            timezone: parse_timezone(&config.history.timezone),
            top_n: config.reports.top_n,
            summary_days: config.reports.summary_days,
            recent_insights_limit: config.reports.recent_insights_limit,
        }
    }
}

/// The four services wired to one shared repository.
///
/// Services hold no per-request state, so one engine can serve any number of
/// concurrent callers.
pub struct InsightEngine {
    recorder: InteractionRecorder,
    context: ContextAggregator,
    progress: ProgressTracker,
    reports: ReportGenerator,
}

impl InsightEngine {
    pub fn new(repo: Arc<dyn InsightRepository>, settings: EngineSettings) -> Self {
        Self {
            recorder: InteractionRecorder::new(Arc::clone(&repo), settings.clone()),
            context: ContextAggregator::new(Arc::clone(&repo), settings.clone()),
            progress: ProgressTracker::new(Arc::clone(&repo), settings.clone()),
            reports: ReportGenerator::new(repo, settings),
        }
    }

    /// Build the configured repository and wire the services to it.
    pub fn from_config(config: &InsightConfig) -> Result<Self> {
        let repo: Arc<dyn InsightRepository> = match config.storage.backend {
            StorageBackend::Redb => Arc::new(RedbRepository::open(&config.storage.path)?),
            StorageBackend::Memory => Arc::new(MemoryRepository::new()),
        };
        info!(
            backend = ?config.storage.backend,
            capacity = config.history.capacity,
            timezone = %config.history.timezone,
            "insight engine ready"
        );
        Ok(Self::new(repo, EngineSettings::from(config)))
    }

    pub fn recorder(&self) -> &InteractionRecorder {
        &self.recorder
    }

    pub fn context(&self) -> &ContextAggregator {
        &self.context
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    pub fn reports(&self) -> &ReportGenerator {
        &self.reports
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::progress::SessionMessage;
    use crate::recorder::ConversationMessage;

    #[test]
    fn settings_follow_config() {
        let mut config = InsightConfig::default();
        config.history.capacity = 7;
        config.history.timezone = "Europe/Madrid".to_string();
        config.storage.timeout_ms = 150;
        let settings = EngineSettings::from(&config);
        assert_eq!(settings.history_capacity, 7);
        assert_eq!(settings.store_timeout, Duration::from_millis(150));
        assert_eq!(settings.timezone, chrono_tz::Europe::Madrid);
    }

    #[tokio::test]
    async fn history_capacity_never_exceeds_fifty() {
        let mut config = InsightConfig::default();
        config.history.capacity = 500;
        let settings = EngineSettings::from(&config);
        assert_eq!(settings.history_capacity, MAX_HISTORY_CAPACITY);

        config.history.capacity = 0;
        assert_eq!(EngineSettings::from(&config).history_capacity, 1);

        config.history.capacity = 500;
        let repo = Arc::new(MemoryRepository::new());
        let engine = InsightEngine::new(repo.clone(), EngineSettings::from(&config));
        let message = ConversationMessage::new("again");
        for _ in 0..60 {
            engine
                .recorder()
                .record_interaction("u1", &message, &json!({}))
                .await
                .unwrap();
        }
        let insight = repo.load_insight("u1").await.unwrap().unwrap();
        assert_eq!(insight.interactions.len(), MAX_HISTORY_CAPACITY);
    }

    #[tokio::test]
    async fn redb_backed_engine_serves_every_operation() {
        let dir = TempDir::new().unwrap();
        let mut config = InsightConfig::default();
        config.storage.path = dir.path().join("engine.redb").display().to_string();
        let engine = InsightEngine::from_config(&config).unwrap();

        let message = ConversationMessage::new("I couldn't sleep again");
        let analysis = json!({ "emotional": { "mainEmotion": "anxious", "intensity": 8 } });
        let recorded = engine
            .recorder()
            .record_interaction("u1", &message, &analysis)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(recorded.emotion, "anxious");

        let bundle = engine
            .context()
            .get_relevant_context("u1", "still tired", &analysis)
            .await
            .unwrap();
        assert_eq!(bundle.patterns.frequency.last_24h, 1);

        let session: SessionMessage = serde_json::from_value(json!({
            "content": "session wrap-up",
            "context": { "topic": "sleep", "emotional": { "mainEmotion": "anxious" } }
        }))
        .unwrap();
        engine.progress().track_progress("u1", &session).await.unwrap().unwrap();

        let report = engine.reports().generate_report("u1").await.unwrap();
        assert_eq!(report.total_sessions, 1);
        assert_eq!(report.common_topics[0].topic, "sleep");
    }

    #[tokio::test]
    async fn memory_backend_needs_no_files() {
        let mut config = InsightConfig::default();
        config.storage.backend = StorageBackend::Memory;
        config.storage.path = "/nonexistent/never/created.redb".to_string();
        let engine = InsightEngine::from_config(&config).unwrap();
        let summary = engine.reports().progress_summary("u1", None).await.unwrap();
        assert_eq!(summary.recent_progress.total_sessions, 0);
    }
}
