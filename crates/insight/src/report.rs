//! Read-side reports for UI consumers.
//!
//! Both operations work over `entries` directly; the stored
//! `overallMetrics` may lag behind and is only echoed back by the summary.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::warn;

use crate::engine::EngineSettings;
use crate::error::Result;
use crate::guard::validate_user_id;
use crate::progress::{average_intensity, compute_overall_metrics, rank_emotions, rank_topics};
use crate::schema::{
    EmotionFrequency, Goal, GoalStatus, OverallMetrics, ProgressEntry, SessionInsight,
    TopicFrequency, UserProgress,
};
use crate::store::{InsightRepository, with_timeout};
use crate::trend::{EmotionalTrend, analyze_emotional_trend};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub total_sessions: usize,
    pub average_intensity: f64,
    pub common_emotions: Vec<EmotionFrequency>,
    pub common_topics: Vec<TopicFrequency>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentProgress {
    pub total_sessions: usize,
    pub emotional_trends: EmotionalTrend,
    pub active_goals: Vec<Goal>,
    pub recent_insights: Vec<SessionInsight>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub recent_progress: RecentProgress,
    /// Always computed over the full history.
    pub overall_metrics: OverallMetrics,
}

pub fn build_report(entries: &[ProgressEntry], top_n: usize) -> ProgressReport {
    ProgressReport {
        total_sessions: entries.len(),
        average_intensity: average_intensity(entries),
        common_emotions: rank_emotions(entries, top_n),
        common_topics: rank_topics(entries, top_n),
    }
}

/// Start of a `days`-long window ending at `now`.  Negative windows are
/// empty (start at `now`); windows reaching past the representable range
/// start at the earliest representable instant.
pub fn window_start(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    Duration::try_days(days.max(0))
        .and_then(|span| now.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub fn build_summary(
    progress: &UserProgress,
    now: DateTime<Utc>,
    days: i64,
    top_n: usize,
    insights_limit: usize,
) -> ProgressSummary {
    let since = window_start(now, days);
    let mut recent: Vec<ProgressEntry> = progress
        .entries
        .iter()
        .filter(|e| e.timestamp >= since)
        .cloned()
        .collect();
    recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let mut insights: Vec<SessionInsight> = recent
        .iter()
        .flat_map(|e| e.insights.iter().cloned())
        .collect();
    insights.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    insights.truncate(insights_limit);

    ProgressSummary {
        recent_progress: RecentProgress {
            total_sessions: recent.len(),
            emotional_trends: analyze_emotional_trend(&recent),
            active_goals: progress
                .goals
                .iter()
                .filter(|g| g.status == GoalStatus::InProgress)
                .cloned()
                .collect(),
            recent_insights: insights,
        },
        overall_metrics: compute_overall_metrics(&progress.entries, top_n),
    }
}

pub struct ReportGenerator {
    repo: Arc<dyn InsightRepository>,
    settings: EngineSettings,
}

impl ReportGenerator {
    pub fn new(repo: Arc<dyn InsightRepository>, settings: EngineSettings) -> Self {
        Self { repo, settings }
    }

    /// Full-history report.  Unknown users and storage failures yield the
    /// zeroed report.
    pub async fn generate_report(&self, user_id: &str) -> Result<ProgressReport> {
        let user_id = validate_user_id(user_id)?;
        Ok(match self.load(user_id).await {
            Some(progress) => build_report(&progress.entries, self.settings.top_n),
            None => ProgressReport::default(),
        })
    }

    /// Recency-windowed summary over the last `days` (configured default
    /// when `None`).
    pub async fn progress_summary(
        &self,
        user_id: &str,
        days: Option<i64>,
    ) -> Result<ProgressSummary> {
        let user_id = validate_user_id(user_id)?;
        let days = days.unwrap_or(self.settings.summary_days);
        Ok(match self.load(user_id).await {
            Some(progress) => build_summary(
                &progress,
                Utc::now(),
                days,
                self.settings.top_n,
                self.settings.recent_insights_limit,
            ),
            None => ProgressSummary::default(),
        })
    }

    async fn load(&self, user_id: &str) -> Option<UserProgress> {
        match with_timeout(self.settings.store_timeout, self.repo.load_progress(user_id)).await {
            Ok(progress) => progress,
            Err(err) => {
                warn!(%user_id, error = %err, "progress unavailable, reporting defaults");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InsightError;
    use crate::store::MemoryRepository;
    use crate::store::conformance::entry;
    use crate::store::testing::FailingRepository;

    fn with_insight(mut e: ProgressEntry, text: &str) -> ProgressEntry {
        e.insights.push(SessionInsight {
            text: text.into(),
            category: None,
            timestamp: e.timestamp,
        });
        e
    }

    async fn seeded(entries: Vec<ProgressEntry>) -> ReportGenerator {
        let repo = Arc::new(MemoryRepository::new());
        for e in entries {
            repo.push_progress_entry("u1", e).await.unwrap();
        }
        ReportGenerator::new(repo, EngineSettings::default())
    }

    #[tokio::test]
    async fn summary_filters_by_recency_but_overall_is_full_history() {
        let reports = seeded(vec![
            entry("sad", "work", 20),
            entry("calm", "family", 10),
            entry("happy", "work", 1),
        ])
        .await;
        let summary = reports.progress_summary("u1", Some(7)).await.unwrap();
        assert_eq!(summary.recent_progress.total_sessions, 1);
        assert_eq!(summary.overall_metrics.total_sessions, 3);
        assert_eq!(
            summary.recent_progress.emotional_trends.latest.unwrap().emotion,
            "happy"
        );

        let wide = reports.progress_summary("u1", None).await.unwrap();
        assert_eq!(wide.recent_progress.total_sessions, 3);
    }

    #[tokio::test]
    async fn out_of_range_windows_never_panic() {
        let reports = seeded(vec![entry("sad", "work", 20), entry("happy", "work", 1)]).await;

        for days in [1_000_000_000, i64::MAX] {
            let summary = reports.progress_summary("u1", Some(days)).await.unwrap();
            assert_eq!(summary.recent_progress.total_sessions, 2);
            assert_eq!(summary.overall_metrics.total_sessions, 2);
        }

        for days in [-5, i64::MIN] {
            let summary = reports.progress_summary("u1", Some(days)).await.unwrap();
            assert_eq!(summary.recent_progress.total_sessions, 0);
            assert_eq!(summary.overall_metrics.total_sessions, 2);
        }
    }

    #[test]
    fn window_start_clamps_at_both_ends() {
        let now = Utc::now();
        assert_eq!(window_start(now, 7), now - Duration::days(7));
        assert_eq!(window_start(now, 0), now);
        assert_eq!(window_start(now, -3), now);
        assert_eq!(window_start(now, i64::MAX), DateTime::<Utc>::MIN_UTC);
    }

    #[tokio::test]
    async fn report_uses_entries_and_top_n_rule() {
        let reports = seeded(vec![
            entry("sad", "work", 3),
            entry("anxious", "sleep", 2),
            entry("sad", "sleep", 1),
            entry("anxious", "work", 0),
        ])
        .await;
        let report = reports.generate_report("u1").await.unwrap();
        assert_eq!(report.total_sessions, 4);
        assert_eq!(report.average_intensity, 5.0);
        let emotions: Vec<&str> = report
            .common_emotions
            .iter()
            .map(|e| e.emotion.as_str())
            .collect();
        assert_eq!(emotions, ["sad", "anxious"]);
        assert_eq!(report.common_topics[0].topic, "work");
    }

    #[test]
    fn recent_insights_are_newest_first_and_capped() {
        let mut progress = UserProgress::new("u1");
        for day in 0..15 {
            progress
                .entries
                .push(with_insight(entry("calm", "x", day), &format!("d{day}")));
        }
        let summary = build_summary(&progress, Utc::now(), 30, 5, 10);
        let texts: Vec<&str> = summary
            .recent_progress
            .recent_insights
            .iter()
            .map(|i| i.text.as_str())
            .collect();
        assert_eq!(texts.len(), 10);
        assert_eq!(texts[0], "d0");
        assert_eq!(texts[9], "d9");
    }

    #[test]
    fn only_in_progress_goals_are_active() {
        let mut progress = UserProgress::new("u1");
        let mut started = Goal::new("walk daily", None);
        started.apply_progress(20, None);
        let mut done = Goal::new("call mum", None);
        done.apply_progress(100, None);
        progress.goals = vec![Goal::new("read", None), started.clone(), done];

        let summary = build_summary(&progress, Utc::now(), 30, 5, 10);
        assert_eq!(summary.recent_progress.active_goals, vec![started]);
    }

    #[tokio::test]
    async fn storage_failure_yields_zeroed_structures() {
        let reports = ReportGenerator::new(Arc::new(FailingRepository), EngineSettings::default());
        assert_eq!(reports.generate_report("u1").await.unwrap(), ProgressReport::default());
        assert_eq!(
            reports.progress_summary("u1", Some(7)).await.unwrap(),
            ProgressSummary::default()
        );
        assert!(matches!(
            reports.generate_report("").await,
            Err(InsightError::InvalidUserId(_))
        ));
    }
}
