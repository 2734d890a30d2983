//! Per-session progress tracking and overall metric recomputation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::engine::EngineSettings;
use crate::error::Result;
use crate::guard::{validate_content, validate_user_id};
use crate::ranking::{Averager, Tally};
use crate::schema::{
    DEFAULT_INTENSITY, DEFAULT_RESPONSE_QUALITY, EmotionFrequency, EmotionalState,
    EmotionalTrends, GENERAL_TOPIC, Goal, GoalStatus, NEUTRAL_EMOTION, OverallMetrics,
    ProgressEntry, SessionContext, SessionInsight, SessionMetrics, StrategyEffectiveness,
    TopicFrequency, clamp_intensity, clamp_response_quality,
};
use crate::store::{InsightRepository, with_timeout};

// ── Session message input ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionEmotion {
    pub main_emotion: Option<String>,
    pub intensity: Option<f64>,
    pub secondary_emotions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionMetricsInput {
    pub duration: Option<u64>,
    pub message_count: Option<u32>,
    pub response_quality: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionMessageContext {
    pub emotional: Option<SessionEmotion>,
    pub topic: Option<String>,
    pub triggers: Vec<String>,
    pub coping_strategies: Vec<String>,
    pub insights: Vec<String>,
    pub session_metrics: Option<SessionMetricsInput>,
}

/// Closing message of a session, as produced by the session pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionMessage {
    pub content: String,
    pub context: SessionMessageContext,
}

fn non_empty(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// Build one progress entry, defaulting absent fields to neutral values.
pub fn build_entry(message: &SessionMessage, now: DateTime<Utc>) -> ProgressEntry {
    let ctx = &message.context;
    let emotional = ctx.emotional.clone().unwrap_or_default();
    let metrics = ctx.session_metrics.clone().unwrap_or_default();

    let main_emotion = emotional
        .main_emotion
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| NEUTRAL_EMOTION.to_string());
    let topic = ctx
        .topic
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(GENERAL_TOPIC)
        .to_string();

    ProgressEntry {
        timestamp: now,
        emotional_state: EmotionalState {
            main_emotion,
            intensity: emotional
                .intensity
                .map(clamp_intensity)
                .unwrap_or(DEFAULT_INTENSITY),
            secondary_emotions: non_empty(&emotional.secondary_emotions),
        },
        context: SessionContext {
            topic,
            triggers: non_empty(&ctx.triggers),
            coping_strategies: non_empty(&ctx.coping_strategies),
        },
        insights: non_empty(&ctx.insights)
            .into_iter()
            .map(|text| SessionInsight {
                text,
                category: None,
                timestamp: now,
            })
            .collect(),
        session_metrics: SessionMetrics {
            duration: metrics.duration.unwrap_or(0),
            message_count: metrics.message_count.unwrap_or(0),
            response_quality: metrics.response_quality.and_then(clamp_response_quality),
        },
    }
}

// ── Aggregation ──────────────────────────────────────────────────────────────

pub fn rank_emotions(entries: &[ProgressEntry], n: usize) -> Vec<EmotionFrequency> {
    entries
        .iter()
        .map(|e| e.emotional_state.main_emotion.as_str())
        .collect::<Tally>()
        .top(n)
        .into_iter()
        .map(|(emotion, frequency)| EmotionFrequency { emotion, frequency })
        .collect()
}

pub fn rank_topics(entries: &[ProgressEntry], n: usize) -> Vec<TopicFrequency> {
    entries
        .iter()
        .map(|e| e.context.topic.as_str())
        .collect::<Tally>()
        .top(n)
        .into_iter()
        .map(|(topic, frequency)| TopicFrequency { topic, frequency })
        .collect()
}

/// Average response quality per coping strategy, unrated sessions counting
/// as [`DEFAULT_RESPONSE_QUALITY`].
pub fn rank_coping_strategies(entries: &[ProgressEntry], n: usize) -> Vec<StrategyEffectiveness> {
    let mut averager = Averager::new();
    for entry in entries {
        let quality = entry
            .session_metrics
            .response_quality
            .unwrap_or(DEFAULT_RESPONSE_QUALITY);
        for strategy in &entry.context.coping_strategies {
            averager.add(strategy, f64::from(quality));
        }
    }
    averager
        .top(n)
        .into_iter()
        .map(|(strategy, effectiveness)| StrategyEffectiveness {
            strategy,
            effectiveness,
        })
        .collect()
}

pub fn average_intensity(entries: &[ProgressEntry]) -> f64 {
    if entries.is_empty() {
        return 0.0;
    }
    let sum: u64 = entries
        .iter()
        .map(|e| u64::from(e.emotional_state.intensity))
        .sum();
    sum as f64 / entries.len() as f64
}

/// Full recompute over every entry.
pub fn compute_overall_metrics(entries: &[ProgressEntry], top_n: usize) -> OverallMetrics {
    let average_session_duration = if entries.is_empty() {
        0.0
    } else {
        entries.iter().map(|e| e.session_metrics.duration).sum::<u64>() as f64
            / entries.len() as f64
    };

    OverallMetrics {
        total_sessions: entries.len() as u64,
        average_session_duration,
        emotional_trends: EmotionalTrends {
            predominant_emotions: rank_emotions(entries, top_n),
            average_intensity: average_intensity(entries),
        },
        common_topics: rank_topics(entries, top_n),
        effective_coping_strategies: rank_coping_strategies(entries, top_n),
    }
}

// ── Service ──────────────────────────────────────────────────────────────────

pub struct ProgressTracker {
    repo: Arc<dyn InsightRepository>,
    settings: EngineSettings,
}

impl ProgressTracker {
    pub fn new(repo: Arc<dyn InsightRepository>, settings: EngineSettings) -> Self {
        Self { repo, settings }
    }

    /// Append one progress entry and bump the session counter atomically,
    /// then refresh the derived metrics.  Storage failures yield `Ok(None)`.
    pub async fn track_progress(
        &self,
        user_id: &str,
        message: &SessionMessage,
    ) -> Result<Option<ProgressEntry>> {
        let user_id = validate_user_id(user_id)?;
        let entry = build_entry(message, Utc::now());

        let push = self.repo.push_progress_entry(user_id, entry.clone());
        match with_timeout(self.settings.store_timeout, push).await {
            Ok(total_sessions) => {
                debug!(%user_id, total_sessions, topic = %entry.context.topic, "progress tracked");
                self.update_overall_metrics(user_id).await?;
                Ok(Some(entry))
            }
            Err(err) => {
                warn!(%user_id, error = %err, "progress not tracked");
                Ok(None)
            }
        }
    }

    /// Recompute `overallMetrics` from the full entry list inside the store.
    /// `Ok(None)` when the user has no progress document or the store fails.
    pub async fn update_overall_metrics(&self, user_id: &str) -> Result<Option<OverallMetrics>> {
        let user_id = validate_user_id(user_id)?;
        let call = self.repo.recompute_overall_metrics(user_id, self.settings.top_n);
        match with_timeout(self.settings.store_timeout, call).await {
            Ok(metrics) => Ok(metrics),
            Err(err) => {
                warn!(%user_id, error = %err, "metrics not recomputed");
                Ok(None)
            }
        }
    }

    pub async fn add_goal(
        &self,
        user_id: &str,
        description: &str,
        target_date: Option<DateTime<Utc>>,
    ) -> Result<Option<Goal>> {
        let user_id = validate_user_id(user_id)?;
        let goal = Goal::new(validate_content(description)?, target_date);

        let push = self.repo.push_goal(user_id, goal.clone());
        match with_timeout(self.settings.store_timeout, push).await {
            Ok(()) => Ok(Some(goal)),
            Err(err) => {
                warn!(%user_id, error = %err, "goal not stored");
                Ok(None)
            }
        }
    }

    /// Set a goal's progress (clamped to 100) and optionally its status.
    /// `Ok(None)` when the goal is unknown or the store fails.
    pub async fn update_goal(
        &self,
        user_id: &str,
        goal_id: Uuid,
        progress: u8,
        status: Option<GoalStatus>,
    ) -> Result<Option<Goal>> {
        let user_id = validate_user_id(user_id)?;
        let call = self.repo.update_goal(user_id, goal_id, progress, status);
        match with_timeout(self.settings.store_timeout, call).await {
            Ok(goal) => Ok(goal),
            Err(err) => {
                warn!(%user_id, %goal_id, error = %err, "goal not updated");
                Ok(None)
            }
        }
    }
}
