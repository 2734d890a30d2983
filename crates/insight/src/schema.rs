use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Emotion label used whenever a payload carries no recognisable emotion.
pub const NEUTRAL_EMOTION: &str = "neutral";
/// Topic label used when a session message names no topic.
pub const GENERAL_TOPIC: &str = "general";

/// Hard ceiling on `UserInsight::interactions`; configuration may lower it.
pub const MAX_HISTORY_CAPACITY: usize = 50;

pub const MIN_INTENSITY: u8 = 1;
pub const MAX_INTENSITY: u8 = 10;
pub const DEFAULT_INTENSITY: u8 = 5;

pub const MIN_RESPONSE_QUALITY: u8 = 1;
pub const MAX_RESPONSE_QUALITY: u8 = 5;
/// Quality assumed for sessions that were never rated.
pub const DEFAULT_RESPONSE_QUALITY: u8 = 3;

fn default_intensity() -> u8 {
    DEFAULT_INTENSITY
}

/// Clamp a raw numeric intensity into `[MIN_INTENSITY, MAX_INTENSITY]`.
///
/// Fractional values are rounded first; NaN resolves to the default.
pub fn clamp_intensity(raw: f64) -> u8 {
    if raw.is_nan() {
        return DEFAULT_INTENSITY;
    }
    raw.round()
        .clamp(f64::from(MIN_INTENSITY), f64::from(MAX_INTENSITY)) as u8
}

/// Clamp a raw response-quality score into `[1, 5]`.
pub fn clamp_response_quality(raw: f64) -> Option<u8> {
    if raw.is_nan() {
        return None;
    }
    Some(
        raw.round()
            .clamp(f64::from(MIN_RESPONSE_QUALITY), f64::from(MAX_RESPONSE_QUALITY))
            as u8,
    )
}

// ── UserInsight ───────────────────────────────────────────────────────────────

/// One recorded emotional data point tied to a conversational turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub emotion: String,
    #[serde(default = "default_intensity")]
    pub intensity: u8,
    #[serde(default)]
    pub patterns: Map<String, Value>,
    #[serde(default)]
    pub goals: Map<String, Value>,
    /// Legacy envelope written by older pipeline versions.  Never produced by
    /// the recorder, but still read by the context aggregator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<InteractionMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionMetadata {
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotional: Option<MetadataEmotion>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataEmotion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_emotion: Option<String>,
}

impl Interaction {
    pub fn new(emotion: impl Into<String>, intensity: u8) -> Self {
        Self {
            timestamp: Utc::now(),
            emotion: emotion.into(),
            intensity: intensity.clamp(MIN_INTENSITY, MAX_INTENSITY),
            patterns: Map::new(),
            goals: Map::new(),
            metadata: None,
        }
    }

    /// Emotion label under either historical schema: the legacy
    /// `metadata.emotional.mainEmotion` wins over the direct `emotion` field.
    pub fn main_emotion(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.emotional.as_ref())
            .and_then(|e| e.main_emotion.as_deref())
            .filter(|e| !e.is_empty())
            .or_else(|| Some(self.emotion.as_str()).filter(|e| !e.is_empty()))
    }

    /// Topics listed in the legacy `metadata.topics` array.
    pub fn metadata_topics(&self) -> &[String] {
        self.metadata
            .as_ref()
            .map(|m| m.topics.as_slice())
            .unwrap_or_default()
    }
}

/// Per-user rolling interaction history plus advisory sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInsight {
    pub user_id: String,
    #[serde(default)]
    pub interactions: Vec<Interaction>,
    #[serde(default)]
    pub recurring_patterns: BTreeSet<String>,
    #[serde(default)]
    pub active_goals: BTreeSet<String>,
}

impl UserInsight {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            interactions: Vec::new(),
            recurring_patterns: BTreeSet::new(),
            active_goals: BTreeSet::new(),
        }
    }

    /// Append and keep only the newest `capacity` interactions.
    pub fn push_bounded(&mut self, interaction: Interaction, capacity: usize) {
        self.interactions.push(interaction);
        let excess = self.interactions.len().saturating_sub(capacity);
        if excess > 0 {
            self.interactions.drain(..excess);
        }
    }
}

// ── UserProgress ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionalState {
    pub main_emotion: String,
    pub intensity: u8,
    #[serde(default)]
    pub secondary_emotions: Vec<String>,
}

impl Default for EmotionalState {
    fn default() -> Self {
        Self {
            main_emotion: NEUTRAL_EMOTION.to_string(),
            intensity: DEFAULT_INTENSITY,
            secondary_emotions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub topic: String,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub coping_strategies: Vec<String>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            topic: GENERAL_TOPIC.to_string(),
            triggers: Vec::new(),
            coping_strategies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInsight {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetrics {
    /// Session length in seconds.
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub message_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_quality: Option<u8>,
}

/// One session-level record: emotional state, context and session metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub emotional_state: EmotionalState,
    #[serde(default)]
    pub context: SessionContext,
    #[serde(default)]
    pub insights: Vec<SessionInsight>,
    #[serde(default)]
    pub session_metrics: SessionMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionFrequency {
    pub emotion: String,
    pub frequency: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicFrequency {
    pub topic: String,
    pub frequency: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyEffectiveness {
    pub strategy: String,
    pub effectiveness: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionalTrends {
    pub predominant_emotions: Vec<EmotionFrequency>,
    pub average_intensity: f64,
}

/// Aggregates derived from `UserProgress::entries`.  Always recomputed in
/// full, never updated incrementally (apart from the session counter).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallMetrics {
    pub total_sessions: u64,
    pub average_session_duration: f64,
    pub emotional_trends: EmotionalTrends,
    pub common_topics: Vec<TopicFrequency>,
    pub effective_coping_strategies: Vec<StrategyEffectiveness>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: Uuid,
    pub description: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_date: Option<DateTime<Utc>>,
    /// Completion percentage in `[0, 100]`.
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub status: GoalStatus,
}

impl Goal {
    pub fn new(description: impl Into<String>, target_date: Option<DateTime<Utc>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            created_at: Utc::now(),
            target_date,
            progress: 0,
            status: GoalStatus::Pending,
        }
    }

    /// Record new progress.  An explicit `status` always wins; otherwise
    /// reaching 100 completes the goal and any progress starts a pending one.
    pub fn apply_progress(&mut self, progress: u8, status: Option<GoalStatus>) {
        self.progress = progress.min(100);
        self.status = match status {
            Some(explicit) => explicit,
            None if self.progress >= 100 => GoalStatus::Completed,
            None if self.progress > 0 && self.status == GoalStatus::Pending => {
                GoalStatus::InProgress
            }
            None => self.status,
        };
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    pub user_id: String,
    #[serde(default)]
    pub entries: Vec<ProgressEntry>,
    #[serde(default)]
    pub overall_metrics: OverallMetrics,
    #[serde(default)]
    pub goals: Vec<Goal>,
}

impl UserProgress {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            entries: Vec::new(),
            overall_metrics: OverallMetrics::default(),
            goals: Vec::new(),
        }
    }
}
