//! Context bundle assembly for the conversational pipeline.
//!
//! Reads the user's recent history and derives timing, frequency, topic and
//! emotional signals from it.  Any storage failure or timeout produces the
//! fully-populated empty bundle; callers never see partial results.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::engine::EngineSettings;
use crate::error::{InsightError, Result};
use crate::guard::{validate_content, validate_user_id};
use crate::period::{INTERNAL_PERIODS, LOCALIZED_PERIODS, local_hour};
use crate::ranking::Tally;
use crate::schema::Interaction;
use crate::store::{InsightRepository, select_recent, with_timeout};
use crate::trend::{EmotionalTrend, analyze_emotional_trend};

/// Interaction counts inside wall-clock windows ending now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrequencyWindows {
    pub last_24h: usize,
    pub last_7d: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextPatterns {
    /// Interactions per named period.
    pub timing: Tally,
    pub frequency: FrequencyWindows,
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentContext {
    pub period: String,
    pub period_label: String,
    pub analysis: Value,
    pub recent_topics: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonPatterns {
    /// Interactions per local hour (0–23); hours with no interactions are absent.
    pub time_of_day: BTreeMap<u32, usize>,
    pub topics: Tally,
    pub emotions: Tally,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryContext {
    pub last_interaction: Option<Interaction>,
    pub common_patterns: CommonPatterns,
    pub emotional_trend: EmotionalTrend,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextBundle {
    pub patterns: ContextPatterns,
    pub current_context: CurrentContext,
    pub history: HistoryContext,
}

impl ContextBundle {
    /// Zeroed bundle; only the current period and the caller's analysis are
    /// filled in.
    pub fn empty(now: DateTime<Utc>, tz: Tz, analysis: &Value) -> Self {
        let mut bundle = Self::default();
        bundle.current_context = current_context(now, tz, analysis, Vec::new());
        bundle
    }
}

pub struct ContextAggregator {
    repo: Arc<dyn InsightRepository>,
    settings: EngineSettings,
}

impl ContextAggregator {
    pub fn new(repo: Arc<dyn InsightRepository>, settings: EngineSettings) -> Self {
        Self { repo, settings }
    }

    pub async fn get_relevant_context(
        &self,
        user_id: &str,
        content: &str,
        current_analysis: &Value,
    ) -> Result<ContextBundle> {
        let user_id = validate_user_id(user_id)?;
        validate_content(content)?;
        let now = Utc::now();
        let tz = self.settings.timezone;

        let (history, period) = tokio::join!(self.fetch_recent(user_id), async {
            let hour = local_hour(now, tz);
            (INTERNAL_PERIODS.classify(hour), LOCALIZED_PERIODS.classify(hour))
        });

        let history = match history {
            Ok(history) => history,
            Err(err) => {
                warn!(%user_id, error = %err, "context unavailable, returning empty bundle");
                return Ok(ContextBundle::empty(now, tz, current_analysis));
            }
        };

        let recent_topics = recent_topics(&history);
        let bundle = ContextBundle {
            patterns: ContextPatterns {
                timing: period_histogram(&history, tz),
                frequency: frequency_windows(&history, now),
                topics: recent_topics.clone(),
            },
            current_context: CurrentContext {
                period: period.0.to_string(),
                period_label: period.1.to_string(),
                analysis: current_analysis.clone(),
                recent_topics,
            },
            history: HistoryContext {
                last_interaction: history.first().cloned(),
                common_patterns: common_patterns(&history, tz),
                emotional_trend: analyze_emotional_trend(&history),
            },
        };

        debug!(%user_id, interactions = history.len(), period = period.0, "context assembled");
        Ok(bundle)
    }

    /// At most `context_window` interactions, most recent first.  Falls back
    /// to an application-side selection over the whole document when the
    /// repository's recent fetch fails; a timeout is not retried.
    async fn fetch_recent(&self, user_id: &str) -> Result<Vec<Interaction>> {
        let limit = self.settings.context_window;
        let timeout = self.settings.store_timeout;

        match with_timeout(timeout, self.repo.recent_interactions(user_id, limit)).await {
            Ok(recent) => Ok(recent),
            Err(err @ InsightError::Timeout(_)) => Err(err),
            Err(err) => {
                warn!(%user_id, error = %err, "recent fetch failed, selecting from full history");
                let insight = with_timeout(timeout, self.repo.load_insight(user_id)).await?;
                Ok(insight
                    .map(|insight| select_recent(&insight.interactions, limit))
                    .unwrap_or_default())
            }
        }
    }
}

fn current_context(
    now: DateTime<Utc>,
    tz: Tz,
    analysis: &Value,
    recent_topics: Vec<String>,
) -> CurrentContext {
    let hour = local_hour(now, tz);
    CurrentContext {
        period: INTERNAL_PERIODS.classify(hour).to_string(),
        period_label: LOCALIZED_PERIODS.classify(hour).to_string(),
        analysis: analysis.clone(),
        recent_topics,
    }
}

/// Topics mentioned by one interaction: the legacy `metadata.topics` values,
/// then every `patterns` key containing "topic" (case-insensitive).
fn interaction_topics(interaction: &Interaction) -> impl Iterator<Item = &str> {
    let listed = interaction.metadata_topics().iter().map(String::as_str);
    let keyed = interaction
        .patterns
        .keys()
        .filter(|key| key.to_lowercase().contains("topic"))
        .map(String::as_str);
    listed.chain(keyed).filter(|topic| !topic.is_empty())
}

/// Distinct topics in first-seen order.
pub fn recent_topics(history: &[Interaction]) -> Vec<String> {
    history
        .iter()
        .flat_map(interaction_topics)
        .collect::<Tally>()
        .keys()
        .map(str::to_string)
        .collect()
}

pub fn period_histogram(history: &[Interaction], tz: Tz) -> Tally {
    history
        .iter()
        .map(|i| INTERNAL_PERIODS.classify(local_hour(i.timestamp, tz)))
        .collect()
}

pub fn frequency_windows(history: &[Interaction], now: DateTime<Utc>) -> FrequencyWindows {
    let day_ago = now - Duration::hours(24);
    let week_ago = now - Duration::days(7);
    FrequencyWindows {
        last_24h: history.iter().filter(|i| i.timestamp >= day_ago).count(),
        last_7d: history.iter().filter(|i| i.timestamp >= week_ago).count(),
        total: history.len(),
    }
}

pub fn common_patterns(history: &[Interaction], tz: Tz) -> CommonPatterns {
    let mut patterns = CommonPatterns::default();
    for interaction in history {
        *patterns
            .time_of_day
            .entry(local_hour(interaction.timestamp, tz))
            .or_insert(0) += 1;
        for topic in interaction_topics(interaction) {
            patterns.topics.add(topic);
        }
        if let Some(emotion) = interaction.main_emotion() {
            patterns.emotions.add(emotion);
        }
    }
    patterns
}
