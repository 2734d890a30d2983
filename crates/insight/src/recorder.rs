use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::engine::EngineSettings;
use crate::error::Result;
use crate::guard::{validate_content, validate_user_id};
use crate::schema::Interaction;
use crate::signal::{Analysis, resolve};
use crate::store::{InsightRepository, with_timeout};

/// The user turn an interaction is recorded for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    #[serde(default)]
    pub content: String,
}

impl ConversationMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Normalises analysis payloads into interactions and appends them to the
/// user's bounded history.
pub struct InteractionRecorder {
    repo: Arc<dyn InsightRepository>,
    settings: EngineSettings,
}

impl InteractionRecorder {
    pub fn new(repo: Arc<dyn InsightRepository>, settings: EngineSettings) -> Self {
        Self { repo, settings }
    }

    /// Record one interaction.
    ///
    /// Invalid input is returned as `Err`.  Storage failures are logged and
    /// yield `Ok(None)`: this runs inside a live conversational turn and must
    /// never hold it up.
    pub async fn record_interaction(
        &self,
        user_id: &str,
        message: &ConversationMessage,
        analysis: &Value,
    ) -> Result<Option<Interaction>> {
        let user_id = validate_user_id(user_id)?;
        validate_content(&message.content)?;

        let signal = resolve(&Analysis::from_value(analysis));
        let interaction = Interaction {
            timestamp: Utc::now(),
            emotion: signal.emotion,
            intensity: signal.intensity,
            patterns: signal.patterns,
            goals: signal.goals,
            metadata: None,
        };

        let push = self.repo.push_interaction(
            user_id,
            interaction.clone(),
            self.settings.history_capacity,
        );
        match with_timeout(self.settings.store_timeout, push).await {
            Ok(()) => {
                debug!(
                    %user_id,
                    emotion = %interaction.emotion,
                    intensity = interaction.intensity,
                    "interaction recorded"
                );
                Ok(Some(interaction))
            }
            Err(err) => {
                warn!(%user_id, error = %err, "interaction not recorded");
                Ok(None)
            }
        }
    }

    /// Add an advisory recurring pattern.  Returns whether it was stored;
    /// blank patterns are ignored.
    pub async fn note_recurring_pattern(&self, user_id: &str, pattern: &str) -> Result<bool> {
        let user_id = validate_user_id(user_id)?;
        let Ok(pattern) = validate_content(pattern) else {
            return Ok(false);
        };
        let call = self.repo.add_recurring_pattern(user_id, pattern);
        Ok(self.best_effort(user_id, "recurring pattern", call).await)
    }

    /// Add an active goal label.  Returns whether it was stored; blank
    /// labels are ignored.
    pub async fn note_active_goal(&self, user_id: &str, goal: &str) -> Result<bool> {
        let user_id = validate_user_id(user_id)?;
        let Ok(goal) = validate_content(goal) else {
            return Ok(false);
        };
        let call = self.repo.add_active_goal(user_id, goal);
        Ok(self.best_effort(user_id, "active goal", call).await)
    }

    async fn best_effort(
        &self,
        user_id: &str,
        what: &str,
        call: impl Future<Output = Result<()>>,
    ) -> bool {
        match with_timeout(self.settings.store_timeout, call).await {
            Ok(()) => true,
            Err(err) => {
                warn!(%user_id, error = %err, "{what} not stored");
                false
            }
        }
    }
}
