//! Storage repositories for the two per-user documents.
//!
//! Every mutation is a single atomic primitive (bounded push, set insert,
//! push-and-increment, upsert).  Services never read, modify and write back a
//! document themselves, so concurrent callers for the same user cannot lose
//! updates or overflow the history cap.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{InsightError, Result};
use crate::schema::{
    Goal, GoalStatus, Interaction, OverallMetrics, ProgressEntry, UserInsight, UserProgress,
};

mod disk;
mod memory;
#[cfg(test)]
pub(crate) mod testing;

pub use self::disk::RedbRepository;
pub use self::memory::MemoryRepository;

#[async_trait]
pub trait InsightRepository: Send + Sync {
    /// Upsert the user's insight document, append `interaction` and keep only
    /// the newest `capacity` entries, all in one atomic step.
    async fn push_interaction(
        &self,
        user_id: &str,
        interaction: Interaction,
        capacity: usize,
    ) -> Result<()>;

    /// At most `limit` interactions, most recent first.  Must agree with
    /// [`select_recent`] applied to the stored history.
    async fn recent_interactions(&self, user_id: &str, limit: usize) -> Result<Vec<Interaction>>;

    async fn load_insight(&self, user_id: &str) -> Result<Option<UserInsight>>;

    /// Set-insert into `recurringPatterns`.
    async fn add_recurring_pattern(&self, user_id: &str, pattern: &str) -> Result<()>;

    /// Set-insert into `activeGoals`.
    async fn add_active_goal(&self, user_id: &str, goal: &str) -> Result<()>;

    /// Upsert the progress document, append `entry` and increment
    /// `overallMetrics.totalSessions`.  Returns the new session count.
    async fn push_progress_entry(&self, user_id: &str, entry: ProgressEntry) -> Result<u64>;

    async fn load_progress(&self, user_id: &str) -> Result<Option<UserProgress>>;

    /// Recompute `overallMetrics` from the stored entries and write it back
    /// in the same atomic step.  `Ok(None)` when the user has no progress
    /// document; never creates one.
    async fn recompute_overall_metrics(
        &self,
        user_id: &str,
        top_n: usize,
    ) -> Result<Option<OverallMetrics>>;

    async fn push_goal(&self, user_id: &str, goal: Goal) -> Result<()>;

    /// Apply progress to one goal.  `Ok(None)` when the goal does not exist.
    async fn update_goal(
        &self,
        user_id: &str,
        goal_id: Uuid,
        progress: u8,
        status: Option<GoalStatus>,
    ) -> Result<Option<Goal>>;
}

/// Application-side definition of "≤ `limit` most recent, most recent first".
///
/// Equal timestamps keep the later-inserted interaction first.
pub fn select_recent(interactions: &[Interaction], limit: usize) -> Vec<Interaction> {
    let mut recent: Vec<Interaction> = interactions.iter().rev().cloned().collect();
    recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    recent.truncate(limit);
    recent
}

/// Run one store call under `limit`; an elapsed timer becomes
/// [`InsightError::Timeout`].
///
/// Only the wait is abandoned.  A redb transaction already handed to a
/// blocking thread keeps running and may still commit, so a timed-out write
/// can turn out to have been persisted.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(InsightError::Timeout(limit)),
    }
}

// ── Conformance suite ────────────────────────────────────────────────────────
// Every repository implementation must pass the same checks.


#[cfg(test)]
mod tests {
    use super::conformance::interaction_at;
    use super::*;

    #[test]
    fn select_recent_orders_desc_and_limits() {
        let history = vec![
            interaction_at("old", 60),
            interaction_at("new", 1),
            interaction_at("mid", 30),
        ];
        let recent = select_recent(&history, 2);
        let order: Vec<&str> = recent.iter().map(|i| i.emotion.as_str()).collect();
        assert_eq!(order, ["new", "mid"]);
        assert!(select_recent(&[], 10).is_empty());
    }

    #[test]
    fn select_recent_prefers_later_insertion_on_ties() {
        let first = Interaction::new("first", 5);
        let mut second = Interaction::new("second", 5);
        second.timestamp = first.timestamp;
        let recent = select_recent(&[first, second], 2);
        assert_eq!(recent[0].emotion, "second");
    }

    #[tokio::test]
    async fn with_timeout_reports_elapsed_calls() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, InsightError>(())
        };
        let err = with_timeout(Duration::from_millis(10), slow).await.unwrap_err();
        assert!(matches!(err, InsightError::Timeout(_)));

        let fast = with_timeout(Duration::from_secs(1), async { Ok::<_, InsightError>(7) }).await;
        assert_eq!(fast.unwrap(), 7);
    }
}
