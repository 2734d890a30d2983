//! Repository doubles for service tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use super::{InsightRepository, MemoryRepository};
use crate::error::{InsightError, Result};
use crate::schema::{
    Goal, GoalStatus, Interaction, OverallMetrics, ProgressEntry, UserInsight, UserProgress,
};

fn unavailable() -> InsightError {
    InsightError::Task("store unavailable".to_string())
}

/// Fails every call.
#[derive(Debug, Default)]
pub struct FailingRepository;

#[async_trait]
impl InsightRepository for FailingRepository {
    async fn push_interaction(&self, _: &str, _: Interaction, _: usize) -> Result<()> {
        Err(unavailable())
    }

    async fn recent_interactions(&self, _: &str, _: usize) -> Result<Vec<Interaction>> {
        Err(unavailable())
    }

    async fn load_insight(&self, _: &str) -> Result<Option<UserInsight>> {
        Err(unavailable())
    }

    async fn add_recurring_pattern(&self, _: &str, _: &str) -> Result<()> {
        Err(unavailable())
    }

    async fn add_active_goal(&self, _: &str, _: &str) -> Result<()> {
        Err(unavailable())
    }

    async fn push_progress_entry(&self, _: &str, _: ProgressEntry) -> Result<u64> {
        Err(unavailable())
    }

    async fn load_progress(&self, _: &str) -> Result<Option<UserProgress>> {
        Err(unavailable())
    }

    async fn recompute_overall_metrics(&self, _: &str, _: usize) -> Result<Option<OverallMetrics>> {
        Err(unavailable())
    }

    async fn push_goal(&self, _: &str, _: Goal) -> Result<()> {
        Err(unavailable())
    }

    async fn update_goal(
        &self,
        _: &str,
        _: Uuid,
        _: u8,
        _: Option<GoalStatus>,
    ) -> Result<Option<Goal>> {
        Err(unavailable())
    }
}

/// Wraps a [`MemoryRepository`].  The optimized recent fetch can be made to
/// fail, every call can be delayed by `delay`, and the first metrics
/// recompute alone can be held back by `stall_first_recompute`.
#[derive(Debug, Default)]
pub struct DegradedRepository {
    pub inner: MemoryRepository,
    pub fail_recent: bool,
    pub delay: Option<Duration>,
    pub stall_first_recompute: Option<Duration>,
    pub recomputed: AtomicBool,
}

impl DegradedRepository {
    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl InsightRepository for DegradedRepository {
    async fn push_interaction(
        &self,
        user_id: &str,
        interaction: Interaction,
        capacity: usize,
    ) -> Result<()> {
        self.pause().await;
        self.inner.push_interaction(user_id, interaction, capacity).await
    }

    async fn recent_interactions(&self, user_id: &str, limit: usize) -> Result<Vec<Interaction>> {
        self.pause().await;
        if self.fail_recent {
            return Err(unavailable());
        }
        self.inner.recent_interactions(user_id, limit).await
    }

    async fn load_insight(&self, user_id: &str) -> Result<Option<UserInsight>> {
        self.pause().await;
        self.inner.load_insight(user_id).await
    }

    async fn add_recurring_pattern(&self, user_id: &str, pattern: &str) -> Result<()> {
        self.pause().await;
        self.inner.add_recurring_pattern(user_id, pattern).await
    }

    async fn add_active_goal(&self, user_id: &str, goal: &str) -> Result<()> {
        self.pause().await;
        self.inner.add_active_goal(user_id, goal).await
    }

    async fn push_progress_entry(&self, user_id: &str, entry: ProgressEntry) -> Result<u64> {
        self.pause().await;
        self.inner.push_progress_entry(user_id, entry).await
    }

    async fn load_progress(&self, user_id: &str) -> Result<Option<UserProgress>> {
        self.pause().await;
        self.inner.load_progress(user_id).await
    }

    async fn recompute_overall_metrics(
        &self,
        user_id: &str,
        top_n: usize,
    ) -> Result<Option<OverallMetrics>> {
        self.pause().await;
        if let Some(stall) = self.stall_first_recompute {
            if !self.recomputed.swap(true, Ordering::SeqCst) {
                tokio::time::sleep(stall).await;
            }
        }
        self.inner.recompute_overall_metrics(user_id, top_n).await
    }

    async fn push_goal(&self, user_id: &str, goal: Goal) -> Result<()> {
        self.pause().await;
        self.inner.push_goal(user_id, goal).await
    }

    async fn update_goal(
        &self,
        user_id: &str,
        goal_id: Uuid,
        progress: u8,
        status: Option<GoalStatus>,
    ) -> Result<Option<Goal>> {
        self.pause().await;
        self.inner.update_goal(user_id, goal_id, progress, status).await
    }
}
