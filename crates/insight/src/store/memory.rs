use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{InsightRepository, select_recent};
use crate::error::Result;
use crate::progress::compute_overall_metrics;
use crate::schema::{
    Goal, GoalStatus, Interaction, OverallMetrics, ProgressEntry, UserInsight, UserProgress,
};

/// Process-local repository.  Each primitive holds the write guard for its
/// whole duration, which is what makes it atomic.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    insights: RwLock<HashMap<String, UserInsight>>,
    progress: RwLock<HashMap<String, UserProgress>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InsightRepository for MemoryRepository {
    async fn push_interaction(
        &self,
        user_id: &str,
        interaction: Interaction,
        capacity: usize,
    ) -> Result<()> {
        let mut insights = self.insights.write().await;
        insights
            .entry(user_id.to_string())
            .or_insert_with(|| UserInsight::new(user_id))
            .push_bounded(interaction, capacity);
        Ok(())
    }

    async fn recent_interactions(&self, user_id: &str, limit: usize) -> Result<Vec<Interaction>> {
        let insights = self.insights.read().await;
        Ok(insights
            .get(user_id)
            .map(|insight| select_recent(&insight.interactions, limit))
            .unwrap_or_default())
    }

    async fn load_insight(&self, user_id: &str) -> Result<Option<UserInsight>> {
        Ok(self.insights.read().await.get(user_id).cloned())
    }

    async fn add_recurring_pattern(&self, user_id: &str, pattern: &str) -> Result<()> {
        let mut insights = self.insights.write().await;
        insights
            .entry(user_id.to_string())
            .or_insert_with(|| UserInsight::new(user_id))
            .recurring_patterns
            .insert(pattern.to_string());
        Ok(())
    }

    async fn add_active_goal(&self, user_id: &str, goal: &str) -> Result<()> {
        let mut insights = self.insights.write().await;
        insights
            .entry(user_id.to_string())
            .or_insert_with(|| UserInsight::new(user_id))
            .active_goals
            .insert(goal.to_string());
        Ok(())
    }

    async fn push_progress_entry(&self, user_id: &str, entry: ProgressEntry) -> Result<u64> {
        let mut progress = self.progress.write().await;
        let doc = progress
            .entry(user_id.to_string())
            .or_insert_with(|| UserProgress::new(user_id));
        doc.entries.push(entry);
        doc.overall_metrics.total_sessions += 1;
        Ok(doc.overall_metrics.total_sessions)
    }

    async fn load_progress(&self, user_id: &str) -> Result<Option<UserProgress>> {
        Ok(self.progress.read().await.get(user_id).cloned())
    }

    async fn recompute_overall_metrics(
        &self,
        user_id: &str,
        top_n: usize,
    ) -> Result<Option<OverallMetrics>> {
        let mut progress = self.progress.write().await;
        let Some(doc) = progress.get_mut(user_id) else {
            return Ok(None);
        };
        doc.overall_metrics = compute_overall_metrics(&doc.entries, top_n);
        Ok(Some(doc.overall_metrics.clone()))
    }

    async fn push_goal(&self, user_id: &str, goal: Goal) -> Result<()> {
        let mut progress = self.progress.write().await;
        progress
            .entry(user_id.to_string())
            .or_insert_with(|| UserProgress::new(user_id))
            .goals
            .push(goal);
        Ok(())
    }

    async fn update_goal(
        &self,
        user_id: &str,
        goal_id: Uuid,
        progress_pct: u8,
        status: Option<GoalStatus>,
    ) -> Result<Option<Goal>> {
        let mut progress = self.progress.write().await;
        let Some(doc) = progress.get_mut(user_id) else {
            return Ok(None);
        };
        Ok(doc.goals.iter_mut().find(|g| g.id == goal_id).map(|goal| {
            goal.apply_progress(progress_pct, status);
            goal.clone()
        }))
    }
}
