//! Durable repository backed by [`redb`].
//!
//! # Tables
//!
//! | Name            | Key            | Value                         |
//! |-----------------|----------------|-------------------------------|
//! | `user_insights` | user id (&str) | JSON-encoded [`UserInsight`]  |
//! | `user_progress` | user id (&str) | JSON-encoded [`UserProgress`] |
//!
//! Every primitive runs inside one write transaction on a blocking thread.
//! redb admits a single writer at a time, so a bounded push or an increment
//! can never interleave with another mutation of the same document.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::{InsightRepository, select_recent};
use crate::error::Result;
use crate::progress::compute_overall_metrics;
use crate::schema::{
    Goal, GoalStatus, Interaction, OverallMetrics, ProgressEntry, UserInsight, UserProgress,
};

type DocTable = TableDefinition<'static, &'static str, &'static [u8]>;

const INSIGHTS_TABLE: DocTable = TableDefinition::new("user_insights");
const PROGRESS_TABLE: DocTable = TableDefinition::new("user_progress");

pub struct RedbRepository {
    db: Arc<Database>,
    path: PathBuf,
}

impl RedbRepository {
    /// Open or create the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(&path)?;

        // Ensure tables exist so read transactions never see a missing table.
        {
            let tx = db.begin_write()?;
            tx.open_table(INSIGHTS_TABLE)?;
            tx.open_table(PROGRESS_TABLE)?;
            tx.commit()?;
        }

        tracing::debug!(path = %path.display(), "insight database opened");
        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn blocking<F, R>(&self, op: F) -> Result<R>
    where
        F: FnOnce(&Database) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db)).await?
    }
}

/// Load (or create with `init`), mutate and write back one document inside a
/// single write transaction.  Any error aborts the transaction untouched.
fn update_doc<T, R>(
    db: &Database,
    table: DocTable,
    user_id: &str,
    init: impl FnOnce() -> T,
    mutate: impl FnOnce(&mut T) -> R,
) -> Result<R>
where
    T: Serialize + DeserializeOwned,
{
    let tx = db.begin_write()?;
    let out = {
        let mut tbl = tx.open_table(table)?;
        let current = tbl.get(user_id)?.map(|guard| guard.value().to_vec());
        let mut doc = match current {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => init(),
        };
        let out = mutate(&mut doc);
        let bytes = serde_json::to_vec(&doc)?;
        tbl.insert(user_id, bytes.as_slice())?;
        out
    };
    tx.commit()?;
    Ok(out)
}

/// Like [`update_doc`] but leaves missing documents absent.  The document is
/// written back only when `mutate` returns `Some`.
fn update_existing_doc<T, R>(
    db: &Database,
    table: DocTable,
    user_id: &str,
    mutate: impl FnOnce(&mut T) -> Option<R>,
) -> Result<Option<Option<R>>>
where
    T: Serialize + DeserializeOwned,
{
    let tx = db.begin_write()?;
    let out = {
        let mut tbl = tx.open_table(table)?;
        let current = tbl.get(user_id)?.map(|guard| guard.value().to_vec());
        let Some(bytes) = current else {
            return Ok(None);
        };
        let mut doc: T = serde_json::from_slice(&bytes)?;
        let out = mutate(&mut doc);
        if out.is_some() {
            let bytes = serde_json::to_vec(&doc)?;
            tbl.insert(user_id, bytes.as_slice())?;
        }
        out
    };
    tx.commit()?;
    Ok(Some(out))
}

fn read_doc<T: DeserializeOwned>(
    db: &Database,
    table: DocTable,
    user_id: &str,
) -> Result<Option<T>> {
    let tx = db.begin_read()?;
    let tbl = tx.open_table(table)?;
    let Some(bytes) = tbl.get(user_id)?.map(|guard| guard.value().to_vec()) else {
        return Ok(None);
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}

#[async_trait]
impl InsightRepository for RedbRepository {
    async fn push_interaction(
        &self,
        user_id: &str,
        interaction: Interaction,
        capacity: usize,
    ) -> Result<()> {
        let user_id = user_id.to_string();
        self.blocking(move |db| {
            update_doc(
                db,
                INSIGHTS_TABLE,
                &user_id,
                || UserInsight::new(user_id.as_str()),
                |doc: &mut UserInsight| doc.push_bounded(interaction, capacity),
            )
        })
        .await
    }

    async fn recent_interactions(&self, user_id: &str, limit: usize) -> Result<Vec<Interaction>> {
        let user_id = user_id.to_string();
        self.blocking(move |db| {
            let doc: Option<UserInsight> = read_doc(db, INSIGHTS_TABLE, &user_id)?;
            Ok(doc
                .map(|insight| select_recent(&insight.interactions, limit))
                .unwrap_or_default())
        })
        .await
    }

    async fn load_insight(&self, user_id: &str) -> Result<Option<UserInsight>> {
        let user_id = user_id.to_string();
        self.blocking(move |db| read_doc(db, INSIGHTS_TABLE, &user_id)).await
    }

    async fn add_recurring_pattern(&self, user_id: &str, pattern: &str) -> Result<()> {
        let user_id = user_id.to_string();
        let pattern = pattern.to_string();
        self.blocking(move |db| {
            update_doc(
                db,
                INSIGHTS_TABLE,
                &user_id,
                || UserInsight::new(user_id.as_str()),
                |doc: &mut UserInsight| {
                    doc.recurring_patterns.insert(pattern);
                },
            )
        })
        .await
    }

    async fn add_active_goal(&self, user_id: &str, goal: &str) -> Result<()> {
        let user_id = user_id.to_string();
        let goal = goal.to_string();
        self.blocking(move |db| {
            update_doc(
                db,
                INSIGHTS_TABLE,
                &user_id,
                || UserInsight::new(user_id.as_str()),
                |doc: &mut UserInsight| {
                    doc.active_goals.insert(goal);
                },
            )
        })
        .await
    }

    async fn push_progress_entry(&self, user_id: &str, entry: ProgressEntry) -> Result<u64> {
        let user_id = user_id.to_string();
        self.blocking(move |db| {
            update_doc(
                db,
                PROGRESS_TABLE,
                &user_id,
                || UserProgress::new(user_id.as_str()),
                |doc: &mut UserProgress| {
                    doc.entries.push(entry);
                    doc.overall_metrics.total_sessions += 1;
                    doc.overall_metrics.total_sessions
                },
            )
        })
        .await
    }

    async fn load_progress(&self, user_id: &str) -> Result<Option<UserProgress>> {
        let user_id = user_id.to_string();
        self.blocking(move |db| read_doc(db, PROGRESS_TABLE, &user_id)).await
    }

    async fn recompute_overall_metrics(
        &self,
        user_id: &str,
        top_n: usize,
    ) -> Result<Option<OverallMetrics>> {
        let user_id = user_id.to_string();
        self.blocking(move |db| {
            update_existing_doc(db, PROGRESS_TABLE, &user_id, |doc: &mut UserProgress| {
                doc.overall_metrics = compute_overall_metrics(&doc.entries, top_n);
                Some(doc.overall_metrics.clone())
            })
            .map(Option::flatten)
        })
        .await
    }

    async fn push_goal(&self, user_id: &str, goal: Goal) -> Result<()> {
        let user_id = user_id.to_string();
        self.blocking(move |db| {
            update_doc(
                db,
                PROGRESS_TABLE,
                &user_id,
                || UserProgress::new(user_id.as_str()),
                |doc: &mut UserProgress| doc.goals.push(goal),
            )
        })
        .await
    }

    async fn update_goal(
        &self,
        user_id: &str,
        goal_id: Uuid,
        progress_pct: u8,
        status: Option<GoalStatus>,
    ) -> Result<Option<Goal>> {
        let user_id = user_id.to_string();
        self.blocking(move |db| {
            // Never create a document just to report a missing goal.
            update_existing_doc(db, PROGRESS_TABLE, &user_id, |doc: &mut UserProgress| {
                doc.goals.iter_mut().find(|g| g.id == goal_id).map(|goal| {
                    goal.apply_progress(progress_pct, status);
                    goal.clone()
                })
            })
            .map(Option::flatten)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::engine::EngineSettings;
    use crate::recorder::{ConversationMessage, InteractionRecorder};
    use crate::store::conformance;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn redb_repository_conformance() {
        let dir = TempDir::new().unwrap();
        let counter = AtomicUsize::new(0);
        conformance::run_all(|| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let path = dir.path().join(format!("insight-{n}.redb"));
            Arc::new(RedbRepository::open(path).unwrap()) as Arc<dyn InsightRepository>
        })
        .await;
    }

    #[tokio::test]
    async fn abandoned_write_still_commits() {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(RedbRepository::open(dir.path().join("late.redb")).unwrap());
        let settings = EngineSettings {
            store_timeout: Duration::ZERO,
            ..EngineSettings::default()
        };
        let recorder = InteractionRecorder::new(repo.clone(), settings);
        let message = ConversationMessage::new("still here");
        let reported = recorder
            .record_interaction("u1", &message, &serde_json::json!({}))
            .await
            .unwrap();

        // The wait may be abandoned, but the transaction already handed to
        // the blocking pool runs to completion.
        let mut stored = 0;
        for _ in 0..100 {
            stored = repo
                .load_insight("u1")
                .await
                .unwrap()
                .map_or(0, |insight| insight.interactions.len());
            if stored == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(stored, 1, "reported {reported:?}");
    }

    #[tokio::test]
    async fn documents_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("insight.redb");
        {
            let repo = RedbRepository::open(&path).unwrap();
            repo.push_interaction("u1", Interaction::new("calm", 4), 50)
                .await
                .unwrap();
            repo.push_progress_entry("u1", conformance::entry("calm", "sleep", 0))
                .await
                .unwrap();
        }

        let repo = RedbRepository::open(&path).unwrap();
        assert_eq!(repo.path(), path.as_path());
        let insight = repo.load_insight("u1").await.unwrap().unwrap();
        assert_eq!(insight.interactions[0].emotion, "calm");
        let progress = repo.load_progress("u1").await.unwrap().unwrap();
        assert_eq!(progress.overall_metrics.total_sessions, 1);
    }
}
