//! `Store`: the outbox-facing handle over the SQLite pool.
//!
//! It is the only public way to write outbox rows. Each writer counts the
//! pending total inside its own transaction and publishes it before
//! returning, so `pending_count()` is never behind a committed write. A
//! revision counter is bumped alongside for readers that only need a
//! "something changed" signal.

use super::model::StatusCounts;
use super::repo::{self, Committed, Pool};
use crate::model::{NewQuizAttempt, NewSubmission, OutboxTable, QuizAttempt, Submission};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::debug;

#[derive(Clone)]
pub struct Store {
    pool: Pool,
    pending: Arc<watch::Sender<i64>>,
    revision: Arc<watch::Sender<u64>>,
    // Serialises write + publish so counts are published in commit order.
    publish: Arc<Mutex<()>>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("pending", &*self.pending.borrow())
            .field("revision", &*self.revision.borrow())
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Wrap a migrated pool, seeding the pending count from the database.
    pub async fn from_pool(pool: Pool) -> Result<Self> {
        let initial = repo::total_pending(&pool).await?;
        let (pending, _) = watch::channel(initial);
        let (revision, _) = watch::channel(0);
        Ok(Self {
            pool,
            pending: Arc::new(pending),
            revision: Arc::new(revision),
            publish: Arc::new(Mutex::new(())),
        })
    }

    /// Open a file-backed store and apply migrations.
    pub async fn open(database_url: &str) -> Result<Self> {
        let pool = repo::init_pool(database_url).await?;
        repo::run_migrations(&pool).await?;
        Self::from_pool(pool).await
    }

    /// Fresh migrated in-memory store.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = repo::init_memory_pool().await?;
        repo::run_migrations(&pool).await?;
        Self::from_pool(pool).await
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Pending rows across both outbox tables as of the last committed write.
    pub fn pending_count(&self) -> i64 {
        *self.pending.borrow()
    }

    pub fn subscribe_pending(&self) -> watch::Receiver<i64> {
        self.pending.subscribe()
    }

    /// Receiver that observes a change after every committed outbox write.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Re-read the pending total from the database and publish it.
    pub async fn refresh_pending(&self) -> Result<i64> {
        let _publish = self.publish.lock().await;
        let total = repo::total_pending(&self.pool).await?;
        self.publish_pending(total);
        Ok(total)
    }

    fn publish_pending(&self, total: i64) {
        self.pending.send_if_modified(|current| {
            if *current == total {
                false
            } else {
                *current = total;
                true
            }
        });
    }

    fn publish_write<T>(&self, write: &Committed<T>) {
        self.publish_pending(write.pending_total);
        self.revision.send_modify(|rev| *rev += 1);
        debug!(
            revision = *self.revision.borrow(),
            pending = write.pending_total,
            "outbox changed"
        );
    }

    pub async fn insert_quiz_attempt(&self, attempt: &NewQuizAttempt) -> Result<i64> {
        let _publish = self.publish.lock().await;
        let write = repo::insert_quiz_attempt(&self.pool, attempt).await?;
        self.publish_write(&write);
        Ok(write.value)
    }

    pub async fn insert_submission(&self, submission: &NewSubmission) -> Result<i64> {
        let _publish = self.publish.lock().await;
        let write = repo::insert_submission(&self.pool, submission).await?;
        self.publish_write(&write);
        Ok(write.value)
    }

    pub async fn pending_quiz_attempts(&self) -> Result<Vec<QuizAttempt>> {
        repo::pending_quiz_attempts(&self.pool).await
    }

    pub async fn pending_submissions(&self) -> Result<Vec<Submission>> {
        repo::pending_submissions(&self.pool).await
    }

    pub async fn quiz_attempts_by_ids(&self, ids: &[i64]) -> Result<Vec<QuizAttempt>> {
        repo::quiz_attempts_by_ids(&self.pool, ids).await
    }

    pub async fn submissions_by_ids(&self, ids: &[i64]) -> Result<Vec<Submission>> {
        repo::submissions_by_ids(&self.pool, ids).await
    }

    /// Flip `ids` to synced. Returns the number of rows that changed; a
    /// no-op flip publishes nothing.
    pub async fn mark_synced(&self, table: OutboxTable, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let _publish = self.publish.lock().await;
        let write = repo::mark_synced(&self.pool, table, ids).await?;
        if write.value > 0 {
            self.publish_write(&write);
        }
        Ok(write.value)
    }

    pub async fn count_pending(&self, table: OutboxTable) -> Result<i64> {
        repo::count_pending(&self.pool, table).await
    }

    /// Pending rows across both outbox tables, read from the database.
    pub async fn total_pending(&self) -> Result<i64> {
        repo::total_pending(&self.pool).await
    }

    pub async fn count_by_status(&self, table: OutboxTable) -> Result<StatusCounts> {
        repo::count_by_status(&self.pool, table).await
    }
}
