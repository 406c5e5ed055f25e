//! The sync engine: drains the outbox tables into the remote service.
//!
//! A run snapshots the pending rows of one table, uploads them as a single
//! batch and, only if the remote accepted it, flips exactly the snapshotted
//! ids to `synced`. Rows inserted while the upload is in flight are not in
//! the snapshot and wait for the next run. Tables are processed in order
//! (quiz attempts, then submissions) and a failure in one does not stop the
//! other.

use crate::connectivity::ConnectivityMonitor;
use crate::db::Store;
use crate::model::OutboxTable;
use crate::remote::model::{AssignmentSubmissionRow, QuizSubmissionRow};
use crate::remote::RemoteService;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("Cannot sync: No internet connection")]
    NotConnected,
    #[error("{table}: remote rejected batch: {cause}")]
    RemoteRejected { table: OutboxTable, cause: String },
    #[error("{table}: local store unavailable: {cause}")]
    StoreUnavailable { table: OutboxTable, cause: String },
}

/// Engine state published to observers. Single writer: the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
    pub is_syncing: bool,
    pub last_error: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOutcome {
    /// Nothing pending; no request issued.
    Empty,
    /// Batch accepted; `marked` rows flipped to synced.
    Synced { uploaded: usize, marked: u64 },
    Failed(SyncError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub quiz_attempts: TableOutcome,
    pub submissions: TableOutcome,
}

impl SyncReport {
    pub fn errors(&self) -> Vec<&SyncError> {
        [&self.quiz_attempts, &self.submissions]
            .into_iter()
            .filter_map(|o| match o {
                TableOutcome::Failed(err) => Some(err),
                _ => None,
            })
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.errors().is_empty()
    }

    /// All table errors joined, or `None` when the run succeeded.
    pub fn error_message(&self) -> Option<String> {
        let errors = self.errors();
        if errors.is_empty() {
            return None;
        }
        Some(
            errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    pub fn synced_rows(&self) -> u64 {
        [&self.quiz_attempts, &self.submissions]
            .into_iter()
            .map(|o| match o {
                TableOutcome::Synced { marked, .. } => *marked,
                _ => 0,
            })
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Another run held the single-flight guard; nothing was done.
    AlreadyRunning,
}

pub struct SyncEngine {
    store: Store,
    remote: Arc<dyn RemoteService>,
    connectivity: ConnectivityMonitor,
    in_flight: AtomicBool,
    state: watch::Sender<SyncState>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

/// Releases the single-flight flag on every exit path.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncEngine {
    pub fn new(
        store: Store,
        remote: Arc<dyn RemoteService>,
        connectivity: ConnectivityMonitor,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::default());
        Self {
            store,
            remote,
            connectivity,
            in_flight: AtomicBool::new(false),
            state,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    pub fn is_syncing(&self) -> bool {
        self.state.borrow().is_syncing
    }

    /// Run one sync pass. Safe to call repeatedly and concurrently: while a
    /// pass is in flight further calls return `AlreadyRunning` at once.
    #[instrument(skip_all)]
    pub async fn trigger_sync(&self) -> Result<SyncOutcome, SyncError> {
        if !self.connectivity.is_online() {
            warn!("sync requested while offline");
            let err = SyncError::NotConnected;
            self.state
                .send_modify(|s| s.last_error = Some(err.to_string()));
            return Err(err);
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("sync already in flight; ignoring trigger");
            return Ok(SyncOutcome::AlreadyRunning);
        }
        let _guard = FlightGuard(&self.in_flight);

        // Nothing committed is pending: no request, and observers see no change.
        if self.store.pending_count() == 0 {
            debug!("nothing pending; skipping sync");
            return Ok(SyncOutcome::Completed(SyncReport {
                quiz_attempts: TableOutcome::Empty,
                submissions: TableOutcome::Empty,
            }));
        }

        self.state.send_modify(|s| s.is_syncing = true);

        let quiz_attempts = outcome(self.sync_quiz_attempts().await);
        let submissions = outcome(self.sync_submissions().await);
        let report = SyncReport {
            quiz_attempts,
            submissions,
        };

        let error = report.error_message();
        match &error {
            Some(msg) => warn!(error = %msg, "sync finished with errors"),
            None => info!(synced = report.synced_rows(), "sync finished"),
        }
        let confirmed = error.is_none() && report.synced_rows() > 0;
        self.state.send_modify(|s| {
            s.is_syncing = false;
            s.last_error = error;
            if confirmed {
                s.last_synced_at = Some(Utc::now());
            }
        });

        Ok(SyncOutcome::Completed(report))
    }

    #[instrument(skip_all)]
    async fn sync_quiz_attempts(&self) -> Result<Option<(usize, u64)>, SyncError> {
        let table = OutboxTable::QuizAttempts;
        let pending = self
            .store
            .pending_quiz_attempts()
            .await
            .map_err(|e| store_error(table, e))?;
        if pending.is_empty() {
            debug!(%table, "nothing pending");
            return Ok(None);
        }

        let ids: Vec<i64> = pending.iter().map(|a| a.id).collect();
        let rows: Vec<QuizSubmissionRow> = pending.iter().map(QuizSubmissionRow::from).collect();
        info!(%table, rows = rows.len(), "uploading pending rows");

        self.remote
            .insert_quiz_submissions(&rows)
            .await
            .map_err(|e| SyncError::RemoteRejected {
                table,
                cause: e.to_string(),
            })?;

        let marked = self
            .store
            .mark_synced(table, &ids)
            .await
            .map_err(|e| store_error(table, e))?;
        Ok(Some((rows.len(), marked)))
    }

    #[instrument(skip_all)]
    async fn sync_submissions(&self) -> Result<Option<(usize, u64)>, SyncError> {
        let table = OutboxTable::Submissions;
        let pending = self
            .store
            .pending_submissions()
            .await
            .map_err(|e| store_error(table, e))?;
        if pending.is_empty() {
            debug!(%table, "nothing pending");
            return Ok(None);
        }

        let ids: Vec<i64> = pending.iter().map(|s| s.id).collect();
        let rows: Vec<AssignmentSubmissionRow> =
            pending.iter().map(AssignmentSubmissionRow::from).collect();
        info!(%table, rows = rows.len(), "uploading pending rows");

        self.remote
            .insert_assignment_submissions(&rows)
            .await
            .map_err(|e| SyncError::RemoteRejected {
                table,
                cause: e.to_string(),
            })?;

        let marked = self
            .store
            .mark_synced(table, &ids)
            .await
            .map_err(|e| store_error(table, e))?;
        Ok(Some((rows.len(), marked)))
    }
}

fn store_error(table: OutboxTable, err: anyhow::Error) -> SyncError {
    SyncError::StoreUnavailable {
        table,
        cause: format!("{:#}", err),
    }
}

fn outcome(res: Result<Option<(usize, u64)>, SyncError>) -> TableOutcome {
    match res {
        Ok(None) => TableOutcome::Empty,
        Ok(Some((uploaded, marked))) => TableOutcome::Synced { uploaded, marked },
        Err(err) => TableOutcome::Failed(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_joins_table_errors() {
        let report = SyncReport {
            quiz_attempts: TableOutcome::Failed(SyncError::RemoteRejected {
                table: OutboxTable::QuizAttempts,
                cause: "503".into(),
            }),
            submissions: TableOutcome::Synced {
                uploaded: 2,
                marked: 2,
            },
        };
        assert!(!report.is_success());
        assert_eq!(report.synced_rows(), 2);
        assert_eq!(
            report.error_message().unwrap(),
            "quiz_attempts: remote rejected batch: 503"
        );
    }

    #[test]
    fn empty_report_is_success() {
        let report = SyncReport {
            quiz_attempts: TableOutcome::Empty,
            submissions: TableOutcome::Empty,
        };
        assert!(report.is_success());
        assert_eq!(report.error_message(), None);
        assert_eq!(report.synced_rows(), 0);
    }
}
