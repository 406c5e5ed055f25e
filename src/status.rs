//! Read-side projections for observers: the live pending count and the
//! combined status snapshot.

use crate::db::Store;
use crate::engine::{SyncEngine, SyncError, SyncOutcome};
use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;

/// Pending rows across both outbox tables. The value is published by the
/// store's writers before they return, so it always matches the last
/// committed write.
#[derive(Debug, Clone)]
pub struct PendingCountProjector {
    store: Store,
}

impl PendingCountProjector {
    /// Attach to `store`, re-reading the count once in case the database
    /// was written before the store handle existed.
    pub async fn start(store: Store) -> Result<Self> {
        store.refresh_pending().await?;
        Ok(Self { store })
    }

    pub fn pending_count(&self) -> i64 {
        self.store.pending_count()
    }

    pub fn subscribe(&self) -> watch::Receiver<i64> {
        self.store.subscribe_pending()
    }

    /// Re-read the count from the database. On a store error the last
    /// published value is kept.
    pub async fn refresh(&self) -> i64 {
        if let Err(err) = self.store.refresh_pending().await {
            warn!(?err, "failed to recount pending outbox rows");
        }
        self.pending_count()
    }
}

/// Everything an observer needs in one value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub is_online: bool,
    pub is_syncing: bool,
    pub pending_count: i64,
    pub last_sync_error: Option<String>,
}

/// Observer-facing facade: read-only status plus the manual trigger.
#[derive(Clone)]
pub struct SyncHandle {
    engine: Arc<SyncEngine>,
    pending: Arc<PendingCountProjector>,
}

impl SyncHandle {
    pub fn new(engine: Arc<SyncEngine>, pending: Arc<PendingCountProjector>) -> Self {
        Self { engine, pending }
    }

    pub fn is_online(&self) -> bool {
        self.engine.connectivity().is_online()
    }

    pub fn is_syncing(&self) -> bool {
        self.engine.is_syncing()
    }

    pub fn pending_count(&self) -> i64 {
        self.pending.pending_count()
    }

    pub fn last_sync_error(&self) -> Option<String> {
        self.engine.state().last_error
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let state = self.engine.state();
        StatusSnapshot {
            is_online: self.is_online(),
            is_syncing: state.is_syncing,
            pending_count: self.pending_count(),
            last_sync_error: state.last_error,
        }
    }

    pub async fn trigger_sync(&self) -> Result<SyncOutcome, SyncError> {
        self.engine.trigger_sync().await
    }
}
