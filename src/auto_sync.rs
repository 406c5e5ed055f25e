//! Auto-sync policy: trigger once at startup when there is something to
//! send, then on every offline -> online edge. Manual triggers keep working
//! whether or not this task runs.

use crate::connectivity::{ConnectivityEvent, ConnectivityMonitor};
use crate::engine::{SyncEngine, SyncOutcome};
use crate::status::PendingCountProjector;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub fn spawn(
    engine: Arc<SyncEngine>,
    connectivity: ConnectivityMonitor,
    pending: Arc<PendingCountProjector>,
) -> JoinHandle<()> {
    // Subscribe before the startup check so an edge racing it is not lost.
    let mut events = connectivity.subscribe_events();
    tokio::spawn(async move {
        if connectivity.is_online() && pending.pending_count() > 0 {
            info!(
                pending = pending.pending_count(),
                "pending rows at startup; attempting sync"
            );
            run(&engine).await;
        }

        loop {
            match events.recv().await {
                Ok(ConnectivityEvent::BecameOnline) => {
                    info!("back online; attempting sync");
                    run(&engine).await;
                }
                Ok(ConnectivityEvent::BecameOffline) => debug!("went offline"),
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "connectivity events lagged");
                    if connectivity.is_online() {
                        run(&engine).await;
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

async fn run(engine: &SyncEngine) {
    match engine.trigger_sync().await {
        Ok(SyncOutcome::Completed(report)) if !report.is_success() => {
            // Already recorded as the engine's last error.
            debug!(?report, "auto sync completed with errors");
        }
        Ok(SyncOutcome::Completed(report)) => {
            debug!(synced = report.synced_rows(), "auto sync completed")
        }
        Ok(SyncOutcome::AlreadyRunning) => debug!("auto sync skipped; run in flight"),
        Err(err) => error!(%err, "auto sync failed"),
    }
}
