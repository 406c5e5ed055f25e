use anyhow::{bail, Context, Result};
use clap::Parser;
use reqwest::Url;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use lms_sync::config;
use lms_sync::connectivity::{ConnectivityMonitor, HttpProbe, ReachabilityProbe};
use lms_sync::db::Store;
use lms_sync::engine::{SyncEngine, SyncOutcome, TableOutcome};
use lms_sync::remote::RestClient;
use lms_sync::status::{PendingCountProjector, SyncHandle};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Upload all pending outbox rows once and exit"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Skip the reachability probe and assume the network is up
    #[arg(long)]
    assume_online: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.database_url());
    let store = Store::open(&database_url).await?;

    let online = if args.assume_online {
        true
    } else {
        let probe_url = Url::parse(cfg.probe_url())
            .with_context(|| format!("invalid probe url {}", cfg.probe_url()))?;
        HttpProbe::new(probe_url, cfg.probe_timeout())?
            .is_reachable()
            .await
    };
    let connectivity = ConnectivityMonitor::new(online);

    let remote = Arc::new(RestClient::from_config(&cfg)?);
    let engine = Arc::new(SyncEngine::new(store.clone(), remote, connectivity));
    let pending = Arc::new(PendingCountProjector::start(store).await?);
    let handle = SyncHandle::new(engine, pending.clone());

    info!(pending = handle.pending_count(), "starting manual sync");
    if handle.pending_count() == 0 {
        info!("no pending rows, exiting");
        return Ok(());
    }

    let report = match handle.trigger_sync().await {
        Ok(SyncOutcome::Completed(report)) => report,
        Ok(SyncOutcome::AlreadyRunning) => bail!("another sync is already running"),
        Err(err) => {
            error!(%err, "sync not attempted");
            return Err(err.into());
        }
    };

    for (table, outcome) in [
        ("quiz_attempts", &report.quiz_attempts),
        ("submissions", &report.submissions),
    ] {
        match outcome {
            TableOutcome::Empty => info!(table, "nothing pending"),
            TableOutcome::Synced { uploaded, marked } => {
                info!(table, uploaded, marked, "batch confirmed")
            }
            TableOutcome::Failed(err) => warn!(table, %err, "batch failed; rows stay pending"),
        }
    }

    let remaining = pending.refresh().await;
    info!(remaining, "manual sync finished");
    if let Some(msg) = report.error_message() {
        bail!("sync finished with errors: {}", msg);
    }
    Ok(())
}
