use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Url;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use lms_sync::auto_sync;
use lms_sync::config;
use lms_sync::connectivity::{ConnectivityMonitor, HttpProbe, ReachabilityProbe};
use lms_sync::db::Store;
use lms_sync::engine::SyncEngine;
use lms_sync::remote::RestClient;
use lms_sync::status::{PendingCountProjector, SyncHandle};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
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

    let probe_url = Url::parse(cfg.probe_url())
        .with_context(|| format!("invalid probe url {}", cfg.probe_url()))?;
    let probe: Arc<dyn ReachabilityProbe> = Arc::new(HttpProbe::new(probe_url, cfg.probe_timeout())?);
    let connectivity = ConnectivityMonitor::new(probe.is_reachable().await);
    let poller = connectivity.spawn_polling(probe, cfg.poll_interval());

    let remote = Arc::new(RestClient::from_config(&cfg)?);
    let engine = Arc::new(SyncEngine::new(store.clone(), remote, connectivity.clone()));
    let pending = Arc::new(PendingCountProjector::start(store.clone()).await?);
    let handle = SyncHandle::new(engine.clone(), pending.clone());

    info!(status = ?handle.snapshot(), "starting sync agent");

    let auto = cfg
        .sync
        .auto_sync
        .then(|| auto_sync::spawn(engine.clone(), connectivity.clone(), pending.clone()));
    if auto.is_none() {
        warn!("auto sync disabled; rows sync only on manual trigger");
    }

    // Log every observable status change until Ctrl-C.
    let mut online = connectivity.subscribe();
    let mut state = engine.subscribe();
    let mut count = pending.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Ok(()) = online.changed() => {}
            Ok(()) = state.changed() => {}
            Ok(()) = count.changed() => {}
        }
        info!(status = ?handle.snapshot(), "status changed");
    }

    info!(status = ?handle.snapshot(), "shutting down");
    poller.abort();
    if let Some(task) = auto {
        task.abort();
    }
    Ok(())
}
