use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use lms_sync::config;
use lms_sync::db::{self, Store};
use lms_sync::model::OutboxTable;
use lms_sync::remote::model::device_timestamp;

#[derive(Debug, Parser)]
#[command(author, version, about = "Print outbox status counts and pending rows")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Only print the per-table counts
    #[arg(long)]
    counts_only: bool,
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
    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.database_url());
    let store = Store::open(&database_url).await?;

    for table in OutboxTable::ALL {
        let counts = store.count_by_status(table).await?;
        println!(
            "{:<14} pending={} synced={} failed={}",
            table, counts.pending, counts.synced, counts.failed
        );
    }
    if args.counts_only {
        return Ok(());
    }

    for a in db::pending_quiz_attempts(store.pool()).await? {
        println!(
            "quiz_attempt #{} quiz={} student={} score={} at={} key={}",
            a.id,
            a.quiz_id,
            a.student_id,
            a.score,
            device_timestamp(&a.timestamp),
            a.client_key
        );
    }
    for s in db::pending_submissions(store.pool()).await? {
        println!(
            "submission   #{} assignment={} student={} text={} file={} at={} key={}",
            s.id,
            s.assignment_id,
            s.student_id,
            s.text_answer.is_some(),
            s.attachment.as_ref().map(|a| a.file_name.as_str()).unwrap_or("-"),
            device_timestamp(&s.timestamp),
            s.client_key
        );
    }
    Ok(())
}
