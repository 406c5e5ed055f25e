mod common;

use common::{quiz_attempt, setup_store, submission, wait_for_pending, RecordingRemote};
use lms_sync::auto_sync;
use lms_sync::connectivity::ConnectivityMonitor;
use lms_sync::engine::SyncEngine;
use lms_sync::model::SyncStatus;
use lms_sync::status::PendingCountProjector;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn going_online_drains_rows_written_offline() {
    let store = setup_store().await;
    let remote = RecordingRemote::default();
    let connectivity = ConnectivityMonitor::new(false);
    let engine = Arc::new(SyncEngine::new(
        store.clone(),
        Arc::new(remote.clone()),
        connectivity.clone(),
    ));
    let pending = Arc::new(PendingCountProjector::start(store.clone()).await.unwrap());
    let mut count = pending.subscribe();
    let task = auto_sync::spawn(engine.clone(), connectivity.clone(), pending.clone());

    let a = store.insert_quiz_attempt(&quiz_attempt("s1")).await.unwrap();
    let b = store.insert_quiz_attempt(&quiz_attempt("s2")).await.unwrap();
    assert_eq!(pending.pending_count(), 2);
    assert!(remote.quiz_batches().await.is_empty());

    connectivity.set_online(true);
    wait_for_pending(&mut count, 0).await;

    let batches = remote.quiz_batches().await;
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 2);
    for row in store.quiz_attempts_by_ids(&[a, b]).await.unwrap() {
        assert_eq!(row.sync_status, SyncStatus::Synced);
    }
    task.abort();
}

#[tokio::test]
async fn startup_with_backlog_triggers_once() {
    let store = setup_store().await;
    store.insert_submission(&submission("written yesterday")).await.unwrap();

    let remote = RecordingRemote::default();
    let connectivity = ConnectivityMonitor::new(true);
    let engine = Arc::new(SyncEngine::new(
        store.clone(),
        Arc::new(remote.clone()),
        connectivity.clone(),
    ));
    let pending = Arc::new(PendingCountProjector::start(store.clone()).await.unwrap());
    assert_eq!(pending.pending_count(), 1);
    let mut count = pending.subscribe();

    let task = auto_sync::spawn(engine, connectivity, pending.clone());
    wait_for_pending(&mut count, 0).await;
    assert_eq!(remote.submission_batches().await.len(), 1);
    task.abort();
}

#[tokio::test]
async fn offline_edge_does_not_trigger() {
    let store = setup_store().await;
    let remote = RecordingRemote::default();
    let connectivity = ConnectivityMonitor::new(true);
    let engine = Arc::new(SyncEngine::new(
        store.clone(),
        Arc::new(remote.clone()),
        connectivity.clone(),
    ));
    let pending = Arc::new(PendingCountProjector::start(store.clone()).await.unwrap());
    let task = auto_sync::spawn(engine.clone(), connectivity.clone(), pending.clone());

    connectivity.set_online(false);
    store.insert_quiz_attempt(&quiz_attempt("s1")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(remote.quiz_batches().await.is_empty());
    assert_eq!(pending.refresh().await, 1);
    assert!(engine.state().last_error.is_none());
    task.abort();
}
