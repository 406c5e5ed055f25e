mod common;

use common::{quiz_attempt, setup_store, submission, RecordingRemote};
use lms_sync::connectivity::ConnectivityMonitor;
use lms_sync::engine::{SyncEngine, SyncError, SyncOutcome, SyncState, TableOutcome};
use lms_sync::model::{OutboxTable, SyncStatus};
use lms_sync::status::{PendingCountProjector, SyncHandle};
use std::sync::Arc;

fn completed(outcome: Result<SyncOutcome, SyncError>) -> lms_sync::engine::SyncReport {
    match outcome {
        Ok(SyncOutcome::Completed(report)) => report,
        other => panic!("expected a completed run, got {:?}", other),
    }
}

#[tokio::test]
async fn offline_trigger_fails_fast_without_io() {
    let store = setup_store().await;
    let remote = RecordingRemote::default();
    let engine = SyncEngine::new(
        store.clone(),
        Arc::new(remote.clone()),
        ConnectivityMonitor::new(false),
    );
    store.insert_quiz_attempt(&quiz_attempt("s1")).await.unwrap();

    let err = engine.trigger_sync().await.unwrap_err();
    assert_eq!(err, SyncError::NotConnected);
    assert_eq!(
        engine.state().last_error.as_deref(),
        Some("Cannot sync: No internet connection")
    );
    assert!(!engine.is_syncing());
    assert_eq!(store.total_pending().await.unwrap(), 1);
    assert!(remote.quiz_batches().await.is_empty());
    assert!(remote.submission_batches().await.is_empty());
}

#[tokio::test]
async fn nothing_pending_means_no_request() {
    let store = setup_store().await;
    let remote = RecordingRemote::default();
    let engine = SyncEngine::new(
        store.clone(),
        Arc::new(remote.clone()),
        ConnectivityMonitor::new(true),
    );
    let revision = store.revision();

    let report = completed(engine.trigger_sync().await);
    assert_eq!(report.quiz_attempts, TableOutcome::Empty);
    assert_eq!(report.submissions, TableOutcome::Empty);
    assert!(remote.quiz_batches().await.is_empty());
    assert!(remote.submission_batches().await.is_empty());
    assert_eq!(engine.state(), SyncState::default());
    assert_eq!(store.revision(), revision);
}

#[tokio::test]
async fn accepted_batches_flip_rows_to_synced() {
    let store = setup_store().await;
    let remote = RecordingRemote::default();
    let engine = SyncEngine::new(
        store.clone(),
        Arc::new(remote.clone()),
        ConnectivityMonitor::new(true),
    );
    let q1 = store.insert_quiz_attempt(&quiz_attempt("s1")).await.unwrap();
    let q2 = store.insert_quiz_attempt(&quiz_attempt("s2")).await.unwrap();
    let s1 = store.insert_submission(&submission("my essay")).await.unwrap();

    let report = completed(engine.trigger_sync().await);
    assert_eq!(
        report.quiz_attempts,
        TableOutcome::Synced {
            uploaded: 2,
            marked: 2
        }
    );
    assert_eq!(
        report.submissions,
        TableOutcome::Synced {
            uploaded: 1,
            marked: 1
        }
    );

    let quiz_batches = remote.quiz_batches().await;
    assert_eq!(quiz_batches.len(), 1);
    assert_eq!(quiz_batches[0].len(), 2);
    assert_eq!(quiz_batches[0][0].device_timestamp, "2024-05-01T08:30:00.000Z");
    assert!(!quiz_batches[0][0].is_late);
    let submission_batches = remote.submission_batches().await;
    assert_eq!(submission_batches.len(), 1);
    assert_eq!(
        submission_batches[0][0].content_text.as_deref(),
        Some("my essay")
    );

    for row in store.quiz_attempts_by_ids(&[q1, q2]).await.unwrap() {
        assert_eq!(row.sync_status, SyncStatus::Synced);
    }
    let subs = store.submissions_by_ids(&[s1]).await.unwrap();
    assert_eq!(subs[0].sync_status, SyncStatus::Synced);

    let state = engine.state();
    assert!(!state.is_syncing);
    assert!(state.last_error.is_none());
    assert!(state.last_synced_at.is_some());
    assert_eq!(store.total_pending().await.unwrap(), 0);

    // Everything is synced now; a second run sends nothing.
    completed(engine.trigger_sync().await);
    assert_eq!(remote.quiz_batches().await.len(), 1);
}

#[tokio::test]
async fn failed_submission_stays_pending_until_retry_succeeds() {
    let store = setup_store().await;
    let remote = RecordingRemote::with_script(vec![Some("service unavailable")]);
    let engine = Arc::new(SyncEngine::new(
        store.clone(),
        Arc::new(remote.clone()),
        ConnectivityMonitor::new(true),
    ));
    let pending = Arc::new(PendingCountProjector::start(store.clone()).await.unwrap());
    let handle = SyncHandle::new(engine.clone(), pending.clone());

    let id = store.insert_submission(&submission("late essay")).await.unwrap();
    assert_eq!(pending.refresh().await, 1);

    let report = completed(handle.trigger_sync().await);
    assert!(matches!(
        report.submissions,
        TableOutcome::Failed(SyncError::RemoteRejected {
            table: OutboxTable::Submissions,
            ..
        })
    ));
    let error = handle.last_sync_error().unwrap();
    assert!(error.contains("service unavailable"), "{}", error);
    assert_eq!(pending.refresh().await, 1);
    let snapshot = handle.snapshot();
    assert!(snapshot.is_online);
    assert!(!snapshot.is_syncing);
    assert_eq!(snapshot.pending_count, 1);
    assert_eq!(
        store.submissions_by_ids(&[id]).await.unwrap()[0].sync_status,
        SyncStatus::Pending
    );

    // Remote recovers: the retry clears the error and confirms the row.
    let report = completed(handle.trigger_sync().await);
    assert!(report.is_success());
    assert!(handle.last_sync_error().is_none());
    assert_eq!(pending.refresh().await, 0);
    assert_eq!(
        store.submissions_by_ids(&[id]).await.unwrap()[0].sync_status,
        SyncStatus::Synced
    );

    // The retried upload carries the same idempotency key.
    let batches = remote.submission_batches().await;
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0][0].client_key, batches[1][0].client_key);
}

#[tokio::test]
async fn one_table_failing_does_not_block_the_other() {
    let store = setup_store().await;
    // First call (quiz attempts) fails, second (submissions) is accepted.
    let remote = RecordingRemote::with_script(vec![Some("quiz table locked"), None]);
    let engine = SyncEngine::new(
        store.clone(),
        Arc::new(remote.clone()),
        ConnectivityMonitor::new(true),
    );
    store.insert_quiz_attempt(&quiz_attempt("s1")).await.unwrap();
    store.insert_submission(&submission("essay")).await.unwrap();

    let report = completed(engine.trigger_sync().await);
    assert!(matches!(report.quiz_attempts, TableOutcome::Failed(_)));
    assert_eq!(
        report.submissions,
        TableOutcome::Synced {
            uploaded: 1,
            marked: 1
        }
    );
    assert_eq!(store.count_pending(OutboxTable::QuizAttempts).await.unwrap(), 1);
    assert_eq!(store.count_pending(OutboxTable::Submissions).await.unwrap(), 0);

    let error = engine.state().last_error.unwrap();
    assert!(error.starts_with("quiz_attempts:"), "{}", error);
    assert!(engine.state().last_synced_at.is_none());
}

#[tokio::test]
async fn store_failure_is_reported_not_fatal() {
    let store = setup_store().await;
    let remote = RecordingRemote::default();
    let engine = SyncEngine::new(
        store.clone(),
        Arc::new(remote.clone()),
        ConnectivityMonitor::new(true),
    );
    store.insert_quiz_attempt(&quiz_attempt("s1")).await.unwrap();
    store.pool().close().await;

    let report = completed(engine.trigger_sync().await);
    assert!(matches!(
        report.quiz_attempts,
        TableOutcome::Failed(SyncError::StoreUnavailable {
            table: OutboxTable::QuizAttempts,
            ..
        })
    ));
    assert!(matches!(
        report.submissions,
        TableOutcome::Failed(SyncError::StoreUnavailable {
            table: OutboxTable::Submissions,
            ..
        })
    ));
    assert!(remote.quiz_batches().await.is_empty());
    assert!(!engine.is_syncing());
    assert!(engine.state().last_error.is_some());

    // The guard was released; the engine still accepts triggers.
    assert!(matches!(
        engine.trigger_sync().await,
        Ok(SyncOutcome::Completed(_))
    ));
}

#[tokio::test]
async fn pending_count_follows_inserts_and_flips() {
    let store = setup_store().await;
    let remote = RecordingRemote::default();
    let engine = SyncEngine::new(
        store.clone(),
        Arc::new(remote.clone()),
        ConnectivityMonitor::new(true),
    );
    let pending = PendingCountProjector::start(store.clone()).await.unwrap();
    let mut rx = pending.subscribe();
    assert_eq!(pending.pending_count(), 0);

    store.insert_quiz_attempt(&quiz_attempt("s1")).await.unwrap();
    assert_eq!(pending.pending_count(), 1);
    store.insert_submission(&submission("a")).await.unwrap();
    store.insert_submission(&submission("b")).await.unwrap();
    assert_eq!(pending.pending_count(), 3);
    assert_eq!(*rx.borrow_and_update(), 3);

    completed(engine.trigger_sync().await);
    assert_eq!(pending.pending_count(), 0);
    assert!(rx.has_changed().unwrap());
    assert_eq!(store.total_pending().await.unwrap(), 0);
}

#[tokio::test]
async fn empty_trigger_leaves_state_untouched() {
    let store = setup_store().await;
    let remote = RecordingRemote::default();
    let connectivity = ConnectivityMonitor::new(false);
    let engine = SyncEngine::new(
        store.clone(),
        Arc::new(remote.clone()),
        connectivity.clone(),
    );
    engine.trigger_sync().await.unwrap_err();
    connectivity.set_online(true);

    let before = engine.state();
    assert!(before.last_error.is_some());
    let mut observer = engine.subscribe();
    observer.borrow_and_update();

    let report = completed(engine.trigger_sync().await);
    assert_eq!(report.quiz_attempts, TableOutcome::Empty);
    assert_eq!(report.submissions, TableOutcome::Empty);
    assert!(!observer.has_changed().unwrap());
    assert_eq!(engine.state(), before);
    assert!(remote.quiz_batches().await.is_empty());
}
