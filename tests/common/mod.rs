#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use lms_sync::db::Store;
use lms_sync::model::{NewQuizAttempt, NewSubmission};
use lms_sync::remote::model::{AssignmentSubmissionRow, QuizSubmissionRow};
use lms_sync::remote::{RemoteError, RemoteService};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify};

pub async fn setup_store() -> Store {
    Store::open_in_memory().await.unwrap()
}

pub fn quiz_attempt(student: &str) -> NewQuizAttempt {
    NewQuizAttempt {
        quiz_id: "quiz-1".into(),
        student_id: student.into(),
        answers: BTreeMap::from([("q1".to_string(), 1), ("q2".to_string(), 0)]),
        score: 2.0,
        timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap(),
    }
}

pub fn submission(text: &str) -> NewSubmission {
    NewSubmission {
        assignment_id: "essay-1".into(),
        student_id: "student-1".into(),
        text_answer: Some(text.into()),
        attachment: None,
        timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
    }
}

pub async fn wait_for_pending(rx: &mut watch::Receiver<i64>, expected: i64) {
    let _ = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|n| *n == expected))
        .await
        .unwrap_or_else(|_| panic!("pending count never reached {}", expected))
        .unwrap();
}

/// Holds an upload open until the test releases it.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

/// Fake remote: records every batch, replays scripted failures in call
/// order (`None` = accept), optionally blocks inside the upload.
#[derive(Clone, Default)]
pub struct RecordingRemote {
    failures: Arc<Mutex<VecDeque<Option<String>>>>,
    quiz_batches: Arc<Mutex<Vec<Vec<QuizSubmissionRow>>>>,
    submission_batches: Arc<Mutex<Vec<Vec<AssignmentSubmissionRow>>>>,
    gate: Option<Arc<Gate>>,
}

impl RecordingRemote {
    pub fn with_script(script: Vec<Option<&str>>) -> Self {
        Self {
            failures: Arc::new(Mutex::new(
                script.into_iter().map(|s| s.map(str::to_string)).collect(),
            )),
            ..Default::default()
        }
    }

    pub fn gated() -> (Self, Arc<Gate>) {
        let gate = Arc::new(Gate::default());
        let remote = Self {
            gate: Some(gate.clone()),
            ..Default::default()
        };
        (remote, gate)
    }

    pub async fn quiz_batches(&self) -> Vec<Vec<QuizSubmissionRow>> {
        self.quiz_batches.lock().await.clone()
    }

    pub async fn submission_batches(&self) -> Vec<Vec<AssignmentSubmissionRow>> {
        self.submission_batches.lock().await.clone()
    }

    async fn respond(&self) -> Result<(), RemoteError> {
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        match self.failures.lock().await.pop_front().flatten() {
            Some(message) => Err(RemoteError::Rejected {
                status: 503,
                message,
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteService for RecordingRemote {
    async fn insert_quiz_submissions(&self, rows: &[QuizSubmissionRow]) -> Result<(), RemoteError> {
        self.quiz_batches.lock().await.push(rows.to_vec());
        self.respond().await
    }

    async fn insert_assignment_submissions(
        &self,
        rows: &[AssignmentSubmissionRow],
    ) -> Result<(), RemoteError> {
        self.submission_batches.lock().await.push(rows.to_vec());
        self.respond().await
    }
}
