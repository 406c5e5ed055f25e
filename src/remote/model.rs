use crate::model::{Answers, QuizAttempt, Submission};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// One row of the remote `quiz_submissions` bulk insert.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct QuizSubmissionRow {
    pub quiz_id: String,
    pub student_id: String,
    pub score: f64,
    pub answers_json: Answers,
    pub device_timestamp: String,
    pub is_late: bool,
    pub client_key: String,
}

/// One row of the remote `assignment_submissions` bulk insert.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AssignmentSubmissionRow {
    pub assignment_id: String,
    pub student_id: String,
    pub content_text: Option<String>,
    pub device_timestamp: String,
    pub client_key: String,
}

/// Error body returned by PostgREST-style endpoints.
#[derive(Deserialize, Debug, Default)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

/// Device time as sent to the backend, e.g. `2024-05-01T08:30:00.000Z`.
pub fn device_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl From<&QuizAttempt> for QuizSubmissionRow {
    fn from(a: &QuizAttempt) -> Self {
        Self {
            quiz_id: a.quiz_id.clone(),
            student_id: a.student_id.clone(),
            score: a.score,
            answers_json: a.answers.clone(),
            device_timestamp: device_timestamp(&a.timestamp),
            is_late: false,
            client_key: a.client_key.clone(),
        }
    }
}

impl From<&Submission> for AssignmentSubmissionRow {
    fn from(s: &Submission) -> Self {
        Self {
            assignment_id: s.assignment_id.clone(),
            student_id: s.student_id.clone(),
            content_text: s.text_answer.clone(),
            device_timestamp: device_timestamp(&s.timestamp),
            client_key: s.client_key.clone(),
        }
    }
}
