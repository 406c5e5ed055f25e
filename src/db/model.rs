//! Raw row shapes returned by outbox queries and their conversion into the
//! domain types in `crate::model`.
//!
//! Keep these structs focused on the data returned by queries. Business logic
//! should live in higher layers.

use crate::model::{Answers, Attachment, QuizAttempt, Submission, SyncStatus};
use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QuizAttemptRow {
    pub id: i64,
    pub client_key: String,
    pub quiz_id: String,
    pub student_id: String,
    pub answers_json: String,
    pub score: f64,
    pub timestamp_ms: i64,
    pub sync_status: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubmissionRow {
    pub id: i64,
    pub client_key: String,
    pub assignment_id: String,
    pub student_id: String,
    pub text_answer: Option<String>,
    pub file_name: Option<String>,
    pub file_blob: Option<Vec<u8>>,
    pub timestamp_ms: i64,
    pub sync_status: String,
}

/// Per-status row counts for one outbox table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: i64,
    pub synced: i64,
    pub failed: i64,
}

fn parse_timestamp(id: i64, ms: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| anyhow!("row {} has out-of-range timestamp {}", id, ms))
}

fn parse_status(id: i64, s: &str) -> anyhow::Result<SyncStatus> {
    SyncStatus::parse_status(s).ok_or_else(|| anyhow!("row {} has unknown sync status {}", id, s))
}

impl TryFrom<QuizAttemptRow> for QuizAttempt {
    type Error = anyhow::Error;

    fn try_from(row: QuizAttemptRow) -> Result<Self, Self::Error> {
        let answers: Answers = serde_json::from_str(&row.answers_json)
            .with_context(|| format!("quiz attempt {} has malformed answers", row.id))?;
        Ok(QuizAttempt {
            id: row.id,
            timestamp: parse_timestamp(row.id, row.timestamp_ms)?,
            sync_status: parse_status(row.id, &row.sync_status)?,
            client_key: row.client_key,
            quiz_id: row.quiz_id,
            student_id: row.student_id,
            answers,
            score: row.score,
        })
    }
}

impl TryFrom<SubmissionRow> for Submission {
    type Error = anyhow::Error;

    fn try_from(row: SubmissionRow) -> Result<Self, Self::Error> {
        let attachment = match (row.file_name, row.file_blob) {
            (Some(file_name), Some(bytes)) => Some(Attachment { file_name, bytes }),
            (None, None) => None,
            _ => return Err(anyhow!("submission {} has a partial attachment", row.id)),
        };
        Ok(Submission {
            id: row.id,
            timestamp: parse_timestamp(row.id, row.timestamp_ms)?,
            sync_status: parse_status(row.id, &row.sync_status)?,
            client_key: row.client_key,
            assignment_id: row.assignment_id,
            student_id: row.student_id,
            text_answer: row.text_answer,
            attachment,
        })
    }
}
