use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Question id -> selected option index.
pub type Answers = BTreeMap<String, i64>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Synced,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Failed => "failed",
        }
    }

    pub fn parse_status(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SyncStatus::Pending),
            "synced" => Some(SyncStatus::Synced),
            "failed" => Some(SyncStatus::Failed),
            _ => None,
        }
    }
}

/// The two outbox tables, in the order the engine drains them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OutboxTable {
    QuizAttempts,
    Submissions,
}

impl OutboxTable {
    pub const ALL: [OutboxTable; 2] = [OutboxTable::QuizAttempts, OutboxTable::Submissions];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxTable::QuizAttempts => "quiz_attempts",
            OutboxTable::Submissions => "submissions",
        }
    }
}

impl std::fmt::Display for OutboxTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }

    pub fn parse_role(s: &str) -> Option<Self> {
        match s {
            "student" => Some(Role::Student),
            "teacher" => Some(Role::Teacher),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub role: Role,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub title: String,
    pub code: String,
    pub description: String,
    pub is_downloaded: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MaterialKind {
    Pdf,
    Video,
    Text,
}

impl MaterialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaterialKind::Pdf => "pdf",
            MaterialKind::Video => "video",
            MaterialKind::Text => "text",
        }
    }

    pub fn parse_kind(s: &str) -> Option<Self> {
        match s {
            "pdf" => Some(MaterialKind::Pdf),
            "video" => Some(MaterialKind::Video),
            "text" => Some(MaterialKind::Text),
            _ => None,
        }
    }
}

/// Material body: inline text or the downloaded file bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum MaterialContent {
    Text(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub kind: MaterialKind,
    pub content: MaterialContent,
    pub local_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub text: String,
    pub options: Vec<String>,
    pub correct_option: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub questions: Vec<Question>,
}

/// A graded quiz attempt waiting in (or drained from) the outbox.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuizAttempt {
    pub id: i64,
    pub client_key: String,
    pub quiz_id: String,
    pub student_id: String,
    pub answers: Answers,
    pub score: f64,
    pub timestamp: DateTime<Utc>,
    pub sync_status: SyncStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewQuizAttempt {
    pub quiz_id: String,
    pub student_id: String,
    pub answers: Answers,
    pub score: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Submission {
    pub id: i64,
    pub client_key: String,
    pub assignment_id: String,
    pub student_id: String,
    pub text_answer: Option<String>,
    pub attachment: Option<Attachment>,
    pub timestamp: DateTime<Utc>,
    pub sync_status: SyncStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubmission {
    pub assignment_id: String,
    pub student_id: String,
    pub text_answer: Option<String>,
    pub attachment: Option<Attachment>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_status_round_trips_through_text() {
        for status in [SyncStatus::Pending, SyncStatus::Synced, SyncStatus::Failed] {
            assert_eq!(SyncStatus::parse_status(status.as_str()), Some(status));
        }
        assert_eq!(SyncStatus::parse_status("PENDING"), None);
    }

    #[test]
    fn question_uses_camel_case_on_the_wire() {
        let q: Question = serde_json::from_str(
            r#"{"id":"q1","text":"2+2?","options":["3","4"],"correctOption":1}"#,
        )
        .unwrap();
        assert_eq!(q.correct_option, 1);
    }

    #[test]
    fn reference_data_shares_one_naming_convention() {
        let quiz = Quiz {
            id: "quiz-1".into(),
            course_id: "1".into(),
            title: "Basics".into(),
            questions: vec![Question {
                id: "q1".into(),
                text: "2+2?".into(),
                options: vec!["3".into(), "4".into()],
                correct_option: 1,
            }],
        };
        let json = serde_json::to_value(&quiz).unwrap();
        assert_eq!(json["courseId"], "1");
        assert_eq!(json["questions"][0]["correctOption"], 1);

        let course: Course = serde_json::from_str(
            r#"{"id":"1","title":"Automotive","code":"AUTO","description":"","isDownloaded":true}"#,
        )
        .unwrap();
        assert!(course.is_downloaded);
    }
}
