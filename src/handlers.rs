//! User-action handlers. Each one persists its outbox row before returning,
//! so a completed action survives a crash or a lost connection.

use crate::db::{self, Store};
use crate::model::{Answers, NewQuizAttempt, NewSubmission, Quiz};
use chrono::Utc;
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("quiz {0} not found")]
    UnknownQuiz(String),
    #[error("quiz {quiz_id} has no question {question_id}")]
    UnknownQuestion {
        quiz_id: String,
        question_id: String,
    },
    #[error("submission must carry text or an attachment")]
    EmptySubmission,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Number of answers matching the question's correct option.
pub fn grade(quiz: &Quiz, answers: &Answers) -> Result<f64, HandlerError> {
    let mut correct = 0u32;
    for (question_id, selected) in answers {
        let question = quiz
            .questions
            .iter()
            .find(|q| &q.id == question_id)
            .ok_or_else(|| HandlerError::UnknownQuestion {
                quiz_id: quiz.id.clone(),
                question_id: question_id.clone(),
            })?;
        if question.correct_option == *selected {
            correct += 1;
        }
    }
    Ok(f64::from(correct))
}

/// Grade and enqueue a quiz attempt. Returns the local outbox id.
#[instrument(skip_all, fields(quiz_id = %quiz_id, student_id = %student_id))]
pub async fn record_quiz_attempt(
    store: &Store,
    quiz_id: &str,
    student_id: &str,
    answers: Answers,
) -> Result<i64, HandlerError> {
    let quiz = db::get_quiz(store.pool(), quiz_id)
        .await?
        .ok_or_else(|| HandlerError::UnknownQuiz(quiz_id.to_string()))?;
    let score = grade(&quiz, &answers)?;

    let id = store
        .insert_quiz_attempt(&NewQuizAttempt {
            quiz_id: quiz.id,
            student_id: student_id.to_string(),
            answers,
            score,
            timestamp: Utc::now(),
        })
        .await?;
    info!(id, score, "quiz attempt queued");
    Ok(id)
}

/// Enqueue an assignment submission. Returns the local outbox id.
#[instrument(skip_all, fields(assignment_id = %submission.assignment_id))]
pub async fn submit_assignment(
    store: &Store,
    submission: NewSubmission,
) -> Result<i64, HandlerError> {
    let has_text = submission
        .text_answer
        .as_deref()
        .is_some_and(|t| !t.trim().is_empty());
    if !has_text && submission.attachment.is_none() {
        return Err(HandlerError::EmptySubmission);
    }
    let id = store.insert_submission(&submission).await?;
    info!(id, "assignment submission queued");
    Ok(id)
}
