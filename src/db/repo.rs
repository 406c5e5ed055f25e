use super::model::{QuizAttemptRow, StatusCounts, SubmissionRow};
use crate::model::{
    Course, Material, MaterialContent, MaterialKind, NewQuizAttempt, NewSubmission, OutboxTable,
    Question, QuizAttempt, Quiz, Role, Submission, SyncStatus, User,
};
use anyhow::{anyhow, Context, Result};
use sqlx::sqlite::{SqliteConnection, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::instrument;
use uuid::Uuid;

pub type Pool = SqlitePool;

/// Upper bound on bound parameters per `IN (...)` list; SQLite builds older
/// than 3.32 cap a statement at 999 variables.
const ID_CHUNK: usize = 500;

const QUIZ_ATTEMPT_COLUMNS: &str =
    "id, client_key, quiz_id, student_id, answers_json, score, timestamp_ms, sync_status";
const SUBMISSION_COLUMNS: &str =
    "id, client_key, assignment_id, student_id, text_answer, file_name, file_blob, timestamp_ms, sync_status";

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized)
        .await
        .with_context(|| format!("failed to open database {}", normalized))?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// Single-connection in-memory pool. Every connection to `sqlite::memory:`
/// opens a fresh database, so the pool must never grow or recycle.
pub async fn init_memory_pool() -> Result<Pool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/`, ensure the parent
/// directory exists and ask SQLite to create the file. Leaves in-memory URLs
/// untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }

    // sqlite::memory: or sqlite::memory:?cache=shared
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    match query_part {
        Some(q) if q.contains("mode=") => {
            rebuilt.push('?');
            rebuilt.push_str(q);
        }
        Some(q) => {
            rebuilt.push('?');
            rebuilt.push_str(q);
            rebuilt.push_str("&mode=rwc");
        }
        None => rebuilt.push_str("?mode=rwc"),
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Reference data
// ---------------------------------------------------------------------------

#[instrument(skip_all)]
pub async fn upsert_user(pool: &Pool, user: &User) -> Result<()> {
    sqlx::query(
        "INSERT INTO users (id, name, role, email) VALUES (?, ?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET name = excluded.name, role = excluded.role, email = excluded.email",
    )
    .bind(&user.id)
    .bind(&user.name)
    .bind(user.role.as_str())
    .bind(&user.email)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn get_user(pool: &Pool, id: &str) -> Result<Option<User>> {
    let row = sqlx::query("SELECT id, name, role, email FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let role: String = row.get("role");
    Ok(Some(User {
        id: row.get("id"),
        name: row.get("name"),
        role: Role::parse_role(&role)
            .ok_or_else(|| anyhow!("user {} has unknown role {}", id, role))?,
        email: row.get("email"),
    }))
}

#[instrument(skip_all)]
pub async fn upsert_course(pool: &Pool, course: &Course) -> Result<()> {
    sqlx::query(
        "INSERT INTO courses (id, title, code, description, is_downloaded) VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET title = excluded.title, code = excluded.code, \
         description = excluded.description, is_downloaded = excluded.is_downloaded",
    )
    .bind(&course.id)
    .bind(&course.title)
    .bind(&course.code)
    .bind(&course.description)
    .bind(course.is_downloaded)
    .execute(pool)
    .await?;
    Ok(())
}

fn course_from_row(row: &SqliteRow) -> Course {
    Course {
        id: row.get("id"),
        title: row.get("title"),
        code: row.get("code"),
        description: row.get("description"),
        is_downloaded: row.get("is_downloaded"),
    }
}

#[instrument(skip_all)]
pub async fn get_course(pool: &Pool, id: &str) -> Result<Option<Course>> {
    let row = sqlx::query(
        "SELECT id, title, code, description, is_downloaded FROM courses WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(course_from_row))
}

#[instrument(skip_all)]
pub async fn list_courses(pool: &Pool) -> Result<Vec<Course>> {
    let rows = sqlx::query(
        "SELECT id, title, code, description, is_downloaded FROM courses ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(course_from_row).collect())
}

pub async fn count_courses(pool: &Pool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM courses")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[instrument(skip_all)]
pub async fn upsert_material(pool: &Pool, material: &Material) -> Result<()> {
    let (text, blob) = match &material.content {
        MaterialContent::Text(t) => (Some(t.as_str()), None),
        MaterialContent::Bytes(b) => (None, Some(b.as_slice())),
    };
    sqlx::query(
        "INSERT INTO materials (id, course_id, title, kind, content_text, content_blob, local_path) \
         VALUES (?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET course_id = excluded.course_id, title = excluded.title, \
         kind = excluded.kind, content_text = excluded.content_text, \
         content_blob = excluded.content_blob, local_path = excluded.local_path",
    )
    .bind(&material.id)
    .bind(&material.course_id)
    .bind(&material.title)
    .bind(material.kind.as_str())
    .bind(text)
    .bind(blob)
    .bind(material.local_path.as_deref())
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn list_materials_for_course(pool: &Pool, course_id: &str) -> Result<Vec<Material>> {
    let rows = sqlx::query(
        "SELECT id, course_id, title, kind, content_text, content_blob, local_path \
         FROM materials WHERE course_id = ? ORDER BY id",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let id: String = row.get("id");
            let kind: String = row.get("kind");
            let kind = MaterialKind::parse_kind(&kind)
                .ok_or_else(|| anyhow!("material {} has unknown kind {}", id, kind))?;
            let blob: Option<Vec<u8>> = row.get("content_blob");
            let text: Option<String> = row.get("content_text");
            let content = match blob {
                Some(bytes) => MaterialContent::Bytes(bytes),
                None => MaterialContent::Text(text.unwrap_or_default()),
            };
            Ok(Material {
                id,
                course_id: row.get("course_id"),
                title: row.get("title"),
                kind,
                content,
                local_path: row.get("local_path"),
            })
        })
        .collect()
}

#[instrument(skip_all)]
pub async fn upsert_quiz(pool: &Pool, quiz: &Quiz) -> Result<()> {
    let questions = serde_json::to_string(&quiz.questions)?;
    sqlx::query(
        "INSERT INTO quizzes (id, course_id, title, questions_json) VALUES (?, ?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET course_id = excluded.course_id, title = excluded.title, \
         questions_json = excluded.questions_json",
    )
    .bind(&quiz.id)
    .bind(&quiz.course_id)
    .bind(&quiz.title)
    .bind(questions)
    .execute(pool)
    .await?;
    Ok(())
}

fn quiz_from_row(row: &SqliteRow) -> Result<Quiz> {
    let id: String = row.get("id");
    let questions_json: String = row.get("questions_json");
    let questions: Vec<Question> = serde_json::from_str(&questions_json)
        .with_context(|| format!("quiz {} has malformed questions", id))?;
    Ok(Quiz {
        id,
        course_id: row.get("course_id"),
        title: row.get("title"),
        questions,
    })
}

#[instrument(skip_all)]
pub async fn get_quiz(pool: &Pool, id: &str) -> Result<Option<Quiz>> {
    let row = sqlx::query("SELECT id, course_id, title, questions_json FROM quizzes WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(quiz_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn list_quizzes_for_course(pool: &Pool, course_id: &str) -> Result<Vec<Quiz>> {
    let rows = sqlx::query(
        "SELECT id, course_id, title, questions_json FROM quizzes WHERE course_id = ? ORDER BY id",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(quiz_from_row).collect()
}

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

/// An outbox write plus the pending total read inside the same transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Committed<T> {
    pub value: T,
    pub pending_total: i64,
}

// Writers are crate-private; `Store` publishes the pending total they return.

#[instrument(skip_all)]
pub(crate) async fn insert_quiz_attempt(
    pool: &Pool,
    attempt: &NewQuizAttempt,
) -> Result<Committed<i64>> {
    let answers = serde_json::to_string(&attempt.answers)?;
    let mut tx = pool.begin().await?;
    let rec = sqlx::query(
        "INSERT INTO quiz_attempts (client_key, quiz_id, student_id, answers_json, score, timestamp_ms, sync_status) \
         VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&attempt.quiz_id)
    .bind(&attempt.student_id)
    .bind(answers)
    .bind(attempt.score)
    .bind(attempt.timestamp.timestamp_millis())
    .bind(SyncStatus::Pending.as_str())
    .fetch_one(&mut *tx)
    .await?;
    let pending_total = count_pending_total(&mut tx).await?;
    tx.commit().await?;
    Ok(Committed {
        value: rec.get("id"),
        pending_total,
    })
}

#[instrument(skip_all)]
pub(crate) async fn insert_submission(
    pool: &Pool,
    submission: &NewSubmission,
) -> Result<Committed<i64>> {
    let (file_name, file_blob) = match &submission.attachment {
        Some(a) => (Some(a.file_name.as_str()), Some(a.bytes.as_slice())),
        None => (None, None),
    };
    let mut tx = pool.begin().await?;
    let rec = sqlx::query(
        "INSERT INTO submissions (client_key, assignment_id, student_id, text_answer, file_name, file_blob, timestamp_ms, sync_status) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&submission.assignment_id)
    .bind(&submission.student_id)
    .bind(submission.text_answer.as_deref())
    .bind(file_name)
    .bind(file_blob)
    .bind(submission.timestamp.timestamp_millis())
    .bind(SyncStatus::Pending.as_str())
    .fetch_one(&mut *tx)
    .await?;
    let pending_total = count_pending_total(&mut tx).await?;
    tx.commit().await?;
    Ok(Committed {
        value: rec.get("id"),
        pending_total,
    })
}

#[instrument(skip_all)]
pub async fn pending_quiz_attempts(pool: &Pool) -> Result<Vec<QuizAttempt>> {
    quiz_attempts_by_status(pool, SyncStatus::Pending).await
}

#[instrument(skip_all)]
pub async fn quiz_attempts_by_status(pool: &Pool, status: SyncStatus) -> Result<Vec<QuizAttempt>> {
    let rows: Vec<QuizAttemptRow> = sqlx::query_as(&format!(
        "SELECT {} FROM quiz_attempts WHERE sync_status = ? ORDER BY id",
        QUIZ_ATTEMPT_COLUMNS
    ))
    .bind(status.as_str())
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(QuizAttempt::try_from).collect()
}

#[instrument(skip_all)]
pub async fn quiz_attempts_by_ids(pool: &Pool, ids: &[i64]) -> Result<Vec<QuizAttempt>> {
    let mut out = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(ID_CHUNK) {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM quiz_attempts WHERE id IN (",
            QUIZ_ATTEMPT_COLUMNS
        ));
        push_id_list(&mut qb, chunk);
        qb.push(" ORDER BY id");
        let rows: Vec<QuizAttemptRow> = qb.build_query_as().fetch_all(pool).await?;
        for row in rows {
            out.push(QuizAttempt::try_from(row)?);
        }
    }
    Ok(out)
}

#[instrument(skip_all)]
pub async fn pending_submissions(pool: &Pool) -> Result<Vec<Submission>> {
    submissions_by_status(pool, SyncStatus::Pending).await
}

#[instrument(skip_all)]
pub async fn submissions_by_status(pool: &Pool, status: SyncStatus) -> Result<Vec<Submission>> {
    let rows: Vec<SubmissionRow> = sqlx::query_as(&format!(
        "SELECT {} FROM submissions WHERE sync_status = ? ORDER BY id",
        SUBMISSION_COLUMNS
    ))
    .bind(status.as_str())
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(Submission::try_from).collect()
}

#[instrument(skip_all)]
pub async fn submissions_by_ids(pool: &Pool, ids: &[i64]) -> Result<Vec<Submission>> {
    let mut out = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(ID_CHUNK) {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM submissions WHERE id IN (",
            SUBMISSION_COLUMNS
        ));
        push_id_list(&mut qb, chunk);
        qb.push(" ORDER BY id");
        let rows: Vec<SubmissionRow> = qb.build_query_as().fetch_all(pool).await?;
        for row in rows {
            out.push(Submission::try_from(row)?);
        }
    }
    Ok(out)
}

/// Flip exactly `ids` from `pending` to `synced` in one transaction. Rows that
/// are not pending (already synced) are left alone. Returns rows changed.
#[instrument(skip_all, fields(table = %table, ids = ids.len()))]
pub(crate) async fn mark_synced(
    pool: &Pool,
    table: OutboxTable,
    ids: &[i64],
) -> Result<Committed<u64>> {
    let mut tx = pool.begin().await?;
    let mut changed = 0;
    for chunk in ids.chunks(ID_CHUNK) {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "UPDATE {} SET sync_status = ",
            table.as_str()
        ));
        qb.push_bind(SyncStatus::Synced.as_str());
        qb.push(" WHERE sync_status = ");
        qb.push_bind(SyncStatus::Pending.as_str());
        qb.push(" AND id IN (");
        push_id_list(&mut qb, chunk);
        changed += qb.build().execute(&mut *tx).await?.rows_affected();
    }
    let pending_total = count_pending_total(&mut tx).await?;
    tx.commit()
        .await
        .with_context(|| format!("failed to commit sync status for {}", table))?;
    Ok(Committed {
        value: changed,
        pending_total,
    })
}

/// Pending rows across both outbox tables.
pub async fn total_pending(pool: &Pool) -> Result<i64> {
    let mut conn = pool.acquire().await?;
    count_pending_total(&mut conn).await
}

async fn count_pending_total(conn: &mut SqliteConnection) -> Result<i64> {
    let total: i64 = sqlx::query_scalar(
        "SELECT (SELECT COUNT(*) FROM quiz_attempts WHERE sync_status = ?) \
              + (SELECT COUNT(*) FROM submissions WHERE sync_status = ?)",
    )
    .bind(SyncStatus::Pending.as_str())
    .bind(SyncStatus::Pending.as_str())
    .fetch_one(conn)
    .await?;
    Ok(total)
}

pub async fn count_pending(pool: &Pool, table: OutboxTable) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {} WHERE sync_status = ?",
        table.as_str()
    ))
    .bind(SyncStatus::Pending.as_str())
    .fetch_one(pool)
    .await?;
    Ok(count)
}

#[instrument(skip_all)]
pub async fn count_by_status(pool: &Pool, table: OutboxTable) -> Result<StatusCounts> {
    let rows: Vec<(String, i64)> = sqlx::query_as(&format!(
        "SELECT sync_status, COUNT(*) FROM {} GROUP BY sync_status",
        table.as_str()
    ))
    .fetch_all(pool)
    .await?;
    let mut counts = StatusCounts::default();
    for (status, n) in rows {
        match SyncStatus::parse_status(&status) {
            Some(SyncStatus::Pending) => counts.pending = n,
            Some(SyncStatus::Synced) => counts.synced = n,
            Some(SyncStatus::Failed) => counts.failed = n,
            None => return Err(anyhow!("{} has unknown sync status {}", table, status)),
        }
    }
    Ok(counts)
}

/// Appends `?, ?, ...)` for the given ids.
fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    let mut list = qb.separated(", ");
    for id in ids {
        list.push_bind(*id);
    }
    list.push_unseparated(")");
}
