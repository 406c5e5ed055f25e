use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::remote::model::{AssignmentSubmissionRow, ErrorBody, QuizSubmissionRow};

pub mod model;

/// Column the backend deduplicates uploads on.
pub const IDEMPOTENCY_COLUMN: &str = "client_key";

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("remote rejected batch ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("invalid remote request: {0}")]
    Request(String),
}

/// Bulk-insert collaborator. One call per outbox kind per sync run.
#[async_trait]
pub trait RemoteService: Send + Sync {
    async fn insert_quiz_submissions(&self, rows: &[QuizSubmissionRow]) -> Result<(), RemoteError>;

    async fn insert_assignment_submissions(
        &self,
        rows: &[AssignmentSubmissionRow],
    ) -> Result<(), RemoteError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTables {
    pub quiz_submissions: String,
    pub assignment_submissions: String,
}

/// PostgREST-style REST client (`POST {base}/rest/v1/{table}`).
#[derive(Clone)]
pub struct RestClient {
    http: Client,
    base_url: Url,
    api_key: String,
    tables: RemoteTables,
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .field("tables", &self.tables)
            .finish_non_exhaustive()
    }
}

impl RestClient {
    pub fn new(
        mut base_url: Url,
        api_key: String,
        tables: RemoteTables,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("lms-sync/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        // `Url::join` replaces the last segment unless the path ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http,
            base_url,
            api_key,
            tables,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let base_url = Url::parse(&cfg.remote.base_url)
            .with_context(|| format!("invalid remote.base_url {}", cfg.remote.base_url))?;
        Self::new(
            base_url,
            cfg.remote.api_key.clone(),
            RemoteTables {
                quiz_submissions: cfg.remote.tables.quiz_submissions.clone(),
                assignment_submissions: cfg.remote.tables.assignment_submissions.clone(),
            },
            cfg.request_timeout(),
        )
    }

    /// Build the bulk insert for `table`. Rows whose `client_key` already
    /// exists remotely are ignored, so a retried batch never duplicates.
    pub fn build_insert_request<T: Serialize>(
        &self,
        table: &str,
        rows: &[T],
    ) -> Result<reqwest::Request, RemoteError> {
        let mut endpoint = self
            .base_url
            .join(&format!("rest/v1/{}", table))
            .map_err(|e| RemoteError::Request(format!("invalid table endpoint: {}", e)))?;
        endpoint
            .query_pairs_mut()
            .append_pair("on_conflict", IDEMPOTENCY_COLUMN);
        self.http
            .post(endpoint)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Prefer", "resolution=ignore-duplicates,return=minimal")
            .json(rows)
            .build()
            .map_err(RemoteError::from)
    }

    async fn execute_insert<T: Serialize + Sync>(
        &self,
        table: &str,
        rows: &[T],
    ) -> Result<(), RemoteError> {
        let request = self.build_insert_request(table, rows)?;
        info!(url = %request.url(), rows = rows.len(), "uploading batch");

        let res = self.http.execute(request).await?;
        let status = res.status();
        if status.is_success() {
            debug!(%status, table, "batch accepted");
            return Ok(());
        }

        let body = res.text().await.unwrap_or_default();
        warn!(%status, table, body = %body, "remote rejected batch");
        Err(RemoteError::Rejected {
            status: status.as_u16(),
            message: rejection_message(&body),
        })
    }
}

/// Prefer the backend's `message` (plus details/hint) over the raw body.
fn rejection_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            message: Some(message),
            details,
            hint,
            code,
        }) => {
            let mut out = message;
            if let Some(code) = code {
                out = format!("{} [{}]", out, code);
            }
            if let Some(details) = details.filter(|d| !d.is_empty()) {
                out.push_str(": ");
                out.push_str(&details);
            }
            if let Some(hint) = hint.filter(|h| !h.is_empty()) {
                out.push_str(" (hint: ");
                out.push_str(&hint);
                out.push(')');
            }
            out
        }
        _ if body.trim().is_empty() => "empty response body".to_string(),
        _ => body.trim().to_string(),
    }
}

#[async_trait]
impl RemoteService for RestClient {
    async fn insert_quiz_submissions(&self, rows: &[QuizSubmissionRow]) -> Result<(), RemoteError> {
        self.execute_insert(&self.tables.quiz_submissions, rows).await
    }

    async fn insert_assignment_submissions(
        &self,
        rows: &[AssignmentSubmissionRow],
    ) -> Result<(), RemoteError> {
        self.execute_insert(&self.tables.assignment_submissions, rows)
            .await
    }
}
