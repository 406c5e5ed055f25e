//! Configuration loader and validator for the offline sync agent.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub remote: Remote,
    pub connectivity: Connectivity,
    #[serde(default)]
    pub sync: SyncPolicy,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

/// Remote bulk-insert service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Remote {
    pub base_url: String,
    pub api_key: String,
    pub tables: RemoteTables,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Remote table names per outbox kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteTables {
    pub quiz_submissions: String,
    pub assignment_submissions: String,
}

/// Reachability probing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Connectivity {
    /// URL probed for reachability; defaults to `remote.base_url`.
    #[serde(default)]
    pub probe_url: Option<String>,
    pub poll_interval_ms: u64,
    pub probe_timeout_ms: u64,
}

/// Sync policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncPolicy {
    pub auto_sync: bool,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self { auto_sync: true }
    }
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// Default SQLite URL under the data dir.
    pub fn database_url(&self) -> String {
        format!(
            "sqlite://{}/lms.db",
            self.app.data_dir.trim_end_matches('/')
        )
    }

    pub fn probe_url(&self) -> &str {
        self.connectivity
            .probe_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(&self.remote.base_url)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.connectivity.poll_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.connectivity.probe_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.remote.request_timeout_ms)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }

    let base = cfg.remote.base_url.trim();
    if base.is_empty() {
        return Err(ConfigError::Invalid("remote.base_url must be non-empty"));
    }
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(ConfigError::Invalid("remote.base_url must be an http(s) URL"));
    }
    if cfg.remote.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("remote.api_key must be non-empty"));
    }
    if cfg.remote.tables.quiz_submissions.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "remote.tables.quiz_submissions must be non-empty",
        ));
    }
    if cfg.remote.tables.assignment_submissions.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "remote.tables.assignment_submissions must be non-empty",
        ));
    }
    if cfg.remote.request_timeout_ms == 0 {
        return Err(ConfigError::Invalid("remote.request_timeout_ms must be > 0"));
    }

    if cfg.connectivity.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid(
            "connectivity.poll_interval_ms must be > 0",
        ));
    }
    if cfg.connectivity.probe_timeout_ms == 0 {
        return Err(ConfigError::Invalid(
            "connectivity.probe_timeout_ms must be > 0",
        ));
    }

    Ok(())
}

/// Example configuration documenting every key.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

remote:
  base_url: "https://YOUR_PROJECT.supabase.co/"
  api_key: "YOUR_SERVICE_API_KEY"
  request_timeout_ms: 30000
  tables:
    quiz_submissions: "quiz_submissions"
    assignment_submissions: "assignment_submissions"

connectivity:
  probe_url: "https://YOUR_PROJECT.supabase.co/rest/v1/"
  poll_interval_ms: 5000
  probe_timeout_ms: 3000

sync:
  auto_sync: true
"#
}
