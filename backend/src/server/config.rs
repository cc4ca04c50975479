//! Service configuration loaded via OrthoConfig.

use std::time::Duration;

use ortho_config::OrthoConfig;
use reqwest::Url;
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::domain::sync::SyncConfig;
use crate::domain::sync::fetcher::RetryPolicy;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 4;
const DEFAULT_RETRY_INITIAL_BACKOFF_MS: u64 = 500;
const DEFAULT_RETRY_MAX_BACKOFF_MS: u64 = 30_000;
const DEFAULT_BATCH_SIZE: usize = 500;
const DEFAULT_RUN_DEADLINE_SECS: u64 = 25 * 60;

/// Configuration values for the mirror service.
///
/// Each field maps to an `OPSMIRROR_*` environment variable; the upstream
/// URL, token, and database URL are mandatory at startup and checked by
/// their accessors, everything else carries a default.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "OPSMIRROR")]
pub struct MirrorSettings {
    /// Base URL of the upstream JSON:API.
    pub upstream_base_url: Option<String>,
    /// Bearer token for upstream authentication.
    pub upstream_token: Option<String>,
    /// Connection URL of the mirror database.
    pub database_url: Option<String>,
    /// Socket address the HTTP server binds to.
    #[ortho_config(default = DEFAULT_BIND_ADDR.to_owned())]
    pub bind_addr: String,
    /// Per-request timeout against the upstream, in seconds.
    #[ortho_config(default = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout_secs: u64,
    /// Fetch attempts per page before giving up.
    #[ortho_config(default = DEFAULT_RETRY_MAX_ATTEMPTS)]
    pub retry_max_attempts: u32,
    /// Backoff after the first failed attempt, in milliseconds.
    #[ortho_config(default = DEFAULT_RETRY_INITIAL_BACKOFF_MS)]
    pub retry_initial_backoff_ms: u64,
    /// Upper bound on any single retry wait, in milliseconds.
    #[ortho_config(default = DEFAULT_RETRY_MAX_BACKOFF_MS)]
    pub retry_max_backoff_ms: u64,
    /// Rows per upsert batch.
    #[ortho_config(default = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,
    /// Soft wall-clock budget for one run, in seconds.
    #[ortho_config(default = DEFAULT_RUN_DEADLINE_SECS)]
    pub run_deadline_secs: u64,
}

/// Validation errors raised when settings are read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    /// A mandatory variable is unset.
    #[error("OPSMIRROR_{0} must be set")]
    Missing(&'static str),
    /// The upstream base URL does not parse.
    #[error("invalid upstream base URL: {0}")]
    InvalidUrl(String),
}

impl MirrorSettings {
    /// Parsed upstream base URL.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] when unset or unparsable.
    pub fn upstream_base_url(&self) -> Result<Url, SettingsError> {
        let raw = self
            .upstream_base_url
            .as_deref()
            .ok_or(SettingsError::Missing("UPSTREAM_BASE_URL"))?;
        Url::parse(raw).map_err(|error| SettingsError::InvalidUrl(error.to_string()))
    }

    /// Upstream bearer token, zeroised on drop.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] when unset.
    pub fn upstream_token(&self) -> Result<Zeroizing<String>, SettingsError> {
        self.upstream_token
            .clone()
            .map(Zeroizing::new)
            .ok_or(SettingsError::Missing("UPSTREAM_TOKEN"))
    }

    /// Mirror database connection URL.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] when unset.
    pub fn database_url(&self) -> Result<&str, SettingsError> {
        self.database_url
            .as_deref()
            .ok_or(SettingsError::Missing("DATABASE_URL"))
    }

    /// Bind address for the HTTP server.
    pub fn bind_addr(&self) -> &str {
        self.bind_addr.as_str()
    }

    /// Per-request timeout for the upstream client.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Orchestrator tuning assembled from the retry and batching fields.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            retry: RetryPolicy {
                max_attempts: self.retry_max_attempts.max(1),
                initial_backoff: Duration::from_millis(self.retry_initial_backoff_ms),
                max_backoff: Duration::from_millis(self.retry_max_backoff_ms),
            },
            batch_size: self.batch_size.max(1),
            run_deadline: Duration::from_secs(self.run_deadline_secs),
        }
    }
}
