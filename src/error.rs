use std::path::PathBuf;

use http::StatusCode;
use thiserror::Error;

/// Failures of a single upstream token exchange or of the retry loop
/// wrapping it.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// Connection or timeout failure before a response arrived.
    #[error("error making request: {0}")]
    Network(#[source] reqwest::Error),
    /// Upstream answered with a non-success status.
    #[error("received non-200 status code: {status}")]
    Upstream { status: StatusCode },
    /// Upstream answered 2xx but the body did not parse.
    #[error("error parsing response: {0}")]
    Decode(#[source] serde_json::Error),
    /// Shutdown aborted the refresh before it could finish.
    #[error("refresh cancelled")]
    Cancelled,
    /// The retry loop ran out of attempts; wraps the last underlying error.
    #[error("max retries exceeded after {attempts} attempts: {source}")]
    MaxRetriesExceeded {
        attempts: u32,
        #[source]
        source: Box<RefreshError>,
    },
}

impl RefreshError {
    /// Failure-reason label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            RefreshError::Network(_) => "network",
            RefreshError::Upstream { .. } => "upstream",
            RefreshError::Decode(_) => "decode",
            RefreshError::Cancelled => "cancelled",
            RefreshError::MaxRetriesExceeded { .. } => "max_retries",
        }
    }
}

/// Startup configuration failures. Fatal before the service starts serving;
/// never surfaced at runtime.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("error reading config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("error parsing config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid port number: {0}")]
    InvalidPort(String),
    #[error("invalid token format for account {0}")]
    InvalidToken(String),
}

/// Failures while writing the token state file. Logged and non-fatal; the
/// in-memory state stays authoritative.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("error marshaling state: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("error writing state to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors surfaced by token-manager operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("account {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Refresh(#[from] RefreshError),
}
