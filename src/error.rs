//! Error types for commentsync.
//!
//! `SyncError` is the crate-wide error. `RemoteError` is the taxonomy the
//! remote collaborators report, and `ErrorClass` is how the queue and engine
//! decide what to do with one.

use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum SyncError {
    /// SQLite or lock failure in the durable collections.
    #[error("Database error: {0}")]
    Database(String),

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A requested record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A request could not be assembled (e.g. delta builder misuse).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Persisted data could not be decoded. Recovery is a forced full sync.
    #[error("Local data corrupted: {0}")]
    LocalCorruption(String),

    /// The connectivity observer reported no network.
    #[error("Offline")]
    Offline,

    /// A remote collaborator failed.
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Errors reported by the remote read/write collaborators.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("authentication invalid or expired")]
    AuthInvalid,

    #[error("rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("server error (HTTP {status})")]
    ServerError { status: u16 },

    #[error("not modified")]
    NotModified,

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    /// 4xx other than auth and rate limiting.
    #[error("rejected by remote (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The operation was malformed before it ever left the process.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

/// How a failure should be handled by the retry machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Back off and retry, up to the attempt budget.
    Retryable,
    /// Refresh credentials once, then treat as retryable.
    AuthExpired,
    /// Dead-letter immediately.
    NonRetryable,
}

impl RemoteError {
    /// Classify this error for retry handling.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::AuthInvalid => ErrorClass::AuthExpired,
            Self::RateLimited { .. }
            | Self::ServerError { .. }
            | Self::Network(_)
            | Self::Timeout
            | Self::NotModified => ErrorClass::Retryable,
            Self::Rejected { .. } | Self::InvalidOperation(_) => ErrorClass::NonRetryable,
        }
    }

    /// Build an error from an HTTP status code.
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            401 | 403 => Self::AuthInvalid,
            429 => Self::RateLimited {
                retry_after_secs: None,
            },
            304 => Self::NotModified,
            500..=599 => Self::ServerError { status },
            _ => Self::Rejected {
                status,
                message: message.into(),
            },
        }
    }
}
