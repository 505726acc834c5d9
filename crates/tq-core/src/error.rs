//! Error taxonomy shared by every tq crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Category of a [`TrafficError`], serializable so that failures can be
/// carried as data in reports and search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    FileNotFound,
    Parse,
    InvalidFilter,
    StoreUnavailable,
    OffsetLimitExceeded,
    PartialChunkFailure,
    Query,
    Config,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::FileNotFound => "file_not_found",
            ErrorKind::Parse => "parse",
            ErrorKind::InvalidFilter => "invalid_filter",
            ErrorKind::StoreUnavailable => "store_unavailable",
            ErrorKind::OffsetLimitExceeded => "offset_limit_exceeded",
            ErrorKind::PartialChunkFailure => "partial_chunk_failure",
            ErrorKind::Query => "query",
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum TrafficError {
    /// The import source does not exist. Raised before any chunk runs.
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// A single input row could not be turned into an observation.
    #[error("parse error at row {row}: {message}")]
    Parse { row: u64, message: String },

    /// A search filter was rejected before reaching the store.
    #[error("invalid filter '{filter}': {reason}")]
    InvalidFilter { filter: &'static str, reason: String },

    /// Connection-level failure. Retryable by the caller.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store refused the requested result window.
    #[error("offset/limit outside the store's result window: {0}")]
    OffsetLimitExceeded(String),

    /// One chunk failed to commit. Earlier chunks stay committed.
    #[error("chunk {chunk} failed: {message}")]
    PartialChunkFailure { chunk: usize, message: String },

    /// Any other store-side query or command rejection.
    #[error("query failed: {0}")]
    Query(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrafficError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TrafficError::FileNotFound { .. } => ErrorKind::FileNotFound,
            TrafficError::Parse { .. } => ErrorKind::Parse,
            TrafficError::InvalidFilter { .. } => ErrorKind::InvalidFilter,
            TrafficError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            TrafficError::OffsetLimitExceeded(_) => ErrorKind::OffsetLimitExceeded,
            TrafficError::PartialChunkFailure { .. } => ErrorKind::PartialChunkFailure,
            TrafficError::Query(_) => ErrorKind::Query,
            TrafficError::Config(_) => ErrorKind::Config,
            TrafficError::Io(_) => ErrorKind::Io,
        }
    }

    pub fn parse(row: u64, message: impl Into<String>) -> Self {
        Self::Parse {
            row,
            message: message.into(),
        }
    }

    pub fn invalid_filter(filter: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidFilter {
            filter,
            reason: reason.into(),
        }
    }

    pub fn config<E: fmt::Display>(e: E) -> Self {
        Self::Config(e.to_string())
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TrafficError::StoreUnavailable(_) | TrafficError::OffsetLimitExceeded(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TrafficError>;

/// A [`TrafficError`] flattened into data, for results and reports that
/// must carry a failure without propagating it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&TrafficError> for ErrorReport {
    fn from(err: &TrafficError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
