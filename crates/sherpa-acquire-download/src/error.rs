//! Error taxonomy for acquisition (download, extraction, verification).
//!
//! Errors that cross a `tokio::spawn` / `spawn_blocking` boundary avoid
//! embedding `std::io::Error` directly (it isn't `Clone` and its `Display`
//! output varies by platform), capturing `{kind, message}` instead so the
//! error can be cloned into feedback events and logged consistently.

use thiserror::Error;

/// Cloneable stand-in for an I/O error, carrying just what callers need:
/// the error kind (for `is_recoverable`) and a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoFailure {
    pub kind: std::io::ErrorKind,
    pub message: String,
}

impl From<std::io::Error> for IoFailure {
    fn from(err: std::io::Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for IoFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Errors raised while acquiring, extracting, or verifying a model.
#[derive(Debug, Error, Clone)]
pub enum AcquireError {
    #[error("network request failed: {0}")]
    Network(String),

    #[error("server returned unexpected status {status} for {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("server does not support resuming a partial download")]
    ResumeNotSupported,

    #[error("local file state conflicts with remote: {0}")]
    ResumeConflict(String),

    #[error("filesystem error: {0}")]
    Io(#[from] IoFailure),

    #[error("archive extraction failed: {0}")]
    Extract(String),

    #[error("archive entry {path} would escape its destination directory")]
    UnsafeArchiveEntry { path: String },

    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("model is missing expected file {path}")]
    MissingFile { path: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("model {model} is already locked by another operation")]
    AlreadyLocked { model: String },

    #[error("model {model} not found in registry")]
    UnknownModel { model: String },

    #[error("retry budget exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("download finished short: expected {expected} bytes, got {actual}")]
    IncompleteDownload { expected: u64, actual: u64 },

    /// Another verify/repair/acquire call is already running for this model;
    /// raised by the [`ModelOperationLock`](crate::health::ModelOperationLock)
    /// rather than letting two operations race on the same directory.
    #[error("an operation is already in progress for model {model}")]
    OperationInProgress { model: String },

    /// A health check was requested for a model the registry doesn't know
    /// about, so there is nothing to compare the files against.
    #[error("cannot verify model {model}: not present in registry")]
    VerificationUnavailable { model: String },

    /// The disk-space probe failed before the acquisition loop even began.
    #[error("insufficient disk space at {path}")]
    InsufficientSpace { path: String },

    #[error("{0}")]
    Other(String),
}

impl AcquireError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Whether retrying the same operation is likely to help. Distinguishes
    /// transient failures (network blips, server 5xx) from durable ones
    /// (bad checksum baked into the registry, path traversal attempt).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(_)
                | Self::UnexpectedStatus { .. }
                | Self::ResumeNotSupported
                | Self::Io(_)
        )
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// A message suitable for surfacing to an end user, stripped of
    /// internal detail like raw URLs or byte offsets.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) | Self::UnexpectedStatus { .. } => {
                "Could not reach the download server. Check your connection and try again.".into()
            }
            Self::ChecksumMismatch { .. } => {
                "The downloaded file appears to be corrupted. Try downloading again.".into()
            }
            Self::Cancelled => "Download cancelled.".into(),
            Self::AlreadyLocked { model } | Self::OperationInProgress { model } => {
                format!("{model} is already being downloaded or verified.")
            }
            other => other.to_string(),
        }
    }
}

pub type AcquireResult<T> = Result<T, AcquireError>;
