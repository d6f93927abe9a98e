#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Error types for the atomos deployment engine
//!
//! This crate provides fine-grained error types organized by domain:
//! archive extraction, content synchronization, transaction lifecycle and
//! deployment descriptor handling.

use thiserror::Error;

pub mod archive;
pub mod deployment;
pub mod sync;
pub mod transaction;

// Re-export all error types at the root
pub use archive::ArchiveError;
pub use deployment::DeploymentError;
pub use sync::SyncError;
pub use transaction::TransactionError;

/// Generic error type for cross-crate boundaries
#[derive(Debug, Error)]
pub enum Error {
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("deployment error: {0}")]
    Deployment(#[from] DeploymentError),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {message}")]
    Io {
        kind: std::io::ErrorKind,
        message: String,
        path: Option<std::path::PathBuf>,
    },

    /// Opaque error raised by a caller-supplied entry filter. The original
    /// message is surfaced verbatim as the abort cause.
    #[error("{0}")]
    Filter(String),
}

impl Error {
    /// Create an internal error with a message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a filter abort error carrying the filter's message verbatim
    pub fn filter(msg: impl Into<String>) -> Self {
        Self::Filter(msg.into())
    }

    /// Create an Io error with an associated path
    pub fn io_with_path(err: &std::io::Error, path: impl Into<std::path::PathBuf>) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
            path: Some(path.into()),
        }
    }

    /// True when this error is a cancellation report
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
            path: None,
        }
    }
}

/// Result type alias for atomos operations
pub type Result<T> = std::result::Result<T, Error>;
