//! Content synchronization error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("source not found: {path}")]
    SourceNotFound { path: String },

    #[error("failed to delete stale path {path}: {message}")]
    PruneFailed { path: String, message: String },

    #[error("failed to walk destination tree at {path}: {message}")]
    WalkFailed { path: String, message: String },

    #[error("digest computation failed for {path}: {message}")]
    DigestFailed { path: String, message: String },
}
