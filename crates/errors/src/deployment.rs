//! Deployment descriptor error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum DeploymentError {
    #[error("invalid deployment descriptor: {message}")]
    Invalid { message: String },

    #[error("deployment descriptor not found: {path}")]
    NotFound { path: String },

    #[error("failed to parse deployment descriptor {path}: {message}")]
    Parse { path: String, message: String },

    #[error("deployment declares no disks")]
    NoDisks,

    #[error("deployment declares no source OS content")]
    NoSource,

    #[error("another install is already running against target {device}")]
    TargetBusy { device: String },
}
