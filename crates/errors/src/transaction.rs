//! Transaction lifecycle error types
//!
//! One variant per lifecycle phase. The phase is part of the contract: the
//! orchestrator decides whether to roll back based on which phase failed.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum TransactionError {
    #[error("transaction initialization failed: {message}")]
    Initialization { message: String },

    #[error("failed to start transaction {id}: {message}")]
    Start { id: u64, message: String },

    #[error("failed to update transaction {id}: {message}")]
    Update { id: u64, message: String },

    #[error("hook environment setup failed for transaction {id}: {message}")]
    Hook { id: u64, message: String },

    #[error("configuration hook failed: {message}")]
    HookScript { message: String },

    #[error("failed to commit transaction {id}: {message}")]
    Commit { id: u64, message: String },

    #[error("rollback of transaction {id} failed: {message}")]
    Rollback { id: u64, message: String },

    #[error("invalid state transition for transaction {id}: {from} -> {to}")]
    InvalidState {
        id: u64,
        from: String,
        to: String,
    },
}
