#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core type definitions for the atomos deployment engine
//!
//! This crate provides the deployment descriptor model consumed by the
//! install orchestrator and the transaction lifecycle state shared across
//! crates.

pub mod deployment;
pub mod state;

// Re-export commonly used types
pub use deployment::{Deployment, Disk, OsSource, Partition, PartitionRole, SourceKind};
pub use state::TransactionState;
