#![warn(clippy::pedantic)]
#![deny(clippy::all)]

//! Transaction lifecycle for atomic OS deployments
//!
//! A transaction owns a private snapshot of the target filesystem through
//! the ordered lifecycle `Created -> Started -> Updated -> {Committed |
//! RolledBack}`. Content population delegates to the synchronizer; commit
//! atomically repoints the active target; rollback discards the snapshot
//! without disturbing the running system.
//!
//! The [`Transactioner`] trait is the polymorphic seam: [`SnapshotManager`]
//! is the disk-backed production implementation, [`mock::MockTransactioner`]
//! the in-memory test double.

mod hook;
pub mod mock;
mod snapshot;
mod transactioner;

pub use hook::{ChrootHookRunner, HookRunner};
pub use snapshot::SnapshotManager;
pub use transactioner::{Transaction, Transactioner};
