#![warn(clippy::pedantic)]
#![deny(clippy::all)]

//! Install orchestration for atomos
//!
//! Sequences the transaction phases `init -> start -> update -> run_hook ->
//! commit` for a deployment, short-circuiting on the first failure and
//! applying the asymmetric rollback policy: update, hook and commit
//! failures roll the transaction back; init and start failures do not.

mod installer;

pub use installer::{InstallOutcome, Installer};
