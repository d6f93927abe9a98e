#![warn(clippy::pedantic)]
#![deny(clippy::all)]

//! Streaming tar.gz extraction with POSIX fidelity
//!
//! This crate materializes gzip-compressed tar streams into a destination
//! directory, preserving permission bits, symlink targets and hardlink
//! identity. Entries can be filtered through caller-supplied predicates and
//! the whole operation is cancellable between entries.
//!
//! Extraction is best-effort: a failure leaves whatever was already written
//! in place. Callers that need atomicity compose this with the transaction
//! layer.

mod entry;
mod extract;

pub use entry::{EntryFilter, EntryInfo, EntryKind};
pub use extract::{extract_tarball, ExtractReport};
