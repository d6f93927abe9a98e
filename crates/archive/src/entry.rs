//! Tar entry metadata and filter predicates

use std::path::{Path, PathBuf};

use atomos_errors::Result;

/// Entry type as seen by filters and the extraction dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Regular,
    Directory,
    Symlink,
    Hardlink,
    /// Anything else (char/block devices, fifos, ...); extraction rejects
    /// these, but filters still get to see them first.
    Other(u8),
}

/// Metadata of a single tar entry, read from the stream one at a time.
///
/// The path is already normalized relative to the extraction root when a
/// filter sees it.
#[derive(Debug, Clone)]
pub struct EntryInfo {
    pub path: PathBuf,
    pub kind: EntryKind,
    pub mode: u32,
    pub link_target: Option<PathBuf>,
    pub size: u64,
    pub uid: u64,
    pub gid: u64,
    pub mtime: i64,
}

impl EntryInfo {
    /// Normalized path relative to the extraction root
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A filter predicate over tar entries.
///
/// Filters compose with logical AND in the order given. Returning
/// `Ok(false)` skips the entry entirely (no file, directory or link is
/// created); returning `Err` aborts the whole extraction with that error as
/// the cause.
pub trait EntryFilter: Send {
    /// Decide whether this entry should be materialized
    ///
    /// # Errors
    /// Any error aborts the extraction and propagates verbatim.
    fn keep(&self, entry: &EntryInfo) -> Result<bool>;
}

impl<F> EntryFilter for F
where
    F: Fn(&EntryInfo) -> Result<bool> + Send,
{
    fn keep(&self, entry: &EntryInfo) -> Result<bool> {
        self(entry)
    }
}
