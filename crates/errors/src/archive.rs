//! Archive extraction error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ArchiveError {
    #[error("invalid archive format for {path}: {message}")]
    Format { path: String, message: String },

    #[error("entry path escapes extraction root: {path}")]
    PathTraversal { path: String },

    #[error("hardlink target not present in extracted content: {path} -> {target}")]
    MissingHardlinkTarget { path: String, target: String },

    #[error("unsupported tar entry type {type_flag:#04x} for {path}")]
    UnsupportedEntryType { path: String, type_flag: u8 },

    #[error("failed to read archive entry: {message}")]
    EntryRead { message: String },
}
