//! Tar stream extraction

use std::collections::HashSet;
use std::fs;
use std::io::{BufReader, Read};
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Component, Path, PathBuf};

use filetime::FileTime;
use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use atomos_errors::{ArchiveError, Error, Result};

use crate::entry::{EntryFilter, EntryInfo, EntryKind};

/// Outcome of a successful extraction
#[derive(Debug, Default)]
pub struct ExtractReport {
    /// Every destination-relative path this extraction materialized,
    /// including parent directories created implicitly. This is the
    /// written-set the mirror reconciliation pass keys on.
    pub written: HashSet<PathBuf>,
}

/// Directory whose final metadata is applied after the stream ends
struct DeferredDir {
    abs: PathBuf,
    depth: usize,
    mode: u32,
    uid: u64,
    gid: u64,
    mtime: i64,
}

/// Extract a gzip-compressed tarball into `dest`.
///
/// The destination directory is created if absent. Entries are processed in
/// stream order; before each one the cancellation token is checked and every
/// filter is evaluated. Directory permission bits are recorded and applied
/// deepest-first once the stream ends, so a read-only directory cannot block
/// creation of the entries it contains.
///
/// # Errors
/// - [`ArchiveError::Format`] when the source is not a gzip tar stream
/// - [`ArchiveError::PathTraversal`] when an entry resolves outside `dest`
/// - [`ArchiveError::MissingHardlinkTarget`] when a hardlink references a
///   path this extraction has not materialized
/// - [`ArchiveError::UnsupportedEntryType`] for entry types other than
///   regular files, directories, symlinks and hardlinks
/// - [`ArchiveError::EntryRead`] when an entry's header fields cannot be
///   parsed
/// - [`Error::Cancelled`] when the token is cancelled between entries
/// - any error returned by a filter, verbatim
pub async fn extract_tarball(
    token: CancellationToken,
    source: &Path,
    dest: &Path,
    filters: Vec<Box<dyn EntryFilter>>,
) -> Result<ExtractReport> {
    let source = source.to_path_buf();
    let dest = dest.to_path_buf();

    tokio::task::spawn_blocking(move || extract_blocking(&token, &source, &dest, &filters))
        .await
        .map_err(|e| Error::internal(format!("extract task failed: {e}")))?
}

fn extract_blocking(
    token: &CancellationToken,
    source: &Path,
    dest: &Path,
    filters: &[Box<dyn EntryFilter>],
) -> Result<ExtractReport> {
    let file = fs::File::open(source).map_err(|e| Error::io_with_path(&e, source))?;
    let decoder = GzDecoder::new(BufReader::new(file));
    let mut archive = Archive::new(decoder);

    fs::create_dir_all(dest).map_err(|e| Error::io_with_path(&e, dest))?;

    let mut report = ExtractReport::default();
    let mut deferred: Vec<DeferredDir> = Vec::new();

    let entries = archive.entries().map_err(|e| ArchiveError::Format {
        path: source.display().to_string(),
        message: e.to_string(),
    })?;

    for entry in entries {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        // A read failure here covers both a broken gzip layer (wrong or
        // corrupt compression) and malformed tar headers.
        let mut entry = entry.map_err(|e| ArchiveError::Format {
            path: source.display().to_string(),
            message: e.to_string(),
        })?;

        let header = entry.header();
        let raw_path = entry.path().map_err(|e| ArchiveError::EntryRead {
            message: e.to_string(),
        })?;

        let Some(rel) = normalize_path(&raw_path)? else {
            // The archive's own root entry ("./"); dest already exists.
            continue;
        };

        let field_err = |field: &str, e: &std::io::Error| ArchiveError::EntryRead {
            message: format!("bad {field} in header for {}: {e}", rel.display()),
        };
        let info = EntryInfo {
            path: rel.clone(),
            kind: entry_kind(header.entry_type()),
            mode: header.mode().map_err(|e| field_err("mode", &e))?,
            link_target: entry
                .link_name()
                .map_err(|e| field_err("link name", &e))?
                .map(|l| l.into_owned()),
            size: entry.size(),
            uid: header.uid().map_err(|e| field_err("uid", &e))?,
            gid: header.gid().map_err(|e| field_err("gid", &e))?,
            // Timestamps past i64 seconds saturate; that is a range limit,
            // not a parse failure.
            mtime: header
                .mtime()
                .map_err(|e| field_err("mtime", &e))?
                .try_into()
                .unwrap_or(i64::MAX),
        };

        if !keep_entry(filters, &info)? {
            debug!(path = %rel.display(), "entry filtered out");
            continue;
        }

        let abs = dest.join(&rel);
        record_parents(&mut report.written, &rel);

        match info.kind {
            EntryKind::Directory => {
                fs::create_dir_all(&abs).map_err(|e| Error::io_with_path(&e, &abs))?;
                deferred.push(DeferredDir {
                    abs,
                    depth: rel.components().count(),
                    mode: info.mode,
                    uid: info.uid,
                    gid: info.gid,
                    mtime: info.mtime,
                });
            }
            EntryKind::Regular => {
                write_file(&mut entry, &abs, &info)?;
            }
            EntryKind::Symlink => {
                let target = info.link_target.clone().ok_or_else(|| {
                    ArchiveError::EntryRead {
                        message: format!("symlink {} without target", rel.display()),
                    }
                })?;
                remove_existing(&abs)?;
                symlink(&target, &abs).map_err(|e| Error::io_with_path(&e, &abs))?;
            }
            EntryKind::Hardlink => {
                let raw_target = info.link_target.clone().ok_or_else(|| {
                    ArchiveError::EntryRead {
                        message: format!("hardlink {} without target", rel.display()),
                    }
                })?;
                let Some(rel_target) = normalize_path(&raw_target)? else {
                    return Err(ArchiveError::MissingHardlinkTarget {
                        path: rel.display().to_string(),
                        target: raw_target.display().to_string(),
                    }
                    .into());
                };
                // Tar emits hardlinks after the content they reference; a
                // dangling one means the stream is inconsistent (or the
                // target was filtered away).
                if !report.written.contains(&rel_target) {
                    return Err(ArchiveError::MissingHardlinkTarget {
                        path: rel.display().to_string(),
                        target: rel_target.display().to_string(),
                    }
                    .into());
                }
                remove_existing(&abs)?;
                fs::hard_link(dest.join(&rel_target), &abs)
                    .map_err(|e| Error::io_with_path(&e, &abs))?;
            }
            EntryKind::Other(type_flag) => {
                return Err(ArchiveError::UnsupportedEntryType {
                    path: rel.display().to_string(),
                    type_flag,
                }
                .into());
            }
        }

        report.written.insert(rel);
    }

    apply_deferred_modes(deferred)?;

    Ok(report)
}

/// Evaluate filters in order, AND-composed, short-circuiting on error
fn keep_entry(filters: &[Box<dyn EntryFilter>], info: &EntryInfo) -> Result<bool> {
    for filter in filters {
        if !filter.keep(info)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Normalize an entry path relative to the extraction root.
///
/// Leading `/` and `.` components are stripped; `..` components resolve
/// within the already-seen prefix and fail once they would escape it.
/// Returns `None` for a path that normalizes to the root itself.
fn normalize_path(raw: &Path) -> Result<Option<PathBuf>> {
    let mut out = PathBuf::new();
    for comp in raw.components() {
        match comp {
            Component::Normal(c) => out.push(c),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                if !out.pop() {
                    return Err(ArchiveError::PathTraversal {
                        path: raw.display().to_string(),
                    }
                    .into());
                }
            }
        }
    }
    if out.as_os_str().is_empty() {
        Ok(None)
    } else {
        Ok(Some(out))
    }
}

/// Record ancestors of `rel` as written so the mirror pass keeps implicitly
/// created parent directories.
fn record_parents(written: &mut HashSet<PathBuf>, rel: &Path) {
    let mut parent = rel.parent();
    while let Some(p) = parent {
        if p.as_os_str().is_empty() {
            break;
        }
        written.insert(p.to_path_buf());
        parent = p.parent();
    }
}

/// Remove a pre-existing node so the entry can overwrite it
fn remove_existing(abs: &Path) -> Result<()> {
    match fs::symlink_metadata(abs) {
        Ok(meta) if meta.is_dir() => {
            fs::remove_dir_all(abs).map_err(|e| Error::io_with_path(&e, abs))?;
        }
        Ok(_) => {
            fs::remove_file(abs).map_err(|e| Error::io_with_path(&e, abs))?;
        }
        Err(_) => {}
    }
    Ok(())
}

/// Write a regular file entry: content first, then mode, ownership and mtime
fn write_file<R: Read>(content: &mut R, abs: &Path, info: &EntryInfo) -> Result<()> {
    if let Some(parent) = abs.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io_with_path(&e, parent))?;
    }
    remove_existing(abs)?;

    let mut file = fs::File::create(abs).map_err(|e| Error::io_with_path(&e, abs))?;
    std::io::copy(content, &mut file).map_err(|e| Error::io_with_path(&e, abs))?;
    drop(file);

    fs::set_permissions(abs, fs::Permissions::from_mode(info.mode))
        .map_err(|e| Error::io_with_path(&e, abs))?;
    apply_ownership(abs, info.uid, info.gid)?;
    filetime::set_file_mtime(abs, FileTime::from_unix_time(info.mtime, 0))
        .map_err(|e| Error::io_with_path(&e, abs))?;
    Ok(())
}

/// Apply final directory metadata deepest-first, after the stream has ended
/// and no further entry can target these directories.
fn apply_deferred_modes(mut deferred: Vec<DeferredDir>) -> Result<()> {
    deferred.sort_by(|a, b| b.depth.cmp(&a.depth));
    for dir in deferred {
        apply_ownership(&dir.abs, dir.uid, dir.gid)?;
        filetime::set_file_mtime(&dir.abs, FileTime::from_unix_time(dir.mtime, 0))
            .map_err(|e| Error::io_with_path(&e, &dir.abs))?;
        fs::set_permissions(&dir.abs, fs::Permissions::from_mode(dir.mode))
            .map_err(|e| Error::io_with_path(&e, &dir.abs))?;
    }
    Ok(())
}

/// Restore uid/gid from the tar header. Only attempted when running as root,
/// matching stock tar behavior for unprivileged runs.
fn apply_ownership(abs: &Path, uid: u64, gid: u64) -> Result<()> {
    if !running_as_root() {
        return Ok(());
    }
    let uid = u32::try_from(uid).map_err(|_| ArchiveError::EntryRead {
        message: format!("uid out of range for {}", abs.display()),
    })?;
    let gid = u32::try_from(gid).map_err(|_| ArchiveError::EntryRead {
        message: format!("gid out of range for {}", abs.display()),
    })?;
    std::os::unix::fs::chown(abs, Some(uid), Some(gid))
        .map_err(|e| Error::io_with_path(&e, abs))?;
    Ok(())
}

fn running_as_root() -> bool {
    // SAFETY: geteuid has no failure modes and touches no memory.
    unsafe { libc::geteuid() == 0 }
}

fn entry_kind(entry_type: EntryType) -> EntryKind {
    match entry_type {
        EntryType::Regular | EntryType::Continuous | EntryType::GNUSparse => EntryKind::Regular,
        EntryType::Directory => EntryKind::Directory,
        EntryType::Symlink => EntryKind::Symlink,
        EntryType::Link => EntryKind::Hardlink,
        other => EntryKind::Other(other.as_byte()),
    }
}
