//! Directory source synchronization
//!
//! Copies a local tree onto the destination with mode bits and symlinks
//! preserved. The digest is computed over a sorted walk of relative paths
//! and file contents, so identical trees hash identically regardless of
//! filesystem enumeration order.

use std::collections::HashSet;
use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use atomos_errors::{Error, Result, SyncError};
use atomos_hash::{Digest, DigestBuilder};

use crate::scope::PathScope;

pub(crate) async fn populate(
    token: CancellationToken,
    source: &Path,
    dest: &Path,
    scope: PathScope,
) -> Result<(HashSet<PathBuf>, Digest)> {
    let source = source.to_path_buf();
    let dest = dest.to_path_buf();

    tokio::task::spawn_blocking(move || populate_blocking(&token, &source, &dest, &scope))
        .await
        .map_err(|e| Error::internal(format!("copy task failed: {e}")))?
}

fn populate_blocking(
    token: &CancellationToken,
    source: &Path,
    dest: &Path,
    scope: &PathScope,
) -> Result<(HashSet<PathBuf>, Digest)> {
    if !source.is_dir() {
        return Err(SyncError::SourceNotFound {
            path: source.display().to_string(),
        }
        .into());
    }
    fs::create_dir_all(dest).map_err(|e| Error::io_with_path(&e, dest))?;

    let mut written = HashSet::new();
    let mut builder = DigestBuilder::new();

    let mut walker = WalkDir::new(source)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter();

    while let Some(item) = walker.next() {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let entry = item.map_err(|e| SyncError::WalkFailed {
            path: source.display().to_string(),
            message: e.to_string(),
        })?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| Error::internal(format!("walk escaped source root: {e}")))?
            .to_path_buf();

        if entry.file_type().is_dir() && !scope.may_descend(&rel) {
            walker.skip_current_dir();
            continue;
        }
        if !scope.in_scope(&rel) {
            continue;
        }

        let target = dest.join(&rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(|e| Error::io_with_path(&e, &target))?;
            let perms = entry
                .metadata()
                .map_err(|e| SyncError::WalkFailed {
                    path: rel.display().to_string(),
                    message: e.to_string(),
                })?
                .permissions();
            fs::set_permissions(&target, perms).map_err(|e| Error::io_with_path(&e, &target))?;
            builder.update_path(&rel).update(b"d");
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())
                .map_err(|e| Error::io_with_path(&e, entry.path()))?;
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| Error::io_with_path(&e, parent))?;
            }
            remove_existing(&target)?;
            symlink(&link, &target).map_err(|e| Error::io_with_path(&e, &target))?;
            builder
                .update_path(&rel)
                .update(b"l")
                .update_path(&link);
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| Error::io_with_path(&e, parent))?;
            }
            remove_existing(&target)?;
            // fs::copy carries permission bits along with the content.
            fs::copy(entry.path(), &target).map_err(|e| Error::io_with_path(&e, &target))?;
            let content = fs::File::open(entry.path())
                .map_err(|e| Error::io_with_path(&e, entry.path()))?;
            let file_digest = Digest::hash_reader(content)?;
            builder
                .update_path(&rel)
                .update(b"f")
                .update(file_digest.as_bytes());
        }

        record_parents(&mut written, &rel);
        written.insert(rel);
    }

    Ok((written, builder.finish()))
}

fn remove_existing(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => {
            fs::remove_dir_all(path).map_err(|e| Error::io_with_path(&e, path))?;
        }
        Ok(_) => {
            fs::remove_file(path).map_err(|e| Error::io_with_path(&e, path))?;
        }
        Err(_) => {}
    }
    Ok(())
}

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
