//! Stale path deletion for mirror reconciliation
//!
//! Walks the destination contents-first (children before parents) so stale
//! directories empty out before their own removal, restricted to the mirror
//! scope. Out-of-scope subtrees are never descended into.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use atomos_errors::{Result, SyncError};

use crate::scope::PathScope;

pub(crate) fn prune_unlisted(
    dest: &Path,
    written: &HashSet<PathBuf>,
    scope: &PathScope,
) -> Result<()> {
    let dest_root = dest.to_path_buf();
    let descend_scope = scope.clone();
    let mut widened: Vec<(PathBuf, u32)> = Vec::new();

    let walker = WalkDir::new(dest)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_entry(move |entry| {
            entry
                .path()
                .strip_prefix(&dest_root)
                .is_ok_and(|rel| descend_scope.may_descend(rel))
        });

    for item in walker {
        let entry = item.map_err(|e| SyncError::WalkFailed {
            path: dest.display().to_string(),
            message: e.to_string(),
        })?;
        let Ok(rel) = entry.path().strip_prefix(dest) else {
            continue;
        };

        // may_descend admits ancestors of the include set; only paths fully
        // in scope are deletion candidates.
        if !scope.in_scope(rel) {
            continue;
        }
        if written.contains(rel) {
            continue;
        }

        debug!(path = %rel.display(), "deleting stale path");
        remove_node(entry.path(), entry.file_type().is_dir(), &mut widened)?;
    }

    restore_widened(widened)
}

/// Delete one node, temporarily widening the parent directory's permissions
/// if the first attempt is refused. A read-only directory otherwise blocks
/// deletion of its own stale children. Widened directories are recorded so
/// their original bits come back once pruning is done.
fn remove_node(path: &Path, is_dir: bool, widened: &mut Vec<(PathBuf, u32)>) -> Result<()> {
    match remove_once(path, is_dir) {
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            if let Some(parent) = path.parent() {
                if let Some(previous) = widen_permissions(parent)? {
                    widened.push((parent.to_path_buf(), previous));
                }
            }
            remove_once(path, is_dir).map_err(|e| prune_err(path, &e))
        }
        other => other.map_err(|e| prune_err(path, &e)),
    }
}

fn remove_once(path: &Path, is_dir: bool) -> std::io::Result<()> {
    if is_dir {
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    }
}

/// Add `u+rwx` to a directory, returning its previous permission bits when
/// they actually changed
fn widen_permissions(dir: &Path) -> Result<Option<u32>> {
    let meta = fs::metadata(dir).map_err(|e| prune_err(dir, &e))?;
    let mode = meta.permissions().mode() & 0o7777;
    let wide = mode | 0o700;
    if wide == mode {
        return Ok(None);
    }
    fs::set_permissions(dir, fs::Permissions::from_mode(wide)).map_err(|e| prune_err(dir, &e))?;
    Ok(Some(mode))
}

/// Put the original bits back on widened directories that survived the
/// prune. Deepest-first, so a restored read-only ancestor cannot block the
/// restore of a directory beneath it. A widened directory that was itself
/// stale is gone by now and skipped.
fn restore_widened(mut widened: Vec<(PathBuf, u32)>) -> Result<()> {
    widened.sort_by(|a, b| b.0.components().count().cmp(&a.0.components().count()));
    for (dir, mode) in widened {
        match fs::set_permissions(&dir, fs::Permissions::from_mode(mode)) {
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            other => other.map_err(|e| prune_err(&dir, &e))?,
        }
    }
    Ok(())
}

fn prune_err(path: &Path, err: &std::io::Error) -> atomos_errors::Error {
    SyncError::PruneFailed {
        path: path.display().to_string(),
        message: err.to_string(),
    }
    .into()
}
