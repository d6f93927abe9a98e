//! Filesystem helpers shared by the synchronizer and the transaction layer

use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use walkdir::WalkDir;

use atomos_errors::{Error, Result};

/// Remove a tree even when it contains read-only directories.
///
/// Extracted OS content routinely carries directories without owner write
/// permission, which plain `remove_dir_all` refuses to descend into. Every
/// directory is re-widened to `u+rwx` before the removal.
///
/// Removing a path that does not exist is not an error.
///
/// # Errors
/// Returns an error if the final removal fails.
pub async fn force_remove_all(path: &Path) -> Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || force_remove_all_blocking(&path))
        .await
        .map_err(|e| Error::internal(format!("remove task failed: {e}")))?
}

pub(crate) fn force_remove_all_blocking(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::io_with_path(&e, path)),
    };

    if !meta.is_dir() {
        return fs::remove_file(path).map_err(|e| Error::io_with_path(&e, path));
    }

    for entry in WalkDir::new(path).into_iter().flatten() {
        if entry.file_type().is_dir() {
            if let Ok(dir_meta) = entry.metadata() {
                let mode = dir_meta.permissions().mode() | 0o700;
                let _ = fs::set_permissions(entry.path(), fs::Permissions::from_mode(mode));
            }
        }
    }

    fs::remove_dir_all(path).map_err(|e| Error::io_with_path(&e, path))
}
