//! Tarball source synchronization

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use atomos_archive::{extract_tarball, EntryFilter, EntryInfo};
use atomos_errors::Result;
use atomos_hash::Digest;

use crate::scope::PathScope;

/// Extract the in-scope entries of the tarball into `dest` and digest the
/// source archive stream.
pub(crate) async fn populate(
    token: CancellationToken,
    source: &Path,
    dest: &Path,
    scope: PathScope,
) -> Result<(HashSet<PathBuf>, Digest)> {
    let filter: Box<dyn EntryFilter> = Box::new(move |entry: &EntryInfo| -> Result<bool> {
        Ok(scope.in_scope(&entry.path))
    });

    let report = extract_tarball(token, source, dest, vec![filter]).await?;
    let digest = Digest::hash_file(source).await?;
    Ok((report.written, digest))
}
