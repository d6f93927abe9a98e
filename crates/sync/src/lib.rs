#![warn(clippy::pedantic)]
#![deny(clippy::all)]

//! Content synchronization for atomos
//!
//! Two reconciliation modes over a content source (tarball or directory
//! tree):
//!
//! - **overlay**: apply source content on top of a destination, deleting
//!   nothing.
//! - **mirror**: make the destination match the source exactly within a path
//!   scope, deleting stale paths children-first.
//!
//! Both return a [`Digest`](atomos_hash::Digest) identifying the
//! synchronized content.

mod dir;
mod fsutil;
mod prune;
mod scope;
mod tarball;

pub use fsutil::force_remove_all;
pub use scope::PathScope;

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::info;

use atomos_errors::Result;
use atomos_hash::Digest;
use atomos_types::SourceKind;

/// Synchronizes a single content source into destination trees.
pub struct Synchronizer {
    source: SourceKind,
}

impl Synchronizer {
    /// Create a synchronizer over the given source
    #[must_use]
    pub fn new(source: SourceKind) -> Self {
        Self { source }
    }

    /// Create a synchronizer over a gzip-compressed tarball
    #[must_use]
    pub fn tarball(path: impl Into<PathBuf>) -> Self {
        Self::new(SourceKind::Tar(path.into()))
    }

    /// Create a synchronizer over a directory tree
    #[must_use]
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self::new(SourceKind::Dir(path.into()))
    }

    /// Apply source content on top of `dest`, skipping excluded paths.
    /// Pre-existing destination content outside the source is left untouched.
    ///
    /// # Errors
    /// Extraction/copy errors propagate unchanged; see the archive crate for
    /// the extraction taxonomy.
    pub async fn overlay(
        &self,
        token: CancellationToken,
        dest: &Path,
        exclude: &[PathBuf],
    ) -> Result<Digest> {
        let scope = PathScope::new(&[], exclude);
        let (_, digest) = self.populate(token, dest, scope.clone()).await?;
        info!(source = %self.source.path().display(), dest = %dest.display(),
            digest = %digest, "overlay complete");
        Ok(digest)
    }

    /// Reconcile `dest` to exactly match the source within scope: extract
    /// in-scope entries, then delete every in-scope destination path the
    /// source does not contain. Paths outside the include scope or inside
    /// the exclude scope are never inspected or mutated.
    ///
    /// # Errors
    /// Extraction errors propagate unchanged; deletion failures surface as
    /// `SyncError::PruneFailed`.
    pub async fn mirror(
        &self,
        token: CancellationToken,
        dest: &Path,
        exclude: &[PathBuf],
        include: &[PathBuf],
    ) -> Result<Digest> {
        let scope = PathScope::new(include, exclude);
        let (written, digest) = self.populate(token.clone(), dest, scope.clone()).await?;

        let dest_buf = dest.to_path_buf();
        tokio::task::spawn_blocking(move || prune::prune_unlisted(&dest_buf, &written, &scope))
            .await
            .map_err(|e| atomos_errors::Error::internal(format!("prune task failed: {e}")))??;

        info!(source = %self.source.path().display(), dest = %dest.display(),
            digest = %digest, "mirror complete");
        Ok(digest)
    }

    /// Run the scoped extraction/copy and compute the source digest
    async fn populate(
        &self,
        token: CancellationToken,
        dest: &Path,
        scope: PathScope,
    ) -> Result<(std::collections::HashSet<PathBuf>, Digest)> {
        match &self.source {
            SourceKind::Tar(path) => tarball::populate(token, path, dest, scope).await,
            SourceKind::Dir(path) => dir::populate(token, path, dest, scope).await,
        }
    }
}
