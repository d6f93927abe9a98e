//! Disk-backed snapshot transactioner
//!
//! Snapshots live under `<root>/snapshots/<id>`; the currently active root
//! is the `<root>/snapshots/active` symlink. Commit repoints the symlink
//! with a create-aside-and-rename pair so there is never a moment without a
//! valid active target.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use atomos_errors::{Error, Result, TransactionError};
use atomos_sync::{force_remove_all, Synchronizer};
use atomos_types::{Deployment, OsSource, TransactionState};

use crate::hook::{ChrootHookRunner, HookRunner};
use crate::transactioner::{Transaction, Transactioner};

const SNAPSHOTS_DIR: &str = "snapshots";
const ACTIVE_LINK: &str = "active";

/// Production transactioner working against a mounted target filesystem
pub struct SnapshotManager {
    root: PathBuf,
    max_snapshots: usize,
    hook_runner: Box<dyn HookRunner>,
}

impl SnapshotManager {
    /// Create a manager rooted at the mounted system partition
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_snapshots: 8,
            hook_runner: Box::new(ChrootHookRunner),
        }
    }

    /// Cap the number of coexisting snapshots (the slot budget)
    #[must_use]
    pub fn with_max_snapshots(mut self, max: usize) -> Self {
        self.max_snapshots = max;
        self
    }

    /// Substitute the hook runner (tests inject a recording fake here)
    #[must_use]
    pub fn with_hook_runner(mut self, runner: Box<dyn HookRunner>) -> Self {
        self.hook_runner = runner;
        self
    }

    fn snapshots_dir(&self) -> PathBuf {
        self.root.join(SNAPSHOTS_DIR)
    }

    fn active_link(&self) -> PathBuf {
        self.snapshots_dir().join(ACTIVE_LINK)
    }

    /// Scan existing snapshot directories: (count, highest id)
    async fn scan_slots(&self) -> Result<(usize, u64)> {
        let dir = self.snapshots_dir();
        let mut count = 0;
        let mut highest = 0;

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((0, 0)),
            Err(e) => return Err(Error::io_with_path(&e, &dir)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::io_with_path(&e, &dir))?
        {
            if let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<u64>().ok())
            {
                count += 1;
                highest = highest.max(id);
            }
        }

        Ok((count, highest))
    }

    fn expect_state(tx: &Transaction, expected: TransactionState) -> Result<()> {
        if tx.state == expected {
            Ok(())
        } else {
            Err(TransactionError::InvalidState {
                id: tx.id,
                from: tx.state.to_string(),
                to: expected.to_string(),
            }
            .into())
        }
    }

    fn check_cancelled(token: &CancellationToken) -> Result<()> {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

#[async_trait]
impl Transactioner for SnapshotManager {
    async fn init(
        &mut self,
        token: &CancellationToken,
        _deployment: &Deployment,
    ) -> Result<Transaction> {
        Self::check_cancelled(token)?;

        let (used, highest) = self
            .scan_slots()
            .await
            .map_err(|e| TransactionError::Initialization {
                message: format!("failed to scan snapshot slots: {e}"),
            })?;

        if used >= self.max_snapshots {
            return Err(TransactionError::Initialization {
                message: format!("no free snapshot slot ({used}/{} used)", self.max_snapshots),
            }
            .into());
        }

        let id = highest + 1;
        let path = self.snapshots_dir().join(id.to_string());
        info!(id, path = %path.display(), "transaction allocated");
        Ok(Transaction::new(id, path))
    }

    async fn start(&mut self, token: &CancellationToken, tx: &mut Transaction) -> Result<()> {
        Self::check_cancelled(token)?;
        Self::expect_state(tx, TransactionState::Created)?;

        if let Err(e) = fs::create_dir_all(&tx.path).await {
            // Release anything this phase managed to create; start failures
            // are not rolled back by the caller.
            let _ = force_remove_all(&tx.path).await;
            return Err(TransactionError::Start {
                id: tx.id,
                message: format!("failed to prepare snapshot path: {e}"),
            }
            .into());
        }

        tx.state = TransactionState::Started;
        Ok(())
    }

    async fn update(
        &mut self,
        token: &CancellationToken,
        tx: &mut Transaction,
        source: &OsSource,
        overlay: Option<&OsSource>,
    ) -> Result<()> {
        Self::check_cancelled(token)?;
        Self::expect_state(tx, TransactionState::Started)?;

        let wrap = |e: Error| -> Error {
            if e.is_cancelled() {
                return e;
            }
            TransactionError::Update {
                id: tx.id,
                message: e.to_string(),
            }
            .into()
        };

        let digest = Synchronizer::new(source.kind.clone())
            .mirror(token.clone(), &tx.path, &[], &[])
            .await
            .map_err(wrap)?;

        if let Some(overlay) = overlay {
            Synchronizer::new(overlay.kind.clone())
                .overlay(token.clone(), &tx.path, &[])
                .await
                .map_err(wrap)?;
        }

        tx.digest = Some(digest);
        tx.state = TransactionState::Updated;
        Ok(())
    }

    async fn run_hook(
        &mut self,
        token: &CancellationToken,
        tx: &Transaction,
        hook: &Path,
    ) -> Result<()> {
        Self::check_cancelled(token)?;
        Self::expect_state(tx, TransactionState::Updated)?;

        self.hook_runner
            .run(&tx.path, hook)
            .await
            .map_err(|e| match e {
                Error::Transaction(TransactionError::Hook { message, .. }) => {
                    TransactionError::Hook {
                        id: tx.id,
                        message,
                    }
                    .into()
                }
                other => other,
            })
    }

    async fn commit(&mut self, token: &CancellationToken, tx: &mut Transaction) -> Result<()> {
        Self::check_cancelled(token)?;
        Self::expect_state(tx, TransactionState::Updated)?;

        let commit_err = |message: String| -> Error {
            TransactionError::Commit {
                id: tx.id,
                message,
            }
            .into()
        };

        // Repoint the active symlink: create it aside, then rename over the
        // old one so a valid target exists at every instant.
        let staged = self.snapshots_dir().join(format!(".active-{}", tx.id));
        let _ = fs::remove_file(&staged).await;
        fs::symlink(tx.id.to_string(), &staged)
            .await
            .map_err(|e| commit_err(format!("failed to stage active link: {e}")))?;
        fs::rename(&staged, self.active_link())
            .await
            .map_err(|e| commit_err(format!("failed to switch active link: {e}")))?;

        tx.state = TransactionState::Committed;
        info!(id = tx.id, "transaction committed");
        Ok(())
    }

    async fn rollback(&mut self, tx: &mut Transaction) -> Result<()> {
        if tx.state == TransactionState::RolledBack {
            return Ok(());
        }

        force_remove_all(&tx.path)
            .await
            .map_err(|e| TransactionError::Rollback {
                id: tx.id,
                message: e.to_string(),
            })?;

        tx.state = TransactionState::RolledBack;
        warn!(id = tx.id, "transaction rolled back");
        Ok(())
    }
}
