//! The install orchestrator

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use atomos_errors::{DeploymentError, Error, Result};
use atomos_hash::Digest;
use atomos_transaction::{Transaction, Transactioner};
use atomos_types::Deployment;

/// Result of a successful install
#[derive(Debug, Clone)]
pub struct InstallOutcome {
    pub transaction_id: u64,
    /// Digest of the synchronized source content
    pub digest: Option<Digest>,
}

/// One open transaction per deployment target, process-wide. A second
/// install against a device that already has one running is refused, not
/// queued.
fn target_locks() -> &'static DashMap<PathBuf, Arc<Mutex<()>>> {
    static LOCKS: OnceLock<DashMap<PathBuf, Arc<Mutex<()>>>> = OnceLock::new();
    LOCKS.get_or_init(DashMap::new)
}

/// Orchestrates one deployment install at a time per target device.
///
/// Depends only on the [`Transactioner`] seam; production wiring passes a
/// `SnapshotManager`, tests a `MockTransactioner`.
pub struct Installer {
    transactioner: Box<dyn Transactioner>,
}

impl Installer {
    #[must_use]
    pub fn new(transactioner: Box<dyn Transactioner>) -> Self {
        Self { transactioner }
    }

    /// Run the full install sequence for `deployment`.
    ///
    /// On success the deployment's source descriptor carries the digest the
    /// synchronizer produced. On failure the original phase error is
    /// returned; a rollback failure is logged but never masks it.
    ///
    /// # Errors
    /// The first failing phase's error, `Error::Cancelled` when the token
    /// fires at a phase boundary, or `DeploymentError::TargetBusy` when
    /// another install already holds the target device.
    pub async fn install(
        &mut self,
        token: &CancellationToken,
        deployment: &mut Deployment,
    ) -> Result<InstallOutcome> {
        deployment.sanitize()?;

        let target = deployment
            .system_disk()
            .unwrap_or(&deployment.disks[0])
            .device
            .clone();
        let lock = target_locks()
            .entry(target.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let Ok(guard) = lock.try_lock() else {
            return Err(DeploymentError::TargetBusy {
                device: target.display().to_string(),
            }
            .into());
        };

        info!(target = %target.display(), "starting install");
        let result = self.run_transaction(token, deployment).await;

        // Drop the table entry once nobody else holds the handle, so the
        // table stays bounded by the number of concurrently busy targets.
        // Entry creation and removal serialize on the map shard, so a count
        // of two means exactly the table and this call.
        drop(guard);
        target_locks().remove_if(&target, |_, l| Arc::strong_count(l) == 2);

        result
    }

    async fn run_transaction(
        &mut self,
        token: &CancellationToken,
        deployment: &mut Deployment,
    ) -> Result<InstallOutcome> {
        // Init and start failures hold no snapshot resources; the contract
        // forbids rolling them back.
        let mut tx = self.transactioner.init(token, deployment).await?;
        self.transactioner.start(token, &mut tx).await?;

        if let Err(err) = self.populate_and_commit(token, &mut tx, deployment).await {
            if let Err(rollback_err) = self.transactioner.rollback(&mut tx).await {
                error!(id = tx.id, error = %rollback_err, "rollback failed");
            }
            return Err(err);
        }

        if let Some(digest) = tx.digest.clone() {
            deployment.source_os.set_digest(digest);
        }

        info!(id = tx.id, "install complete");
        Ok(InstallOutcome {
            transaction_id: tx.id,
            digest: tx.digest,
        })
    }

    /// Phases whose failure obliges the caller to roll back
    async fn populate_and_commit(
        &mut self,
        token: &CancellationToken,
        tx: &mut Transaction,
        deployment: &Deployment,
    ) -> Result<()> {
        self.transactioner
            .update(
                token,
                tx,
                &deployment.source_os,
                deployment.overlay_tree.as_ref(),
            )
            .await?;

        if let Some(hook) = &deployment.cfg_script {
            check_cancelled(token)?;
            self.transactioner.run_hook(token, tx, hook).await?;
        }

        check_cancelled(token)?;
        self.transactioner.commit(token, tx).await
    }
}

fn check_cancelled(token: &CancellationToken) -> Result<()> {
    if token.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}
