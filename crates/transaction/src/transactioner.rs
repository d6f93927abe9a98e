//! Transaction handle and the polymorphic transactioner seam

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use atomos_errors::Result;
use atomos_hash::Digest;
use atomos_types::{Deployment, OsSource, TransactionState};

/// A single deployment transaction: an allocated snapshot plus its
/// lifecycle state. Owned by the transactioner that issued it; the
/// orchestrator only threads it through the phase calls.
#[derive(Debug, Clone)]
pub struct Transaction {
    /// Monotonically assigned per deployment target
    pub id: u64,
    /// Private, not-yet-active filesystem root this transaction populates
    pub path: PathBuf,
    /// Content identity recorded once update succeeds
    pub digest: Option<Digest>,
    pub state: TransactionState,
}

impl Transaction {
    /// Create a freshly allocated transaction handle
    #[must_use]
    pub fn new(id: u64, path: PathBuf) -> Self {
        Self {
            id,
            path,
            digest: None,
            state: TransactionState::Created,
        }
    }
}

/// Phase operations of the transaction state machine.
///
/// Rollback obligations are asymmetric and part of this contract: callers
/// must invoke [`rollback`](Transactioner::rollback) after a failed
/// `update`, `run_hook` or `commit`, and must not invoke it after a failed
/// `init` or `start` (those phases release their own resources).
#[async_trait]
pub trait Transactioner: Send + Sync {
    /// Allocate a transaction identifier and an inactive snapshot path for
    /// the deployment target. Performs no mutation visible to the currently
    /// active system and holds no resources on failure.
    async fn init(
        &mut self,
        token: &CancellationToken,
        deployment: &Deployment,
    ) -> Result<Transaction>;

    /// Prepare the snapshot path for writing.
    async fn start(&mut self, token: &CancellationToken, tx: &mut Transaction) -> Result<()>;

    /// Populate the snapshot: mirror `source` into it, then overlay the
    /// optional `overlay` on top, and record the resulting digest on the
    /// transaction.
    async fn update(
        &mut self,
        token: &CancellationToken,
        tx: &mut Transaction,
        source: &OsSource,
        overlay: Option<&OsSource>,
    ) -> Result<()>;

    /// Execute the configuration hook with the snapshot path as its root.
    async fn run_hook(
        &mut self,
        token: &CancellationToken,
        tx: &Transaction,
        hook: &Path,
    ) -> Result<()>;

    /// Atomically switch the active target to this transaction's snapshot.
    async fn commit(&mut self, token: &CancellationToken, tx: &mut Transaction) -> Result<()>;

    /// Best-effort reverse of start/update/commit side effects. Idempotent;
    /// never leaves the active target ambiguous.
    async fn rollback(&mut self, tx: &mut Transaction) -> Result<()>;
}
