//! In-memory test double for the transactioner seam
//!
//! Shared-state clone semantics: clone the mock, hand one copy to the
//! orchestrator, keep the other for injecting failures and asserting which
//! phases ran.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use atomos_errors::{Result, TransactionError};
use atomos_hash::Digest;
use atomos_types::{Deployment, OsSource, TransactionState};

use crate::transactioner::{Transaction, Transactioner};

/// Lifecycle phases, used for failure injection and call recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Init,
    Start,
    Update,
    Hook,
    Commit,
    Rollback,
}

#[derive(Debug)]
struct MockState {
    next_id: u64,
    snapshot_path: PathBuf,
    digest: Digest,
    failures: HashMap<Phase, String>,
    calls: Vec<Phase>,
    rollback_calls: usize,
    update_gate: Option<Arc<Semaphore>>,
}

/// Error-injectable transactioner that records every phase call
#[derive(Debug, Clone)]
pub struct MockTransactioner {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockTransactioner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransactioner {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                next_id: 1,
                snapshot_path: PathBuf::from("/snapshot/path"),
                digest: Digest::from_data(b"mock content"),
                failures: HashMap::new(),
                calls: Vec::new(),
                rollback_calls: 0,
                update_gate: None,
            })),
        }
    }

    /// Digest the mock records on update
    #[must_use]
    pub fn with_digest(self, digest: Digest) -> Self {
        self.state.lock().unwrap().digest = digest;
        self
    }

    /// Hold the update phase until a permit is added to `gate`, so tests
    /// can keep a transaction open at a known point
    pub fn gate_update(&self, gate: Arc<Semaphore>) {
        self.state.lock().unwrap().update_gate = Some(gate);
    }

    /// Make the given phase fail with `message`
    pub fn fail_on(&self, phase: Phase, message: &str) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(phase, message.to_string());
    }

    /// Phases invoked so far, in order
    #[must_use]
    pub fn calls(&self) -> Vec<Phase> {
        self.state.lock().unwrap().calls.clone()
    }

    /// How many times rollback was invoked
    #[must_use]
    pub fn rollback_calls(&self) -> usize {
        self.state.lock().unwrap().rollback_calls
    }

    /// Whether rollback was invoked at all
    #[must_use]
    pub fn rollback_called(&self) -> bool {
        self.rollback_calls() > 0
    }

    /// The digest this mock hands out
    #[must_use]
    pub fn digest(&self) -> Digest {
        self.state.lock().unwrap().digest.clone()
    }

    fn record(&self, phase: Phase) -> Option<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(phase);
        if phase == Phase::Rollback {
            state.rollback_calls += 1;
        }
        state.failures.get(&phase).cloned()
    }
}

#[async_trait]
impl Transactioner for MockTransactioner {
    async fn init(
        &mut self,
        _token: &CancellationToken,
        _deployment: &Deployment,
    ) -> Result<Transaction> {
        if let Some(message) = self.record(Phase::Init) {
            return Err(TransactionError::Initialization { message }.into());
        }
        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        Ok(Transaction::new(id, state.snapshot_path.clone()))
    }

    async fn start(&mut self, _token: &CancellationToken, tx: &mut Transaction) -> Result<()> {
        if let Some(message) = self.record(Phase::Start) {
            return Err(TransactionError::Start { id: tx.id, message }.into());
        }
        tx.state = TransactionState::Started;
        Ok(())
    }

    async fn update(
        &mut self,
        _token: &CancellationToken,
        tx: &mut Transaction,
        _source: &OsSource,
        _overlay: Option<&OsSource>,
    ) -> Result<()> {
        if let Some(message) = self.record(Phase::Update) {
            return Err(TransactionError::Update { id: tx.id, message }.into());
        }
        let gate = self.state.lock().unwrap().update_gate.clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        tx.digest = Some(self.digest());
        tx.state = TransactionState::Updated;
        Ok(())
    }

    async fn run_hook(
        &mut self,
        _token: &CancellationToken,
        tx: &Transaction,
        _hook: &Path,
    ) -> Result<()> {
        if let Some(message) = self.record(Phase::Hook) {
            return Err(TransactionError::Hook { id: tx.id, message }.into());
        }
        Ok(())
    }

    async fn commit(&mut self, _token: &CancellationToken, tx: &mut Transaction) -> Result<()> {
        if let Some(message) = self.record(Phase::Commit) {
            return Err(TransactionError::Commit { id: tx.id, message }.into());
        }
        tx.state = TransactionState::Committed;
        Ok(())
    }

    async fn rollback(&mut self, tx: &mut Transaction) -> Result<()> {
        if let Some(message) = self.record(Phase::Rollback) {
            return Err(TransactionError::Rollback { id: tx.id, message }.into());
        }
        tx.state = TransactionState::RolledBack;
        Ok(())
    }
}
