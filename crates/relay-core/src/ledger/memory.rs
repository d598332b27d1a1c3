use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::atomic::{AtomicU32, Ordering},
};

use super::{LedgerClient, LedgerError};
use crate::types::PeerId;

/// One accepted weight submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub height: u64,
    pub uids: Vec<PeerId>,
    pub weights: Vec<f64>,
    pub wait_for_inclusion: bool,
}

#[derive(Debug)]
struct LedgerState {
    height: u64,
    tempo: u64,
    last_update: HashMap<PeerId, u64>,
    submissions: Vec<Submission>,
}

/// Process-local ledger.
///
/// A successful submit stamps the owner's last-update height with the current height,
/// the same way a real ledger records the submitting key. Failures can be injected for
/// the next N reads or submits.
pub struct InMemoryLedger {
    owner: PeerId,
    state: Mutex<LedgerState>,
    failing_reads: AtomicU32,
    failing_submits: AtomicU32,
    reconnects: AtomicU32,
}

impl InMemoryLedger {
    /// Default tempo, in blocks, for a fresh ledger.
    pub const DEFAULT_TEMPO: u64 = 360;

    #[must_use]
    pub fn new(owner: PeerId) -> Self {
        Self {
            owner,
            state: Mutex::new(LedgerState {
                height: 0,
                tempo: Self::DEFAULT_TEMPO,
                last_update: HashMap::new(),
                submissions: Vec::new(),
            }),
            failing_reads: AtomicU32::new(0),
            failing_submits: AtomicU32::new(0),
            reconnects: AtomicU32::new(0),
        }
    }

    pub fn set_height(&self, height: u64) {
        self.state.lock().height = height;
    }

    /// Moves the chain forward by `blocks`.
    pub fn advance(&self, blocks: u64) {
        let mut state = self.state.lock();
        state.height = state.height.saturating_add(blocks);
    }

    pub fn set_tempo(&self, tempo: u64) {
        self.state.lock().tempo = tempo;
    }

    pub fn set_last_update(&self, peer: PeerId, height: u64) {
        self.state.lock().last_update.insert(peer, height);
    }

    pub fn clear_last_update(&self, peer: PeerId) {
        self.state.lock().last_update.remove(&peer);
    }

    /// The next `count` reads fail with [`LedgerError::Connection`].
    pub fn fail_next_reads(&self, count: u32) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    /// The next `count` submits fail with [`LedgerError::SubmitFailure`].
    pub fn fail_next_submits(&self, count: u32) {
        self.failing_submits.store(count, Ordering::SeqCst);
    }

    #[must_use]
    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().submissions.clone()
    }

    #[must_use]
    pub fn reconnect_count(&self) -> u32 {
        self.reconnects.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok()
    }

    fn check_read(&self) -> Result<(), LedgerError> {
        if Self::take_failure(&self.failing_reads) {
            return Err(LedgerError::Connection("injected read failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn read_height(&self) -> Result<u64, LedgerError> {
        self.check_read()?;
        Ok(self.state.lock().height)
    }

    async fn read_tempo(&self) -> Result<u64, LedgerError> {
        self.check_read()?;
        Ok(self.state.lock().tempo)
    }

    async fn read_last_update(&self, peer: PeerId) -> Result<Option<u64>, LedgerError> {
        self.check_read()?;
        Ok(self.state.lock().last_update.get(&peer).copied())
    }

    async fn submit_weights(
        &self,
        uids: &[PeerId],
        weights: &[f64],
        wait_for_inclusion: bool,
    ) -> Result<(), LedgerError> {
        if Self::take_failure(&self.failing_submits) {
            return Err(LedgerError::SubmitFailure("injected submit failure".to_string()));
        }
        if uids.len() != weights.len() {
            return Err(LedgerError::SubmitFailure(format!(
                "length mismatch: {} uids, {} weights",
                uids.len(),
                weights.len()
            )));
        }

        let mut state = self.state.lock();
        let height = state.height;
        state.last_update.insert(self.owner, height);
        state.submissions.push(Submission {
            height,
            uids: uids.to_vec(),
            weights: weights.to_vec(),
            wait_for_inclusion,
        });
        Ok(())
    }

    async fn reconnect(&self) -> Result<(), LedgerError> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
