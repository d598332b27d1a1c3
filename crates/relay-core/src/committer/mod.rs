//! Epoch-gated weight commits.
//!
//! Every `interval_seconds` the committer reads the ledger's epoch position and, once
//! more than `tempo + 1` blocks have passed since this node's last update, advances the
//! reputation EMA, submits the normalized vector and refreshes the peer roster.
//!
//! ```text
//! distance = height - last_update(self)      (tempo + 2 when never updated)
//! commit   = distance > tempo + 1
//! ```
//!
//! Because a successful submit moves `last_update(self)` to the current height, the
//! distance drops back to zero and at most one commit lands per tempo-sized window.

use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tokio::{sync::broadcast, time::interval};
use tracing::{debug, error, info, warn};

use crate::{
    ledger::{LedgerClient, LedgerError},
    metrics::{MetricsCollector, MetricsState},
    peers::PeerDirectory,
    reputation::{ReputationError, ReputationTracker},
};

/// Weight committer schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitterConfig {
    /// Whether the committer task runs at all (default: true)
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Seconds between epoch evaluations (default: 60)
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,

    /// Wait for the submission to be included before reporting success (default: true)
    #[serde(default = "default_enabled")]
    pub wait_for_inclusion: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_interval_seconds() -> u64 {
    60
}

impl Default for CommitterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: default_interval_seconds(),
            wait_for_inclusion: true,
        }
    }
}

impl CommitterConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

/// Why a cycle ended without committing.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// A ledger read still failed after the reconnect retry.
    LedgerRead(LedgerError),
    EmptyRoster,
    /// The submit was rejected; the next due cycle tries again.
    Submit(LedgerError),
}

/// Result of one committer cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Committed { distance: u64, peers: usize },
    NotDue { distance: u64, tempo: u64 },
    Skipped(SkipReason),
}

impl CycleOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Committed { .. } => "committed",
            Self::NotDue { .. } => "not_due",
            Self::Skipped(SkipReason::LedgerRead(_)) => "ledger_read_failed",
            Self::Skipped(SkipReason::EmptyRoster) => "empty_roster",
            Self::Skipped(SkipReason::Submit(_)) => "submit_failed",
        }
    }
}

/// Blocks since `last_update`, or `tempo + 2` when the node never submitted.
#[must_use]
pub fn epoch_distance(height: u64, last_update: Option<u64>, tempo: u64) -> u64 {
    match last_update {
        Some(last) => height.saturating_sub(last),
        None => tempo.saturating_add(2),
    }
}

/// Whether a commit is due at `distance` for the given `tempo`.
#[must_use]
pub fn commit_due(distance: u64, tempo: u64) -> bool {
    distance > tempo.saturating_add(1)
}

/// Drives epoch evaluation and weight submission.
///
/// The ledger handed in is expected to apply the reconnect-once read policy, normally by
/// being a [`RetryingLedger`](crate::ledger::RetryingLedger).
pub struct WeightCommitter {
    config: CommitterConfig,
    ledger: Arc<dyn LedgerClient>,
    tracker: Arc<ReputationTracker>,
    directory: Arc<dyn PeerDirectory>,
    metrics: Arc<MetricsCollector>,
}

impl WeightCommitter {
    #[must_use]
    pub fn new(
        config: CommitterConfig,
        ledger: Arc<dyn LedgerClient>,
        tracker: Arc<ReputationTracker>,
        directory: Arc<dyn PeerDirectory>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self { config, ledger, tracker, directory, metrics }
    }

    #[must_use]
    pub fn config(&self) -> &CommitterConfig {
        &self.config
    }

    /// Runs cycles on the configured interval until `shutdown_rx` fires.
    ///
    /// Each cycle runs in its own task; a panic inside one is logged and the loop moves on.
    /// Shutdown is checked before every tick, so no cycle starts after it is signalled.
    #[must_use]
    pub fn start_with_shutdown(
        self: &Arc<Self>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        let committer = Arc::clone(self);
        let period = self.config.interval();

        tokio::spawn(async move {
            let mut interval = interval(period);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        info!("weight committer shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        let cycle = Arc::clone(&committer);
                        if let Err(e) = tokio::spawn(async move { cycle.run_cycle().await }).await {
                            error!(error = %e, "weight commit cycle panicked");
                        }
                    }
                }
            }
        })
    }

    /// Evaluates the epoch position once and commits if due.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let outcome = self.evaluate().await;
        self.metrics.record_commit(outcome.label());

        match &outcome {
            CycleOutcome::Committed { distance, peers } => {
                info!(distance = distance, peers = peers, "committed weights");
            }
            CycleOutcome::NotDue { distance, tempo } => {
                debug!(distance = distance, tempo = tempo, "weight commit not due");
            }
            CycleOutcome::Skipped(SkipReason::LedgerRead(e)) => {
                warn!(error = %e, reason = e.as_metric_str(), "skipping commit cycle");
            }
            CycleOutcome::Skipped(SkipReason::EmptyRoster) => {
                warn!("skipping commit cycle: roster is empty");
            }
            CycleOutcome::Skipped(SkipReason::Submit(e)) => {
                error!(error = %e, "weight submission failed, retrying next cycle");
            }
        }
        outcome
    }

    async fn evaluate(&self) -> CycleOutcome {
        let epoch = async {
            let height = self.ledger.read_height().await?;
            let tempo = self.ledger.read_tempo().await?;
            let last_update = self.ledger.read_last_update(self.directory.self_id()).await?;
            Ok::<_, LedgerError>((height, tempo, last_update))
        };
        let (height, tempo, last_update) = match epoch.await {
            Ok(values) => values,
            Err(e) => return CycleOutcome::Skipped(SkipReason::LedgerRead(e)),
        };

        let distance = epoch_distance(height, last_update, tempo);
        self.metrics.record_epoch_distance(distance);

        if !commit_due(distance, tempo) {
            return CycleOutcome::NotDue { distance, tempo };
        }

        let weights = match self.tracker.current_weights() {
            Ok(weights) => weights,
            Err(ReputationError::EmptyRoster) => {
                return CycleOutcome::Skipped(SkipReason::EmptyRoster)
            }
        };

        for (uid, _) in weights.iter() {
            if let Some(score) = self.tracker.score(uid) {
                self.metrics.record_peer_score(&uid.to_string(), score);
            }
        }

        if let Err(e) = self
            .ledger
            .submit_weights(&weights.uids, &weights.weights, self.config.wait_for_inclusion)
            .await
        {
            return CycleOutcome::Skipped(SkipReason::Submit(e));
        }

        match self.directory.refresh().await {
            Ok(roster) => {
                let ids: Vec<_> = roster.iter().map(|peer| peer.uid).collect();
                self.tracker.sync_roster(&ids);
            }
            Err(e) => warn!(error = %e, "roster refresh after commit failed"),
        }

        CycleOutcome::Committed { distance, peers: weights.len() }
    }
}
