//! Core component container for the broker runtime.

use crate::{
    broker::RequestBroker, committer::WeightCommitter, ledger::LedgerClient,
    metrics::MetricsCollector, peers::PeerDirectory, reputation::ReputationTracker,
};
use std::sync::Arc;

/// Container for the initialized broker components.
///
/// Everything is behind `Arc` so HTTP handlers and background tasks can share it.
#[derive(Clone)]
pub struct RelayComponents {
    metrics_collector: Arc<MetricsCollector>,
    tracker: Arc<ReputationTracker>,
    directory: Arc<dyn PeerDirectory>,
    ledger: Arc<dyn LedgerClient>,
    broker: Arc<RequestBroker>,
    committer: Arc<WeightCommitter>,
}

impl RelayComponents {
    #[must_use]
    pub fn new(
        metrics_collector: Arc<MetricsCollector>,
        tracker: Arc<ReputationTracker>,
        directory: Arc<dyn PeerDirectory>,
        ledger: Arc<dyn LedgerClient>,
        broker: Arc<RequestBroker>,
        committer: Arc<WeightCommitter>,
    ) -> Self {
        Self { metrics_collector, tracker, directory, ledger, broker, committer }
    }

    #[must_use]
    pub fn metrics_collector(&self) -> &Arc<MetricsCollector> {
        &self.metrics_collector
    }

    #[must_use]
    pub fn tracker(&self) -> &Arc<ReputationTracker> {
        &self.tracker
    }

    #[must_use]
    pub fn directory(&self) -> &Arc<dyn PeerDirectory> {
        &self.directory
    }

    /// The ledger as seen by the committer, already wrapped in the retry policy.
    #[must_use]
    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }

    #[must_use]
    pub fn broker(&self) -> &Arc<RequestBroker> {
        &self.broker
    }

    #[must_use]
    pub fn committer(&self) -> &Arc<WeightCommitter> {
        &self.committer
    }
}
