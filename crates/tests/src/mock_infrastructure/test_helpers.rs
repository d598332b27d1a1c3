//! Fixtures for wiring brokers and committers in tests.

use relay_core::{
    broker::{BrokerConfig, RequestBroker},
    committer::{CommitterConfig, WeightCommitter},
    ledger::{InMemoryLedger, LedgerClient, RetryingLedger},
    metrics::MetricsCollector,
    peers::{eligible_peers, PeerDirectory, PeerSampler, StaticPeerDirectory},
    reputation::{ReputationConfig, ReputationTracker},
    transport::Transport,
    types::{Peer, PeerId},
};
use std::{collections::HashSet, sync::Arc, time::Duration};

/// Uid every fixture broker runs as.
pub const SELF_UID: u16 = 0;

/// Roster entries for `uids`, with unroutable addresses.
#[must_use]
pub fn roster(uids: &[u16]) -> Vec<Peer> {
    uids.iter().map(|uid| Peer::new(*uid, format!("127.0.0.1:{}", 10_000 + uid))).collect()
}

/// Finds a seed whose first draw of `k` peers from `roster` is exactly `wanted`, in order.
///
/// # Panics
///
/// Panics if no seed below 10 000 produces that draw.
#[must_use]
pub fn seed_drawing(roster: &[Peer], k: usize, wanted: &[u16]) -> u64 {
    let eligible = eligible_peers(roster, PeerId(SELF_UID), &HashSet::new());
    (0..10_000)
        .find(|seed| {
            let drawn: Vec<u16> =
                PeerSampler::seeded(*seed).sample(&eligible, k).iter().map(|p| p.uid.uid()).collect();
            drawn == wanted
        })
        .expect("no seed draws the wanted peers")
}

/// A broker, its collaborators and a ledger-backed committer sharing one tracker.
pub struct Fixture {
    pub broker: Arc<RequestBroker>,
    pub tracker: Arc<ReputationTracker>,
    pub directory: Arc<StaticPeerDirectory>,
    pub ledger: Arc<InMemoryLedger>,
    pub committer: Arc<WeightCommitter>,
    pub metrics: Arc<MetricsCollector>,
}

pub struct FixtureBuilder {
    roster: Vec<Peer>,
    sample_size: usize,
    peer_timeout: Duration,
    sample_floor: f64,
    seed: Option<u64>,
    transport: Arc<dyn Transport>,
}

impl FixtureBuilder {
    #[must_use]
    pub fn new(roster: Vec<Peer>, transport: Arc<dyn Transport>) -> Self {
        Self {
            roster,
            sample_size: 10,
            peer_timeout: Duration::from_millis(200),
            sample_floor: 0.0,
            seed: None,
            transport,
        }
    }

    #[must_use]
    pub fn sample_size(mut self, k: usize) -> Self {
        self.sample_size = k;
        self
    }

    #[must_use]
    pub fn peer_timeout(mut self, timeout: Duration) -> Self {
        self.peer_timeout = timeout;
        self
    }

    #[must_use]
    pub fn sample_floor(mut self, floor: f64) -> Self {
        self.sample_floor = floor;
        self
    }

    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub fn build(self) -> Fixture {
        let directory = Arc::new(StaticPeerDirectory::new(PeerId(SELF_UID), self.roster));
        let tracker = Arc::new(ReputationTracker::new(
            ReputationConfig::default(),
            &directory.peer_ids(),
        ));
        let metrics = Arc::new(MetricsCollector::new());

        let broker_config = BrokerConfig {
            sample_size: self.sample_size,
            peer_timeout_ms: u64::try_from(self.peer_timeout.as_millis()).unwrap_or(u64::MAX),
            sample_floor: self.sample_floor,
            ..BrokerConfig::default()
        };
        let mut broker = RequestBroker::new(
            broker_config,
            directory.clone(),
            self.transport,
            tracker.clone(),
            metrics.clone(),
        );
        if let Some(seed) = self.seed {
            broker = broker.with_sampler(PeerSampler::seeded(seed));
        }

        let ledger = Arc::new(InMemoryLedger::new(PeerId(SELF_UID)));
        let retrying: Arc<dyn LedgerClient> =
            Arc::new(RetryingLedger::new(ledger.clone()).with_metrics(metrics.clone()));
        let committer = Arc::new(WeightCommitter::new(
            CommitterConfig { interval_seconds: 1, ..CommitterConfig::default() },
            retrying,
            tracker.clone(),
            directory.clone(),
            metrics.clone(),
        ));

        Fixture { broker: Arc::new(broker), tracker, directory, ledger, committer, metrics }
    }
}
