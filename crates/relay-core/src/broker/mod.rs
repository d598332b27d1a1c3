//! Request brokering: sample peers, fan out, pick the earliest-sampled usable answer.
//!
//! # Selection
//!
//! All sampled peers are called concurrently. The answer returned to the caller is the
//! one from the first peer *in sample order* whose envelope came back answered, not the
//! first one to arrive. The broker therefore waits for earlier-sampled peers to resolve
//! before it can commit to a later one, and stops waiting as soon as the earliest
//! answered slot is known.
//!
//! # Bookkeeping
//!
//! Each peer call runs in its own spawned task which records the outcome in the
//! [`ReputationTracker`] before reporting back. Calls that are still in flight when the
//! broker returns keep running until they resolve or time out, so every sampled peer is
//! counted exactly once per request.

pub mod errors;

use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub use errors::BrokerError;

use crate::{
    metrics::{MetricsCollector, MetricsState},
    peers::{eligible_peers, PeerDirectory, PeerSampler},
    reputation::ReputationTracker,
    transport::{Transport, TransportError},
    types::{is_channel_supported, Peer, RelayEnvelope, SUPPORTED_CHANNELS},
};

/// Fan-out settings for the request broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Number of distinct peers contacted per request (default: 10)
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,

    /// Upper bound on each peer call in milliseconds (default: 12000)
    #[serde(default = "default_peer_timeout_ms")]
    pub peer_timeout_ms: u64,

    /// Peers scoring below this are never sampled. 0.0 disables the filter (default: 0.0)
    #[serde(default)]
    pub sample_floor: f64,

    /// Channel ids this broker accepts
    #[serde(default = "default_channels")]
    pub channels: Vec<String>,
}

fn default_sample_size() -> usize {
    10
}

fn default_peer_timeout_ms() -> u64 {
    12_000
}

fn default_channels() -> Vec<String> {
    SUPPORTED_CHANNELS.iter().map(|channel| (*channel).to_string()).collect()
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            sample_size: default_sample_size(),
            peer_timeout_ms: default_peer_timeout_ms(),
            sample_floor: 0.0,
            channels: default_channels(),
        }
    }
}

impl BrokerConfig {
    #[must_use]
    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms)
    }

    /// # Errors
    ///
    /// Returns a descriptive message for a zero sample size or timeout, a negative floor,
    /// or an empty channel list.
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_size == 0 {
            return Err("Broker sample_size must be greater than 0".to_string());
        }
        if self.peer_timeout_ms == 0 {
            return Err("Broker peer_timeout_ms must be greater than 0".to_string());
        }
        if !(self.sample_floor.is_finite() && self.sample_floor >= 0.0) {
            return Err(format!("Broker sample_floor must be >= 0, got {}", self.sample_floor));
        }
        if self.channels.is_empty() {
            return Err("Broker channel list cannot be empty".to_string());
        }
        if let Some(unknown) = self.channels.iter().find(|id| !is_channel_supported(id.as_str())) {
            return Err(format!("Broker channel list names an unknown channel: {unknown}"));
        }
        Ok(())
    }
}

/// What one sampled peer produced.
#[derive(Debug)]
pub enum PeerOutcome {
    /// The envelope carries a response or an in-band error.
    Answered(RelayEnvelope),
    /// The peer replied with neither field set.
    Empty,
    TimedOut,
    Failed(TransportError),
}

impl PeerOutcome {
    /// Whether this outcome counts as a response for reputation purposes.
    #[must_use]
    pub fn responded(&self) -> bool {
        matches!(self, Self::Answered(_))
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Answered(_) => "answered",
            Self::Empty => "empty",
            Self::TimedOut => "timeout",
            Self::Failed(e) => e.as_metric_str(),
        }
    }
}

/// Serves inbound requests by fanning them out to sampled peers.
pub struct RequestBroker {
    config: BrokerConfig,
    channels: HashSet<String>,
    directory: Arc<dyn PeerDirectory>,
    transport: Arc<dyn Transport>,
    tracker: Arc<ReputationTracker>,
    sampler: PeerSampler,
    metrics: Arc<MetricsCollector>,
}

impl RequestBroker {
    #[must_use]
    pub fn new(
        config: BrokerConfig,
        directory: Arc<dyn PeerDirectory>,
        transport: Arc<dyn Transport>,
        tracker: Arc<ReputationTracker>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let channels = config.channels.iter().cloned().collect();
        Self {
            config,
            channels,
            directory,
            transport,
            tracker,
            sampler: PeerSampler::from_entropy(),
            metrics,
        }
    }

    /// Replaces the sampler, e.g. with a seeded one for reproducible selection.
    #[must_use]
    pub fn with_sampler(mut self, sampler: PeerSampler) -> Self {
        self.sampler = sampler;
        self
    }

    #[must_use]
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    #[must_use]
    pub fn is_channel_routable(&self, channel_id: &str) -> bool {
        self.channels.contains(channel_id)
    }

    /// Serves one request and returns the selected peer's response.
    ///
    /// # Errors
    ///
    /// - [`BrokerError::InvalidRequest`] for an empty payload
    /// - [`BrokerError::UnsupportedChannel`] if the channel is not routable; no peer is
    ///   contacted
    /// - [`BrokerError::UpstreamError`] if the selected peer answered with an error
    /// - [`BrokerError::NoUsableResponse`] if no sampled peer answered
    pub async fn serve(&self, channel_id: &str, payload: &str) -> Result<String, BrokerError> {
        let started = Instant::now();
        let result = self.serve_inner(channel_id, payload).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.as_metric_str(),
        };
        self.metrics.record_request(channel_id, outcome, started.elapsed());
        result
    }

    async fn serve_inner(&self, channel_id: &str, payload: &str) -> Result<String, BrokerError> {
        if !self.is_channel_routable(channel_id) {
            return Err(BrokerError::UnsupportedChannel(channel_id.to_string()));
        }
        if payload.is_empty() {
            return Err(BrokerError::InvalidRequest("payload is empty".to_string()));
        }

        let sampled = self.sample_peers();
        if sampled.is_empty() {
            warn!(channel = channel_id, "no eligible peers to sample");
            return Err(BrokerError::NoUsableResponse);
        }

        debug!(
            channel = channel_id,
            peers = ?sampled.iter().map(|peer| peer.uid.uid()).collect::<Vec<_>>(),
            "dispatching request"
        );

        let envelope = RelayEnvelope::request(channel_id, payload);
        let selected = self.dispatch(sampled, envelope).await;

        match selected {
            Some(envelope) => match (envelope.response, envelope.error) {
                (_, Some(error)) => Err(BrokerError::UpstreamError(error)),
                (Some(response), None) => Ok(response),
                (None, None) => Err(BrokerError::NoUsableResponse),
            },
            None => Err(BrokerError::NoUsableResponse),
        }
    }

    /// Samples up to `sample_size` peers, never self and never below the score floor.
    #[must_use]
    pub fn sample_peers(&self) -> Vec<Peer> {
        let roster = self.directory.roster();
        let excluded = if self.config.sample_floor > 0.0 {
            self.tracker.peers_below(self.config.sample_floor)
        } else {
            HashSet::new()
        };
        let eligible = eligible_peers(&roster, self.directory.self_id(), &excluded);
        self.sampler.sample(&eligible, self.config.sample_size)
    }

    /// Calls every peer concurrently and returns the earliest-sampled answered envelope.
    async fn dispatch(&self, sampled: Vec<Peer>, envelope: RelayEnvelope) -> Option<RelayEnvelope> {
        let envelope = Arc::new(envelope);
        let timeout = self.config.peer_timeout();
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, PeerOutcome)>();
        let slot_count = sampled.len();

        for (slot, peer) in sampled.into_iter().enumerate() {
            let tx = tx.clone();
            let envelope = Arc::clone(&envelope);
            let transport = Arc::clone(&self.transport);
            let tracker = Arc::clone(&self.tracker);
            let metrics = Arc::clone(&self.metrics);

            tokio::spawn(async move {
                let outcome = call_peer(transport.as_ref(), &peer, &envelope, timeout).await;
                tracker.record_outcome(peer.uid, outcome.responded());
                metrics.record_peer_dispatch(outcome.label());
                if let PeerOutcome::Failed(ref e) = outcome {
                    debug!(peer = %peer.uid, error = %e, "peer call failed");
                }
                // The receiver is gone once the broker has picked an answer.
                let _ = tx.send((slot, outcome));
            });
        }
        drop(tx);

        let mut slots: Vec<Option<PeerOutcome>> = (0..slot_count).map(|_| None).collect();
        let mut next = 0;

        while let Some((slot, outcome)) = rx.recv().await {
            slots[slot] = Some(outcome);
            while next < slot_count {
                match slots[next].take() {
                    None => break,
                    Some(PeerOutcome::Answered(envelope)) => return Some(envelope),
                    Some(_) => next += 1,
                }
            }
        }

        // A dispatch task that panicked leaves its slot empty and blocks the in-order scan.
        slots.into_iter().skip(next).find_map(|outcome| match outcome {
            Some(PeerOutcome::Answered(envelope)) => Some(envelope),
            _ => None,
        })
    }
}

async fn call_peer(
    transport: &dyn Transport,
    peer: &Peer,
    envelope: &RelayEnvelope,
    timeout: Duration,
) -> PeerOutcome {
    match tokio::time::timeout(timeout, transport.send(peer, envelope, timeout)).await {
        Ok(Ok(reply)) if reply.is_answered() => PeerOutcome::Answered(reply),
        Ok(Ok(_)) => PeerOutcome::Empty,
        Ok(Err(e)) if e.is_timeout() => PeerOutcome::TimedOut,
        Ok(Err(e)) => PeerOutcome::Failed(e),
        Err(_) => PeerOutcome::TimedOut,
    }
}
