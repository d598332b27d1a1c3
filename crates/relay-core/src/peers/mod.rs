//! Peer roster resolution and random sampling.
//!
//! [`PeerDirectory`] is the broker's view of who it can talk to. The roster snapshot only
//! changes on [`PeerDirectory::refresh`], which the weight committer calls after each
//! successful commit, so the set of peers is stable within an epoch.

use arc_swap::ArcSwap;
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, sync::Arc};
use thiserror::Error;
use tracing::info;

use crate::types::{Peer, PeerId};

/// Roster configuration: the broker's own uid and the known peers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeersConfig {
    /// Uid this node is registered under. Never sampled.
    #[serde(default)]
    pub self_uid: u16,

    #[serde(default)]
    pub roster: Vec<Peer>,
}

impl PeersConfig {
    /// # Errors
    ///
    /// Returns a descriptive message on duplicate uids or empty addresses.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for peer in &self.roster {
            if !seen.insert(peer.uid) {
                return Err(format!("Duplicate peer uid in roster: {}", peer.uid));
            }
            if peer.address.trim().is_empty() {
                return Err(format!("Empty address for peer {}", peer.uid));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Roster refresh failed: {0}")]
    RefreshFailed(String),
}

/// Source of the broker's identity and the peer roster.
#[async_trait]
pub trait PeerDirectory: Send + Sync {
    fn self_id(&self) -> PeerId;

    /// Current roster snapshot in uid index order.
    fn roster(&self) -> Arc<Vec<Peer>>;

    /// Re-reads the roster source and publishes the result as the current snapshot.
    async fn refresh(&self) -> Result<Arc<Vec<Peer>>, DirectoryError>;

    fn peer_ids(&self) -> Vec<PeerId> {
        self.roster().iter().map(|peer| peer.uid).collect()
    }

    fn lookup(&self, uid: PeerId) -> Option<Peer> {
        self.roster().iter().find(|peer| peer.uid == uid).cloned()
    }
}

/// Directory backed by a configured roster.
///
/// [`replace_roster`](Self::replace_roster) stages a new roster; it becomes visible on the
/// next [`refresh`](PeerDirectory::refresh).
pub struct StaticPeerDirectory {
    self_id: PeerId,
    current: ArcSwap<Vec<Peer>>,
    staged: ArcSwap<Vec<Peer>>,
}

impl StaticPeerDirectory {
    #[must_use]
    pub fn new(self_id: PeerId, roster: Vec<Peer>) -> Self {
        let roster = Arc::new(sorted(roster));
        Self {
            self_id,
            current: ArcSwap::new(Arc::clone(&roster)),
            staged: ArcSwap::new(roster),
        }
    }

    #[must_use]
    pub fn from_config(config: &PeersConfig) -> Self {
        Self::new(PeerId(config.self_uid), config.roster.clone())
    }

    /// Stages a roster to be adopted on the next refresh.
    pub fn replace_roster(&self, roster: Vec<Peer>) {
        self.staged.store(Arc::new(sorted(roster)));
    }
}

fn sorted(mut roster: Vec<Peer>) -> Vec<Peer> {
    roster.sort_by_key(|peer| peer.uid);
    roster
}

#[async_trait]
impl PeerDirectory for StaticPeerDirectory {
    fn self_id(&self) -> PeerId {
        self.self_id
    }

    fn roster(&self) -> Arc<Vec<Peer>> {
        self.current.load_full()
    }

    async fn refresh(&self) -> Result<Arc<Vec<Peer>>, DirectoryError> {
        let next = self.staged.load_full();
        let previous = self.current.swap(Arc::clone(&next));
        if previous.len() != next.len() {
            info!(previous = previous.len(), current = next.len(), "peer roster changed size");
        }
        Ok(next)
    }
}

/// Uniform random selection of distinct peers.
///
/// Holds its own RNG so a seeded sampler produces a reproducible sequence of samples.
pub struct PeerSampler {
    rng: Mutex<StdRng>,
}

impl PeerSampler {
    #[must_use]
    pub fn from_entropy() -> Self {
        Self { rng: Mutex::new(StdRng::from_os_rng()) }
    }

    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self { rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }

    /// Picks `min(k, candidates.len())` distinct peers, returned in sample order.
    #[must_use]
    pub fn sample(&self, candidates: &[Peer], k: usize) -> Vec<Peer> {
        let amount = k.min(candidates.len());
        if amount == 0 {
            return Vec::new();
        }
        let mut rng = self.rng.lock();
        rand::seq::index::sample(&mut *rng, candidates.len(), amount)
            .into_iter()
            .map(|idx| candidates[idx].clone())
            .collect()
    }
}

impl Default for PeerSampler {
    fn default() -> Self {
        Self::from_entropy()
    }
}

/// Roster entries eligible for sampling: everyone except `self_id` and `excluded`.
#[must_use]
pub fn eligible_peers(roster: &[Peer], self_id: PeerId, excluded: &HashSet<PeerId>) -> Vec<Peer> {
    roster
        .iter()
        .filter(|peer| peer.uid != self_id && !excluded.contains(&peer.uid))
        .cloned()
        .collect()
}
