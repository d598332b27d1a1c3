//! Per-peer responsiveness accounting and EMA reputation scores.
//!
//! The tracker is the only owner of reputation state. Two operations touch it:
//!
//! - [`ReputationTracker::record_outcome`] runs after every dispatch round, once per sampled
//!   peer, and bumps that peer's lifetime counters.
//! - [`ReputationTracker::current_weights`] runs once per commit cycle. It recomputes each
//!   peer's lifetime response ratio, folds it into the moving average, and returns the
//!   normalized weight vector.
//!
//! The EMA therefore smooths across commit cycles, not across individual requests.
//!
//! ```text
//! ratio[p]  = responses / requests            (1.0 when requests == 0)
//! score[p]  = (1 - alpha) * score[p] + alpha * ratio[p]
//! weight[p] = score[p] / sum(score)
//! ```

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

use crate::types::PeerId;

/// Configuration for the reputation tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationConfig {
    /// EMA smoothing factor, exclusive range (0.0, 1.0) (default: 0.1)
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// Score assigned to every roster peer at startup and to peers first seen on a
    /// roster refresh (default: 1.0)
    #[serde(default = "default_initial_score")]
    pub initial_score: f64,
}

fn default_alpha() -> f64 {
    0.1
}

fn default_initial_score() -> f64 {
    1.0
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self { alpha: default_alpha(), initial_score: default_initial_score() }
    }
}

impl ReputationConfig {
    /// # Errors
    ///
    /// Returns a descriptive message if `alpha` is outside (0, 1) or the initial score is
    /// not a positive finite number.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(format!("Reputation alpha must be in (0, 1), got {}", self.alpha));
        }
        if !(self.initial_score.is_finite() && self.initial_score > 0.0) {
            return Err(format!(
                "Reputation initial_score must be positive, got {}",
                self.initial_score
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReputationError {
    /// No peers are known; a weight vector cannot be formed.
    #[error("Roster is empty")]
    EmptyRoster,
}

/// Lifetime request counters for one peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub last_request_time: Option<DateTime<Utc>>,
    pub total_requests: u64,
    pub total_responses: u64,
}

impl PeerRecord {
    /// Responses over requests, or 1.0 for a peer that was never asked.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn response_ratio(&self) -> f64 {
        if self.total_requests == 0 {
            1.0
        } else {
            self.total_responses as f64 / self.total_requests as f64
        }
    }
}

/// Normalized weights over a roster snapshot, in roster order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightVector {
    pub uids: Vec<PeerId>,
    pub weights: Vec<f64>,
}

impl WeightVector {
    #[must_use]
    pub fn len(&self) -> usize {
        self.uids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.uids.is_empty()
    }

    #[must_use]
    pub fn sum(&self) -> f64 {
        self.weights.iter().sum()
    }

    #[must_use]
    pub fn weight_of(&self, peer: PeerId) -> Option<f64> {
        self.uids.iter().position(|uid| *uid == peer).map(|idx| self.weights[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = (PeerId, f64)> + '_ {
        self.uids.iter().copied().zip(self.weights.iter().copied())
    }
}

/// Read-only view of one peer's reputation, as served on `GET /weights`.
#[derive(Debug, Clone, Serialize)]
pub struct PeerStanding {
    pub uid: PeerId,
    pub score: f64,
    #[serde(flatten)]
    pub record: PeerRecord,
}

#[derive(Debug, Default)]
struct ScoreBook {
    roster: Vec<PeerId>,
    scores: HashMap<PeerId, f64>,
}

/// Owns per-peer counters and the EMA score vector.
///
/// # Concurrency
///
/// Counters live in a `DashMap`; each update runs under the shard lock of its entry, so
/// concurrent updates to the same peer never lose an increment and the default record is
/// created exactly once. The score book sits behind a separate mutex so the full-vector
/// EMA pass is atomic without ever blocking counter updates for longer than one read.
pub struct ReputationTracker {
    config: ReputationConfig,
    records: DashMap<PeerId, PeerRecord>,
    book: Mutex<ScoreBook>,
}

impl ReputationTracker {
    /// Creates a tracker with every roster peer seeded at the initial score.
    #[must_use]
    pub fn new(config: ReputationConfig, roster: &[PeerId]) -> Self {
        let tracker = Self { config, records: DashMap::new(), book: Mutex::new(ScoreBook::default()) };
        tracker.sync_roster(roster);
        tracker
    }

    #[must_use]
    pub fn config(&self) -> &ReputationConfig {
        &self.config
    }

    /// Records one dispatch outcome for `peer`.
    ///
    /// Creates the peer's record on first use. `responded` means the peer returned a
    /// non-empty envelope, whether it carried a response or an in-band error.
    pub fn record_outcome(&self, peer: PeerId, responded: bool) {
        self.record_outcome_at(peer, responded, Utc::now());
    }

    /// Same as [`record_outcome`](Self::record_outcome) with an explicit timestamp.
    pub fn record_outcome_at(&self, peer: PeerId, responded: bool, at: DateTime<Utc>) {
        let mut record = self.records.entry(peer).or_default();
        record.total_requests += 1;
        record.last_request_time = Some(at);
        if responded {
            record.total_responses += 1;
        }
    }

    /// Advances every roster peer's EMA by one step and returns the normalized vector.
    ///
    /// # Errors
    ///
    /// Returns [`ReputationError::EmptyRoster`] when no peers are known.
    pub fn current_weights(&self) -> Result<WeightVector, ReputationError> {
        let mut book = self.book.lock();
        if book.roster.is_empty() {
            return Err(ReputationError::EmptyRoster);
        }

        let alpha = self.config.alpha;
        let initial = self.config.initial_score;
        let roster = book.roster.clone();
        let mut raw = Vec::with_capacity(roster.len());

        for uid in &roster {
            let ratio = self.records.get(uid).map_or(1.0, |record| record.response_ratio());
            let score = book.scores.entry(*uid).or_insert(initial);
            *score = ((1.0 - alpha) * *score + alpha * ratio).max(f64::MIN_POSITIVE);
            raw.push(*score);
        }

        let total: f64 = raw.iter().sum();
        let weights = raw.iter().map(|score| score / total).collect();

        debug!(peers = roster.len(), total_score = total, "advanced reputation scores");

        Ok(WeightVector { uids: roster, weights })
    }

    /// Replaces the roster snapshot. Peers seen for the first time start at the initial
    /// score; existing scores and counters are kept, including for peers that left.
    pub fn sync_roster(&self, roster: &[PeerId]) {
        let mut book = self.book.lock();
        let initial = self.config.initial_score;
        for uid in roster {
            book.scores.entry(*uid).or_insert(initial);
        }
        book.roster = roster.to_vec();
    }

    /// The roster snapshot the next weight vector will cover.
    #[must_use]
    pub fn roster(&self) -> Vec<PeerId> {
        self.book.lock().roster.clone()
    }

    #[must_use]
    pub fn score(&self, peer: PeerId) -> Option<f64> {
        self.book.lock().scores.get(&peer).copied()
    }

    #[must_use]
    pub fn record(&self, peer: PeerId) -> Option<PeerRecord> {
        self.records.get(&peer).map(|record| record.clone())
    }

    /// Peers whose current score is strictly below `floor`.
    #[must_use]
    pub fn peers_below(&self, floor: f64) -> HashSet<PeerId> {
        self.book
            .lock()
            .scores
            .iter()
            .filter(|(_, score)| **score < floor)
            .map(|(uid, _)| *uid)
            .collect()
    }

    /// Scores and counters for the roster, without advancing the EMA.
    #[must_use]
    pub fn standings(&self) -> Vec<PeerStanding> {
        let book = self.book.lock();
        book.roster
            .iter()
            .map(|uid| PeerStanding {
                uid: *uid,
                score: book.scores.get(uid).copied().unwrap_or(self.config.initial_score),
                record: self.record(*uid).unwrap_or_default(),
            })
            .collect()
    }
}
