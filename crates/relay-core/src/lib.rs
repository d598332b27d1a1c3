//! # Relay Core
//!
//! Core library for a reputation-weighted request broker.
//!
//! A broker accepts `(channel, payload)` requests, fans each one out to a random sample of
//! peer workers, returns the first usable reply, and keeps an exponentially smoothed
//! reputation score per peer. Once per ledger epoch it commits the normalized scores as
//! on-ledger weights.
//!
//! - **[`broker`]**: sampling, fan-out with per-peer timeout, first-valid selection.
//! - **[`reputation`]**: per-peer counters and EMA scores.
//! - **[`committer`]**: periodic epoch check and weight submission.
//! - **[`ledger`]**: ledger client trait, JSON-RPC and in-memory clients, reconnect-once reads.
//! - **[`peers`]**: roster directory and random peer sampling.
//! - **[`transport`]**: outbound peer calls.
//! - **[`ingress`]**: persistent websocket entrypoint and reply shaping.
//! - **[`worker`]**: worker-side forwarding to static upstream endpoints.
//! - **[`runtime`]**: wiring, background tasks and graceful shutdown.
//!
//! ## Request Flow
//!
//! ```text
//! Caller (HTTP or stream)
//!       │
//!       ▼
//! ┌──────────────┐
//! │ Channel check│ ─── unsupported ──► error, no peer contacted
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐
//! │ PeerSampler  │  k distinct peers, self excluded
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐     ┌──────────────────┐
//! │  Fan-out     │ ──► │ ReputationTracker│  every outcome, late ones too
//! │  (timeout)   │     └────────┬─────────┘
//! └──────┬───────┘              │ once per epoch
//!        ▼                      ▼
//! first usable reply     WeightCommitter ──► Ledger
//! in sample order
//! ```

pub mod broker;
pub mod committer;
pub mod config;
pub mod ingress;
pub mod ledger;
pub mod metrics;
pub mod peers;
pub mod reputation;
pub mod runtime;
pub mod transport;
pub mod types;
pub mod worker;
