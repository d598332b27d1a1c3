//! Integration tests for the relay workspace
//!
//! This crate contains the following test modules:
//!
//! - `broker_tests`: fan-out, first-valid selection and per-peer bookkeeping
//! - `committer_tests`: epoch gating, weight submission and ledger read recovery
//! - `ingress_tests`: the persistent stream ingress against a mock entrypoint
//! - `worker_tests`: broker to worker to upstream over real HTTP
//! - `runtime_tests`: runtime assembly and background task shutdown
//! - `mock_infrastructure`: reusable mocks (scripted transport, entrypoint, fixtures)
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --package tests
//! ```
//!
//! Nothing here needs network access beyond loopback.


#[cfg(test)]
mod committer_tests;

#[cfg(test)]
mod ingress_tests;

#[cfg(test)]
mod worker_tests;


/// Mock infrastructure for testing
pub mod mock_infrastructure;
