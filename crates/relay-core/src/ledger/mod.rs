//! Ledger access: epoch position reads and weight submission.
//!
//! [`LedgerClient`] is the narrow interface the weight committer talks to. Two
//! implementations ship with the crate:
//!
//! - [`JsonRpcLedgerClient`] for a live ledger node reachable over JSON-RPC
//! - [`InMemoryLedger`] for tests and local development
//!
//! Either can be wrapped in [`RetryingLedger`], which applies the read policy: a failing
//! read triggers exactly one reconnect followed by exactly one retry.

pub mod json_rpc;
pub mod memory;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{info, warn};

pub use json_rpc::JsonRpcLedgerClient;
pub use memory::{InMemoryLedger, Submission};

use crate::{metrics::MetricsCollector, types::PeerId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum LedgerError {
    #[error("Ledger read failed: {0}")]
    ReadFailure(String),

    #[error("Weight submission failed: {0}")]
    SubmitFailure(String),

    #[error("Ledger connection error: {0}")]
    Connection(String),

    #[error("Invalid ledger response: {0}")]
    InvalidResponse(String),
}

/// Ledger connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint of the ledger node. Unset runs against an in-memory ledger.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Subnet the weights are committed to (default: 1)
    #[serde(default = "default_netuid")]
    pub netuid: u16,

    /// Per-call timeout in seconds (default: 12)
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_netuid() -> u16 {
    1
}

fn default_request_timeout_seconds() -> u64 {
    12
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            netuid: default_netuid(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

impl LedgerConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// # Errors
    ///
    /// Returns a descriptive message for a non-HTTP endpoint or a zero timeout.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(ref endpoint) = self.endpoint {
            if !endpoint.starts_with("http") {
                return Err(format!("Invalid ledger endpoint: {endpoint}"));
            }
        }
        if self.request_timeout_seconds == 0 {
            return Err("Ledger request timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Chain-state reads and weight submission.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn read_height(&self) -> Result<u64, LedgerError>;

    /// Epoch length in blocks.
    async fn read_tempo(&self) -> Result<u64, LedgerError>;

    /// Height of `peer`'s last weight update, `None` if it never submitted.
    async fn read_last_update(&self, peer: PeerId) -> Result<Option<u64>, LedgerError>;

    async fn submit_weights(
        &self,
        uids: &[PeerId],
        weights: &[f64],
        wait_for_inclusion: bool,
    ) -> Result<(), LedgerError>;

    /// Drops and re-establishes the underlying connection.
    async fn reconnect(&self) -> Result<(), LedgerError>;
}

/// Applies the reconnect-once policy to every read of the wrapped client.
///
/// Submissions are passed through untouched; a failed submit is retried by the next
/// commit cycle, not here.
pub struct RetryingLedger {
    inner: Arc<dyn LedgerClient>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl RetryingLedger {
    #[must_use]
    pub fn new(inner: Arc<dyn LedgerClient>) -> Self {
        Self { inner, metrics: None }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn record(&self, outcome: &'static str) {
        if let Some(ref metrics) = self.metrics {
            metrics.record_ledger_read(outcome);
        }
    }

    async fn read_with_retry<T, F>(&self, what: &'static str, op: F) -> Result<T, LedgerError>
    where
        T: Send,
        F: for<'c> Fn(&'c dyn LedgerClient) -> BoxFuture<'c, Result<T, LedgerError>> + Send + Sync,
    {
        match op(self.inner.as_ref()).await {
            Ok(value) => {
                self.record("ok");
                return Ok(value);
            }
            Err(e) => {
                warn!(read = what, error = %e, "ledger read failed, reconnecting");
            }
        }

        if let Err(e) = self.inner.reconnect().await {
            self.record("failed");
            warn!(read = what, error = %e, "ledger reconnect failed");
            return Err(LedgerError::ReadFailure(format!("{what}: {e}")));
        }
        info!(read = what, "ledger reconnected, retrying read");

        match op(self.inner.as_ref()).await {
            Ok(value) => {
                self.record("retried");
                Ok(value)
            }
            Err(e) => {
                self.record("failed");
                Err(LedgerError::ReadFailure(format!("{what}: {e}")))
            }
        }
    }
}

#[async_trait]
impl LedgerClient for RetryingLedger {
    async fn read_height(&self) -> Result<u64, LedgerError> {
        self.read_with_retry("height", |client| client.read_height()).await
    }

    async fn read_tempo(&self) -> Result<u64, LedgerError> {
        self.read_with_retry("tempo", |client| client.read_tempo()).await
    }

    async fn read_last_update(&self, peer: PeerId) -> Result<Option<u64>, LedgerError> {
        self.read_with_retry("last_update", move |client| client.read_last_update(peer)).await
    }

    async fn submit_weights(
        &self,
        uids: &[PeerId],
        weights: &[f64],
        wait_for_inclusion: bool,
    ) -> Result<(), LedgerError> {
        self.inner.submit_weights(uids, weights, wait_for_inclusion).await
    }

    async fn reconnect(&self) -> Result<(), LedgerError> {
        self.inner.reconnect().await
    }
}
