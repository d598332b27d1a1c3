//! Bounded-time request/response exchange with a single peer.

pub mod http;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::types::{Peer, RelayEnvelope};

pub use http::{HttpTransport, HttpTransportConfig, CALLER_HEADER};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error("Peer call timed out")]
    Timeout,

    #[error("Transport concurrency limit reached for {0}")]
    ConcurrencyLimit(String),

    #[error("Peer returned HTTP {0}: {1}")]
    HttpError(u16, String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Invalid envelope from peer: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// Sends one envelope to one peer.
///
/// Implementations must give up after `timeout`. An `Ok` envelope with neither response
/// nor error set is a legitimate "no answer" and is not an error.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        peer: &Peer,
        envelope: &RelayEnvelope,
        timeout: Duration,
    ) -> Result<RelayEnvelope, TransportError>;
}
