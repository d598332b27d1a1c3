//! Inbound request handling shared by the stream and HTTP entrypoints.

pub mod stream;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub use stream::StreamIngress;

use crate::{
    broker::{BrokerError, RequestBroker},
    types::{RelayReply, RelayRequest},
};

/// Reply text for failures the caller should not see details of.
pub const INTERNAL_ERROR: &str = "Internal error";

/// Persistent-stream entrypoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressConfig {
    /// Websocket URL of the entrypoint that pushes requests. Unset disables the stream.
    #[serde(default)]
    pub stream_url: Option<String>,

    /// Seconds to wait before reconnecting after the stream drops (default: 10)
    #[serde(default = "default_reconnect_delay_seconds")]
    pub reconnect_delay_seconds: u64,
}

fn default_reconnect_delay_seconds() -> u64 {
    10
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self { stream_url: None, reconnect_delay_seconds: default_reconnect_delay_seconds() }
    }
}

impl IngressConfig {
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_seconds)
    }

    /// # Errors
    ///
    /// Returns a descriptive message if the stream URL is not a websocket URL.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(ref url) = self.stream_url {
            if !url.starts_with("ws://") && !url.starts_with("wss://") {
                return Err(format!("Invalid ingress stream URL: {url}"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum IngressError {
    #[error("Stream connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Stream error: {0}")]
    Stream(String),
}

/// Maps a broker result onto the caller-facing reply.
///
/// In-band upstream errors and unsupported channels are passed through; everything else
/// collapses to [`INTERNAL_ERROR`].
#[must_use]
pub fn reply_for(result: Result<String, BrokerError>) -> RelayReply {
    match result {
        Ok(response) => RelayReply::Response(response),
        Err(BrokerError::UpstreamError(error)) => RelayReply::Error(error),
        Err(e @ (BrokerError::UnsupportedChannel(_) | BrokerError::InvalidRequest(_))) => {
            RelayReply::Error(e.to_string())
        }
        Err(BrokerError::NoUsableResponse) => RelayReply::Error(INTERNAL_ERROR.to_string()),
    }
}

/// Serves one stream frame and renders the text to send back.
///
/// A response goes back as the raw response text; an error as `{"error": ...}`.
pub async fn handle_frame(broker: &RequestBroker, frame: &str) -> String {
    let reply = match serde_json::from_str::<RelayRequest>(frame) {
        Ok(request) => reply_for(broker.serve(&request.channel_id, &request.payload).await),
        Err(e) => {
            tracing::debug!(error = %e, "rejecting malformed stream frame");
            RelayReply::Error(format!("Invalid request: {e}"))
        }
    };

    match reply {
        RelayReply::Response(text) => text,
        error @ RelayReply::Error(_) => serde_json::to_string(&error)
            .unwrap_or_else(|_| format!(r#"{{"error":"{INTERNAL_ERROR}"}}"#)),
    }
}
