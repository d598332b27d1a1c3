//! Worker-side forwarding: one request in, one upstream call out.
//!
//! The worker resolves a channel to a static upstream URL and POSTs the payload to it
//! verbatim. Every outcome is folded back into the envelope so the broker always gets an
//! answered reply.

use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{Channel, PeerId, RelayEnvelope};

/// Worker process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port the relay endpoint listens on (default: 8091)
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,

    /// Upstream URL template. `{network}` and `{api_key}` are substituted per channel.
    #[serde(default = "default_upstream_template")]
    pub upstream_template: String,

    #[serde(default)]
    pub api_key: String,

    /// Per-channel URL overrides, keyed by channel id.
    #[serde(default)]
    pub routes: HashMap<String, String>,

    /// When set, only callers announcing one of these uids are served.
    #[serde(default)]
    pub allowed_uids: Option<Vec<u16>>,

    /// Upstream call timeout in seconds (default: 30)
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_bind_port() -> u16 {
    8091
}

fn default_upstream_template() -> String {
    "https://{network}.infura.io/v3/{api_key}".to_string()
}

fn default_request_timeout_seconds() -> u64 {
    30
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            bind_port: default_bind_port(),
            upstream_template: default_upstream_template(),
            api_key: String::new(),
            routes: HashMap::new(),
            allowed_uids: None,
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

impl WorkerConfig {
    /// # Errors
    ///
    /// Returns a descriptive message for unknown route keys, non-HTTP URLs or a zero port.
    pub fn validate(&self) -> Result<(), String> {
        if self.bind_port == 0 {
            return Err("Worker bind port must be greater than 0".to_string());
        }
        if !self.upstream_template.starts_with("http") {
            return Err(format!("Invalid upstream template: {}", self.upstream_template));
        }
        for (channel_id, url) in &self.routes {
            channel_id.parse::<Channel>().map_err(|e| e.to_string())?;
            if !url.starts_with("http") {
                return Err(format!("Invalid upstream URL for {channel_id}: {url}"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForwardError {
    #[error("Unsupported channel: {0}")]
    UnsupportedChannel(String),

    #[error("upstream request failed with status {0}")]
    UpstreamStatus(u16),

    #[error("{0}")]
    Request(String),

    #[error("Invalid worker configuration: {0}")]
    Config(String),
}

/// Hostname segment a channel maps to in the upstream template.
#[must_use]
pub fn network_slug(channel: Channel) -> &'static str {
    match channel {
        Channel::EthMainnet => "mainnet",
        Channel::EthSepolia => "sepolia",
        other => other.as_str(),
    }
}

/// Static channel-to-endpoint proxy.
pub struct ChannelForwarder {
    endpoints: HashMap<Channel, String>,
    allowed: Option<Vec<PeerId>>,
    client: Client,
}

impl ChannelForwarder {
    /// # Errors
    ///
    /// Returns [`ForwardError::Config`] for an unknown route key or if the HTTP client
    /// fails to build.
    pub fn from_config(config: &WorkerConfig) -> Result<Self, ForwardError> {
        let mut endpoints: HashMap<Channel, String> = Channel::ALL
            .iter()
            .map(|channel| {
                let url = config
                    .upstream_template
                    .replace("{network}", network_slug(*channel))
                    .replace("{api_key}", &config.api_key);
                (*channel, url)
            })
            .collect();

        for (channel_id, url) in &config.routes {
            let channel =
                channel_id.parse::<Channel>().map_err(|e| ForwardError::Config(e.to_string()))?;
            endpoints.insert(channel, url.clone());
        }

        let client = ClientBuilder::new()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .use_rustls_tls()
            .build()
            .map_err(|e| ForwardError::Config(format!("HTTP client build failed: {e}")))?;

        let allowed =
            config.allowed_uids.as_ref().map(|uids| uids.iter().copied().map(PeerId).collect());

        Ok(Self { endpoints, allowed, client })
    }

    #[must_use]
    pub fn endpoint(&self, channel: Channel) -> Option<&str> {
        self.endpoints.get(&channel).map(String::as_str)
    }

    /// Whether a caller may use this worker. Without an allow list everyone may.
    #[must_use]
    pub fn is_caller_allowed(&self, caller: Option<PeerId>) -> bool {
        match (&self.allowed, caller) {
            (None, _) => true,
            (Some(allowed), Some(uid)) => allowed.contains(&uid),
            (Some(_), None) => false,
        }
    }

    /// POSTs `payload` to the channel's upstream and returns the body of a 200 reply.
    ///
    /// # Errors
    ///
    /// - [`ForwardError::UnsupportedChannel`] if the channel has no endpoint
    /// - [`ForwardError::UpstreamStatus`] for any non-200 status
    /// - [`ForwardError::Request`] if the call itself fails
    pub async fn forward(&self, channel_id: &str, payload: &str) -> Result<String, ForwardError> {
        let endpoint = channel_id
            .parse::<Channel>()
            .ok()
            .and_then(|channel| self.endpoints.get(&channel))
            .ok_or_else(|| ForwardError::UnsupportedChannel(channel_id.to_string()))?;

        let response = self
            .client
            .post(endpoint)
            .header("content-type", "application/json")
            .body(payload.to_owned())
            .send()
            .await
            .map_err(|e| {
                warn!(channel = channel_id, error = %e, "upstream call failed");
                ForwardError::Request(e.without_url().to_string())
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            debug!(channel = channel_id, status = status, "upstream returned non-200");
            return Err(ForwardError::UpstreamStatus(status));
        }

        response.text().await.map_err(|e| ForwardError::Request(e.without_url().to_string()))
    }

    /// Serves an envelope, always returning it answered with a response or an error.
    pub async fn handle(&self, envelope: RelayEnvelope) -> RelayEnvelope {
        match self.forward(&envelope.channel_id, &envelope.payload).await {
            Ok(response) => envelope.with_response(response),
            Err(e) => envelope.with_error(e.to_string()),
        }
    }
}
