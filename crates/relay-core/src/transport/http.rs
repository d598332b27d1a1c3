use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use std::{sync::Arc, time::Duration};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::{Transport, TransportError};
use crate::types::{Peer, PeerId, RelayEnvelope};

/// Header carrying the caller's uid, checked by workers that restrict their callers.
pub const CALLER_HEADER: &str = "x-relay-caller";

/// Path peers serve relay envelopes on.
const RELAY_PATH: &str = "/relay";

/// Concurrency settings for outbound peer calls.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Maximum number of in-flight peer calls across all requests
    pub concurrent_limit: usize,
    /// How long a call may wait for a free slot before it counts as a timeout
    pub permit_timeout_ms: u64,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self { concurrent_limit: 512, permit_timeout_ms: 500 }
    }
}

/// Transport that POSTs the JSON envelope to `http://{address}/relay`.
///
/// Outbound calls share one semaphore so a burst of inbound requests cannot open an
/// unbounded number of peer connections.
pub struct HttpTransport {
    client: Client,
    concurrent_limit: Arc<Semaphore>,
    config: HttpTransportConfig,
    caller: Option<PeerId>,
}

/// Keeps the semaphore slot for the lifetime of one call.
struct PermitGuard {
    _permit: OwnedSemaphorePermit,
    semaphore: Arc<Semaphore>,
}

impl Drop for PermitGuard {
    fn drop(&mut self) {
        tracing::trace!(
            available_permits = self.semaphore.available_permits(),
            "transport permit released"
        );
    }
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionFailed`] if the reqwest client fails to build.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_config(HttpTransportConfig::default())
    }

    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionFailed`] if the reqwest client fails to build.
    pub fn with_config(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let client = ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(16)
            .connect_timeout(Duration::from_secs(5))
            .use_rustls_tls()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("relay-broker/", env!("CARGO_PKG_VERSION")))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "failed to build transport client");
                TransportError::ConnectionFailed(format!("HTTP client build failed: {e}"))
            })?;

        Ok(Self {
            client,
            concurrent_limit: Arc::new(Semaphore::new(config.concurrent_limit)),
            config,
            caller: None,
        })
    }

    /// Identifies outgoing calls with `uid` via [`CALLER_HEADER`].
    #[must_use]
    pub fn with_caller(mut self, uid: PeerId) -> Self {
        self.caller = Some(uid);
        self
    }

    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.concurrent_limit.available_permits()
    }

    /// Builds the relay URL for a peer address. Bare `host:port` addresses get `http://`.
    #[must_use]
    pub fn relay_url(address: &str) -> String {
        let base = address.trim_end_matches('/');
        if base.starts_with("http://") || base.starts_with("https://") {
            format!("{base}{RELAY_PATH}")
        } else {
            format!("http://{base}{RELAY_PATH}")
        }
    }

    fn sanitize_network_error(error: &reqwest::Error) -> String {
        if error.is_connect() {
            "connection refused or unreachable".to_string()
        } else if error.is_request() {
            "request failed".to_string()
        } else if error.is_body() || error.is_decode() {
            "response body error".to_string()
        } else {
            "network error".to_string()
        }
    }

    async fn acquire(&self, url: &str) -> Result<PermitGuard, TransportError> {
        let permit = tokio::time::timeout(
            Duration::from_millis(self.config.permit_timeout_ms),
            Arc::clone(&self.concurrent_limit).acquire_owned(),
        )
        .await
        .map_err(|_| {
            tracing::warn!(
                url = url,
                available_permits = self.concurrent_limit.available_permits(),
                "transport semaphore acquisition timeout"
            );
            TransportError::Timeout
        })?
        .map_err(|_| TransportError::ConcurrencyLimit(url.to_string()))?;

        Ok(PermitGuard { _permit: permit, semaphore: Arc::clone(&self.concurrent_limit) })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        peer: &Peer,
        envelope: &RelayEnvelope,
        timeout: Duration,
    ) -> Result<RelayEnvelope, TransportError> {
        let url = Self::relay_url(&peer.address);
        let _guard = self.acquire(&url).await?;

        let mut request = self.client.post(&url).json(envelope).timeout(timeout);
        if let Some(caller) = self.caller {
            request = request.header(CALLER_HEADER, caller.to_string());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::ConnectionFailed(Self::sanitize_network_error(&e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let raw_text = response.text().await.unwrap_or_default();
            let sanitized = if raw_text.len() > 256 {
                format!("{}... (truncated)", raw_text.chars().take(256).collect::<String>())
            } else {
                raw_text
            };
            tracing::trace!(peer = %peer.uid, status = status.as_u16(), "peer call failed");
            return Err(TransportError::HttpError(status.as_u16(), sanitized));
        }

        response.json::<RelayEnvelope>().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::InvalidResponse(Self::sanitize_network_error(&e))
            }
        })
    }
}
