//! Builder for the broker runtime.

use crate::{
    broker::RequestBroker,
    committer::WeightCommitter,
    config::AppConfig,
    ledger::{InMemoryLedger, JsonRpcLedgerClient, LedgerClient, RetryingLedger},
    metrics::MetricsCollector,
    peers::{PeerDirectory, PeerSampler, StaticPeerDirectory},
    reputation::ReputationTracker,
    transport::{HttpTransport, HttpTransportConfig, Transport},
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{lifecycle::RelayRuntime, RelayComponents};

/// Errors that can occur during runtime initialization.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    #[error("Failed to initialize transport: {0}")]
    Transport(String),

    #[error("Failed to initialize ledger client: {0}")]
    Ledger(String),
}

#[derive(Clone)]
struct RuntimeOptions {
    enable_committer: bool,
    enable_stream_ingress: bool,
    shutdown_channel_capacity: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self { enable_committer: true, enable_stream_ingress: true, shutdown_channel_capacity: 16 }
    }
}

/// Builder for constructing a [`RelayRuntime`].
///
/// Collaborators default to what the configuration describes: a static peer directory,
/// the HTTP transport and either the JSON-RPC ledger or, with no endpoint configured, an
/// in-memory one. Each can be swapped out before `build`.
pub struct RelayRuntimeBuilder {
    config: Option<AppConfig>,
    options: RuntimeOptions,
    directory: Option<Arc<dyn PeerDirectory>>,
    transport: Option<Arc<dyn Transport>>,
    ledger: Option<Arc<dyn LedgerClient>>,
    sampler: Option<PeerSampler>,
}

impl RelayRuntimeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: None,
            options: RuntimeOptions::default(),
            directory: None,
            transport: None,
            ledger: None,
            sampler: None,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn with_directory(mut self, directory: Arc<dyn PeerDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Uses `ledger` instead of the configured one. It is still wrapped in the retry policy.
    #[must_use]
    pub fn with_ledger(mut self, ledger: Arc<dyn LedgerClient>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    #[must_use]
    pub fn with_sampler(mut self, sampler: PeerSampler) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Keeps the committer from being scheduled regardless of `committer.enabled`.
    #[must_use]
    pub fn disable_committer(mut self) -> Self {
        self.options.enable_committer = false;
        self
    }

    #[must_use]
    pub fn disable_stream_ingress(mut self) -> Self {
        self.options.enable_stream_ingress = false;
        self
    }

    /// Sets custom shutdown channel capacity (default: 16).
    #[must_use]
    pub fn with_shutdown_channel_capacity(mut self, capacity: usize) -> Self {
        self.options.shutdown_channel_capacity = capacity;
        self
    }

    /// Builds the runtime and starts its background tasks.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] if the configuration is missing or invalid, or if the
    /// transport or ledger client cannot be built.
    pub fn build(self) -> Result<RelayRuntime, RuntimeError> {
        let config = self.config.ok_or_else(|| {
            RuntimeError::ConfigValidation("No configuration provided".to_string())
        })?;

        config.validate().map_err(RuntimeError::ConfigValidation)?;

        info!(
            self_uid = config.peers.self_uid,
            roster_size = config.peers.roster.len(),
            sample_size = config.broker.sample_size,
            committer_enabled = config.committer.enabled && self.options.enable_committer,
            "Initializing relay runtime"
        );

        let (shutdown_tx, _) = broadcast::channel::<()>(self.options.shutdown_channel_capacity);

        let metrics_collector = Arc::new(MetricsCollector::new());
        debug!("Metrics collector initialized");

        let directory: Arc<dyn PeerDirectory> = match self.directory {
            Some(directory) => directory,
            None => Arc::new(StaticPeerDirectory::from_config(&config.peers)),
        };
        let self_id = directory.self_id();

        let roster_ids = directory.peer_ids();
        let tracker = Arc::new(ReputationTracker::new(config.reputation.clone(), &roster_ids));
        debug!(peers = roster_ids.len(), "Reputation tracker initialized");

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => {
                let transport_config = HttpTransportConfig {
                    concurrent_limit: config.server.max_concurrent_requests
                        * config.broker.sample_size.max(1),
                    ..HttpTransportConfig::default()
                };
                Arc::new(
                    HttpTransport::with_config(transport_config)
                        .map_err(|e| RuntimeError::Transport(e.to_string()))?
                        .with_caller(self_id),
                )
            }
        };

        let raw_ledger: Arc<dyn LedgerClient> = match self.ledger {
            Some(ledger) => ledger,
            None if config.ledger.endpoint.is_some() => Arc::new(
                JsonRpcLedgerClient::from_config(&config.ledger)
                    .map_err(|e| RuntimeError::Ledger(e.to_string()))?,
            ),
            None => {
                warn!("No ledger endpoint configured, using an in-memory ledger");
                Arc::new(InMemoryLedger::new(self_id))
            }
        };
        let ledger: Arc<dyn LedgerClient> =
            Arc::new(RetryingLedger::new(raw_ledger).with_metrics(metrics_collector.clone()));
        debug!("Ledger client initialized");

        let mut broker = RequestBroker::new(
            config.broker.clone(),
            directory.clone(),
            transport,
            tracker.clone(),
            metrics_collector.clone(),
        );
        if let Some(sampler) = self.sampler {
            broker = broker.with_sampler(sampler);
        }
        let broker = Arc::new(broker);
        debug!("Request broker initialized");

        let committer = Arc::new(WeightCommitter::new(
            config.committer.clone(),
            ledger.clone(),
            tracker.clone(),
            directory.clone(),
            metrics_collector.clone(),
        ));

        let components = RelayComponents::new(
            metrics_collector,
            tracker,
            directory,
            ledger,
            broker,
            committer,
        );

        let runtime = RelayRuntime::new(
            components,
            shutdown_tx,
            config,
            self.options.enable_committer,
            self.options.enable_stream_ingress,
        );

        info!("Relay runtime initialization complete");

        Ok(runtime)
    }
}

impl Default for RelayRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
