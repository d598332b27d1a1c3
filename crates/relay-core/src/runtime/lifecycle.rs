//! Runtime lifecycle: background tasks and graceful shutdown.

use crate::{
    broker::RequestBroker, config::AppConfig, ingress::StreamIngress, metrics::MetricsCollector,
    reputation::ReputationTracker,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, error, info, warn};

use super::{builder::RelayRuntimeBuilder, RelayComponents};

/// Owns the broker components and their background tasks.
///
/// `shutdown()` broadcasts on the shared channel and waits for the committer and stream
/// tasks to wind down. Requests already in flight are not cancelled.
pub struct RelayRuntime {
    components: RelayComponents,
    shutdown_tx: broadcast::Sender<()>,
    config: AppConfig,
    committer_task: Option<JoinHandle<()>>,
    ingress_task: Option<JoinHandle<()>>,
    shutdown_initiated: Arc<AtomicBool>,
}

impl RelayRuntime {
    #[must_use]
    pub fn builder() -> RelayRuntimeBuilder {
        RelayRuntimeBuilder::new()
    }

    pub(super) fn new(
        components: RelayComponents,
        shutdown_tx: broadcast::Sender<()>,
        config: AppConfig,
        enable_committer: bool,
        enable_stream_ingress: bool,
    ) -> Self {
        let shutdown_initiated = Arc::new(AtomicBool::new(false));

        let committer_task = if enable_committer && config.committer.enabled {
            let handle = components.committer().start_with_shutdown(shutdown_tx.subscribe());
            debug!(
                interval_seconds = config.committer.interval_seconds,
                "Weight committer task started"
            );
            Some(handle)
        } else {
            debug!("Weight committer disabled");
            None
        };

        let ingress_task = match (&config.ingress.stream_url, enable_stream_ingress) {
            (Some(url), true) => {
                let ingress = Arc::new(StreamIngress::new(
                    url.clone(),
                    config.ingress.reconnect_delay(),
                    components.broker().clone(),
                ));
                debug!(url = %url, "Stream ingress task started");
                Some(ingress.start_with_shutdown(shutdown_tx.subscribe()))
            }
            _ => None,
        };

        Self { components, shutdown_tx, config, committer_task, ingress_task, shutdown_initiated }
    }

    #[must_use]
    pub fn components(&self) -> &RelayComponents {
        &self.components
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn broker(&self) -> &Arc<RequestBroker> {
        self.components.broker()
    }

    #[must_use]
    pub fn tracker(&self) -> &Arc<ReputationTracker> {
        self.components.tracker()
    }

    #[must_use]
    pub fn metrics_collector(&self) -> &Arc<MetricsCollector> {
        self.components.metrics_collector()
    }

    #[must_use]
    pub fn is_committer_running(&self) -> bool {
        self.committer_task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Creates a new shutdown receiver for custom background tasks.
    #[must_use]
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Signals every background task to stop and waits for them.
    ///
    /// Idempotent: a second call only logs.
    pub async fn shutdown(self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Shutdown already initiated, ignoring duplicate call");
            return;
        }

        info!("Initiating relay runtime shutdown");
        if let Err(e) = self.shutdown_tx.send(()) {
            debug!(error = %e, "No background task was listening for shutdown");
        }

        for (name, task) in [("committer", self.committer_task), ("ingress", self.ingress_task)] {
            let Some(task) = task else { continue };
            match task.await {
                Ok(()) => debug!(task = name, "Background task completed"),
                Err(e) if e.is_cancelled() => debug!(task = name, "Background task cancelled"),
                Err(e) => error!(task = name, error = %e, "Background task failed"),
            }
        }

        info!("Relay runtime shutdown complete");
    }

    /// Waits for a shutdown broadcast, e.g. from a clone of the receiver handed to a
    /// signal handler, then performs cleanup.
    pub async fn wait_for_shutdown(self) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let _ = shutdown_rx.recv().await;
        info!("Shutdown signal received, runtime terminating");
        self.shutdown().await;
    }
}

const _: () = {
    const fn assert_send<T: Send>() {}
    const fn assert_sync<T: Sync>() {}
    let _ = assert_send::<RelayRuntime>;
    let _ = assert_sync::<RelayRuntime>;
};
