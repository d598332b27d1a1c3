//! # Metrics
//!
//! Prometheus counters, gauges and histograms for the broker, recorded through the
//! `metrics` facade. Every record call is a lock-free atomic update; the exporter
//! handle renders the text exposition format for `GET /metrics`.
//!
//! | Metric | Kind | Labels |
//! |--------|------|--------|
//! | `relay_requests_total` | counter | `channel`, `outcome` |
//! | `relay_request_duration_seconds` | histogram | `channel` |
//! | `relay_peer_dispatch_total` | counter | `outcome` |
//! | `relay_commits_total` | counter | `outcome` |
//! | `relay_ledger_reads_total` | counter | `outcome` |
//! | `relay_peer_score` | gauge | `peer` |
//! | `relay_epoch_distance` | gauge | |

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, sync::OnceLock, time::Duration};

use crate::{
    broker::BrokerError, ledger::LedgerError, transport::TransportError, types::Channel,
};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether `GET /metrics` is served. Defaults to `true`.
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: default_metrics_enabled() }
    }
}

/// Maps an error to a bounded label value.
pub trait MetricsState {
    fn as_metric_str(&self) -> &'static str;
}

impl MetricsState for BrokerError {
    fn as_metric_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::UnsupportedChannel(_) => "unsupported_channel",
            Self::UpstreamError(_) => "upstream_error",
            Self::NoUsableResponse => "no_usable_response",
        }
    }
}

impl MetricsState for TransportError {
    fn as_metric_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConcurrencyLimit(_) => "concurrency_limit",
            Self::HttpError(_, _) => "http_error",
            Self::ConnectionFailed(_) => "connection_failed",
            Self::InvalidResponse(_) => "invalid_response",
        }
    }
}

impl MetricsState for LedgerError {
    fn as_metric_str(&self) -> &'static str {
        match self {
            Self::ReadFailure(_) => "read_failure",
            Self::SubmitFailure(_) => "submit_failure",
            Self::Connection(_) => "connection",
            Self::InvalidResponse(_) => "invalid_response",
        }
    }
}

#[inline]
fn channel_to_static(channel_id: &str) -> Cow<'static, str> {
    match channel_id.parse::<Channel>() {
        Ok(channel) => Cow::Borrowed(channel.as_str()),
        Err(_) => Cow::Owned(channel_id.to_string()),
    }
}

fn init_prometheus_recorder() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Using fallback Prometheus recorder - metrics may not be globally visible"
                );
                PrometheusBuilder::new().build_recorder().handle()
            }
        })
        .clone()
}

/// Process-wide metrics sink shared by the broker, committer and HTTP surfaces.
#[derive(Clone)]
pub struct MetricsCollector {
    prometheus_handle: PrometheusHandle,
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self { prometheus_handle: init_prometheus_recorder() }
    }

    /// Record one inbound request and how it ended (`ok` or an error label).
    pub fn record_request(&self, channel_id: &str, outcome: &'static str, elapsed: Duration) {
        let channel = channel_to_static(channel_id);
        counter!("relay_requests_total", "channel" => channel.clone(), "outcome" => outcome)
            .increment(1);
        histogram!("relay_request_duration_seconds", "channel" => channel)
            .record(elapsed.as_secs_f64());
    }

    /// Record a single peer call outcome: `answered`, `empty`, `timeout` or a transport
    /// error label.
    pub fn record_peer_dispatch(&self, outcome: &'static str) {
        counter!("relay_peer_dispatch_total", "outcome" => outcome).increment(1);
    }

    pub fn record_commit(&self, outcome: &'static str) {
        counter!("relay_commits_total", "outcome" => outcome).increment(1);
    }

    pub fn record_ledger_read(&self, outcome: &'static str) {
        counter!("relay_ledger_reads_total", "outcome" => outcome).increment(1);
    }

    pub fn record_peer_score(&self, peer: &str, score: f64) {
        gauge!("relay_peer_score", "peer" => peer.to_string()).set(score);
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn record_epoch_distance(&self, distance: u64) {
        gauge!("relay_epoch_distance").set(distance as f64);
    }

    /// Renders all recorded metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.prometheus_handle.render()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
