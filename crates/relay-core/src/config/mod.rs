//! Application configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: `Default` implementations and `#[serde(default)]` functions
//! 2. **Config file**: TOML file named by the `RELAY_CONFIG` env var
//!    (default `config/config.toml`)
//! 3. **Environment variables**: `RELAY__*` env vars override specific fields
//!
//! # Configuration Sections
//!
//! - [`ServerConfig`]: HTTP ingress bind address and concurrency
//! - [`BrokerConfig`]: sample size, per-peer timeout, score floor, channels
//! - [`ReputationConfig`]: EMA smoothing factor and initial score
//! - [`CommitterConfig`]: commit cadence
//! - [`LedgerConfig`]: ledger endpoint and subnet
//! - [`PeersConfig`]: own uid and peer roster
//! - [`IngressConfig`]: persistent stream entrypoint
//! - [`WorkerConfig`]: worker binary settings
//! - [`MetricsConfig`], [`LoggingConfig`]
//!
//! # Example
//!
//! ```toml
//! [server]
//! bind_port = 3030
//!
//! [broker]
//! sample_size = 10
//! peer_timeout_ms = 12000
//!
//! [ledger]
//! endpoint = "http://127.0.0.1:9944"
//! netuid = 1
//!
//! [peers]
//! self_uid = 0
//!
//! [[peers.roster]]
//! uid = 1
//! address = "10.0.0.1:8091"
//! ```

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

pub use crate::{
    broker::BrokerConfig, committer::CommitterConfig, ingress::IngressConfig,
    ledger::LedgerConfig, metrics::MetricsConfig, peers::PeersConfig,
    reputation::ReputationConfig, worker::WorkerConfig,
};

/// HTTP ingress server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// IP address to bind the server to. Defaults to `127.0.0.1`.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port number to listen on. Must be greater than 0. Defaults to `3030`.
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,

    /// Maximum number of concurrent inbound requests. Defaults to `100`.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Whole-request timeout in seconds. Should exceed the broker's peer timeout.
    /// Defaults to `30`.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_bind_port() -> u16 {
    3030
}

fn default_max_concurrent_requests() -> usize {
    100
}

fn default_request_timeout_seconds() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            bind_port: default_bind_port(),
            max_concurrent_requests: default_max_concurrent_requests(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

/// Application logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "trace", "debug", "info", "warn", "error"). Defaults to `"info"`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: `"json"` or `"pretty"`. Defaults to `"pretty"`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format() }
    }
}

/// Root application configuration shared by the broker and worker binaries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub broker: BrokerConfig,

    #[serde(default)]
    pub reputation: ReputationConfig,

    #[serde(default)]
    pub committer: CommitterConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub peers: PeersConfig,

    #[serde(default)]
    pub ingress: IngressConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Loads configuration from a TOML file with environment variable overrides.
    ///
    /// Environment variables with the `RELAY__` prefix override any value, using `__`
    /// between nested keys (e.g. `RELAY__BROKER__SAMPLE_SIZE=5`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let config_builder = Config::builder()
            .set_default("server.bind_address", "127.0.0.1")?
            .set_default("server.bind_port", 3030)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(Environment::with_prefix("RELAY").prefix_separator("__").separator("__"))
            .build()?;

        config_builder.try_deserialize()
    }

    /// Loads configuration from `config/config.toml`, or the path in `RELAY_CONFIG`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("RELAY_CONFIG").unwrap_or_else(|_| "config/config.toml".to_string());
        Self::from_file(&config_path)
    }

    /// Returns the parsed socket address for the broker's HTTP ingress.
    ///
    /// # Errors
    ///
    /// Returns an error string if the address cannot be parsed.
    pub fn socket_addr(&self) -> Result<std::net::SocketAddr, String> {
        format!("{}:{}", self.server.bind_address, self.server.bind_port)
            .parse()
            .map_err(|_| {
                format!(
                    "Invalid socket address: {}:{}",
                    self.server.bind_address, self.server.bind_port
                )
            })
    }

    /// Returns the parsed socket address for the worker's relay endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error string if the address cannot be parsed.
    pub fn worker_socket_addr(&self) -> Result<std::net::SocketAddr, String> {
        format!("{}:{}", self.worker.bind_address, self.worker.bind_port)
            .parse()
            .map_err(|_| {
                format!(
                    "Invalid worker socket address: {}:{}",
                    self.worker.bind_address, self.worker.bind_port
                )
            })
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_seconds)
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns the first descriptive error found.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_port == 0 {
            return Err("Bind port must be greater than 0".to_string());
        }
        if self.server.max_concurrent_requests == 0 {
            return Err("Max concurrent requests must be greater than 0".to_string());
        }
        if self.committer.interval_seconds == 0 {
            return Err("Committer interval must be greater than 0".to_string());
        }
        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("Logging format must be 'json' or 'pretty'".to_string());
        }

        self.broker.validate()?;
        self.reputation.validate()?;
        self.ledger.validate()?;
        self.peers.validate()?;
        self.ingress.validate()?;
        self.worker.validate()?;

        Ok(())
    }
}
