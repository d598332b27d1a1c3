//! HTTP front ends for the relay broker and worker binaries.

pub mod logging;
pub mod middleware;
pub mod router;
pub mod shutdown;
pub mod worker;

use clap::Parser;
use relay_core::config::AppConfig;
use std::path::PathBuf;

/// Command-line options shared by both binaries.
#[derive(Debug, Parser)]
pub struct Cli {
    /// Path to the TOML configuration file. Falls back to `RELAY_CONFIG`, then
    /// `config/config.toml`.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Loads and validates the configuration this invocation points at.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or fails validation.
    pub fn load_config(&self) -> anyhow::Result<AppConfig> {
        let config = match &self.config {
            Some(path) => AppConfig::from_file(path),
            None => AppConfig::load(),
        }
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {e}"))?;

        config.validate().map_err(|e| anyhow::anyhow!("Configuration validation failed: {e}"))?;
        Ok(config)
    }
}
