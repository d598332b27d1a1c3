//! Broker runtime initialization and lifecycle management.
//!
//! Wires the reputation tracker, peer directory, transport, ledger and broker together,
//! starts the background weight committer and the optional stream ingress, and
//! coordinates graceful shutdown over a broadcast channel.
//!
//! # Example
//!
//! ```no_run
//! use relay_core::{config::AppConfig, runtime::RelayRuntime};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!
//!     let runtime = RelayRuntime::builder().with_config(config).build()?;
//!
//!     let broker = runtime.broker();
//!     let reply = broker.serve("eth-mainnet", r#"{"method":"eth_blockNumber"}"#).await;
//!     println!("{reply:?}");
//!
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod components;
pub mod lifecycle;

pub use builder::{RelayRuntimeBuilder, RuntimeError};
pub use components::RelayComponents;
pub use lifecycle::RelayRuntime;
