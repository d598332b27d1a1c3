use anyhow::Result;
use axum::serve;
use clap::Parser;
use relay_core::runtime::RelayRuntime;
use server::{
    logging::init_logging,
    router::{create_broker_app, BrokerAppState},
    shutdown::shutdown_signal,
    Cli,
};
use std::net::SocketAddr;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    init_logging(&config.logging);
    info!("Starting relay broker");
    debug!(
        self_uid = config.peers.self_uid,
        roster_size = config.peers.roster.len(),
        sample_size = config.broker.sample_size,
        bind_port = config.server.bind_port,
        ledger = config.ledger.endpoint.as_deref().unwrap_or("in-memory"),
        "Configuration loaded"
    );

    let runtime = RelayRuntime::builder()
        .with_config(config.clone())
        .build()
        .map_err(|e| anyhow::anyhow!("Runtime initialization failed: {e}"))?;

    let state = BrokerAppState::new(runtime.components().clone(), &config);
    let app = create_broker_app(state, &config);
    let addr = config.socket_addr().map_err(|e| anyhow::anyhow!(e))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "Relay broker listening");

    if let Err(e) = serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "Server error occurred");
    }

    runtime.shutdown().await;
    info!("Relay broker shutdown complete");

    Ok(())
}
