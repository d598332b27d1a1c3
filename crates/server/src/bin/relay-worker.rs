use anyhow::Result;
use axum::serve;
use clap::Parser;
use relay_core::worker::ChannelForwarder;
use server::{logging::init_logging, shutdown::shutdown_signal, worker::create_worker_app, Cli};
use std::{net::SocketAddr, sync::Arc};
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    init_logging(&config.logging);
    info!("Starting relay worker");
    debug!(
        routes = config.worker.routes.len(),
        allow_list = config.worker.allowed_uids.is_some(),
        "Configuration loaded"
    );

    let forwarder = Arc::new(
        ChannelForwarder::from_config(&config.worker)
            .map_err(|e| anyhow::anyhow!("Worker initialization failed: {e}"))?,
    );
    let app = create_worker_app(forwarder, &config);
    let addr = config.worker_socket_addr().map_err(|e| anyhow::anyhow!(e))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "Relay worker listening");

    if let Err(e) = serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "Server error occurred");
    }

    info!("Relay worker shutdown complete");
    Ok(())
}
