//! broadcast-hub server entry point.
//!
//! Starts the hub coordinator and the Axum HTTP server with the health and
//! WebSocket endpoints.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use broadcast_hub::api;
use broadcast_hub::app_state::AppState;
use broadcast_hub::config::{HubConfig, LogFormat};
use broadcast_hub::domain::Coordinator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = HubConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(
        addr = %config.listen_addr,
        server_ip = %config.server_ip,
        "starting broadcast-hub"
    );

    // Start the coordinator; it runs for the lifetime of the process.
    let (coordinator, hub) =
        Coordinator::new(Arc::clone(&config.server_ip), config.intake_capacity);
    let _coordinator = coordinator.spawn();

    // Build router
    let app = api::build_router(AppState::new(hub, &config));

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
