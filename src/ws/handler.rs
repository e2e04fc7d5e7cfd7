//! Axum WebSocket upgrade handler.
//!
//! Any origin is accepted: no `Origin` header check is performed.

use std::net::SocketAddr;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{ConnectInfo, State};
use axum::response::Response;

use super::connection::run_connection;
use crate::app_state::AppState;
use crate::error::{ErrorResponse, HubError};

/// `GET /ws`: upgrade HTTP connection to WebSocket and join the hub.
///
/// # Errors
///
/// Returns [`HubError::HandshakeRejected`] (404) if the request is not a
/// valid WebSocket upgrade.
#[utoipa::path(
    get,
    path = "/ws",
    tag = "Hub",
    summary = "Join the broadcast hub",
    description = "Upgrades to a WebSocket. Every frame the client sends is broadcast to all other connected clients as a JSON envelope; join and leave notices are broadcast by the hub.",
    responses(
        (status = 101, description = "Switching protocols"),
        (status = 404, description = "Not a WebSocket upgrade request", body = ErrorResponse),
    )
)]
pub async fn ws_handler(
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, HubError> {
    let ws = upgrade.map_err(|rejection| {
        let reason = rejection.body_text();
        tracing::debug!(peer_addr = %peer_addr, reason = %reason, "ws handshake rejected");
        HubError::HandshakeRejected(reason)
    })?;

    Ok(ws
        .on_failed_upgrade(move |err| {
            tracing::warn!(peer_addr = %peer_addr, error = %err, "ws upgrade failed");
        })
        .on_upgrade(move |socket| run_connection(socket, peer_addr, state)))
}
