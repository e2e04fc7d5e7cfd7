//! HTTP endpoint handlers.

pub mod system;

use axum::Router;
use axum::routing::get;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// Composes the hub's HTTP routes: `/health` and `/ws`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(system::routes())
        .route("/ws", get(ws_handler))
}
