//! HTTP layer: route handlers, OpenAPI document, and router composition.
//!
//! The router must be served with
//! `into_make_service_with_connect_info::<SocketAddr>()`: the WebSocket
//! handler reads the peer address from the accepted TCP connection.

pub mod handlers;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::error::{ErrorBody, ErrorResponse};

/// OpenAPI description of the hub's HTTP surface.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "broadcast-hub", description = "Real-time WebSocket broadcast hub"),
    paths(handlers::system::health_handler, crate::ws::handler::ws_handler),
    components(schemas(ErrorResponse, ErrorBody)),
    tags(
        (name = "System", description = "Liveness"),
        (name = "Hub", description = "WebSocket broadcast endpoint"),
    )
)]
pub struct ApiDoc;

/// Builds the complete application router with tracing and permissive
/// CORS layers.
pub fn build_router(state: AppState) -> Router {
    let router = handlers::routes();

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
