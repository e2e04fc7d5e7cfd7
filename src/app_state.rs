//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::config::HubConfig;
use crate::domain::HubHandle;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Submission side of the hub coordinator.
    pub hub: HubHandle,
    /// Address written into the `serverIp` field of user envelopes.
    pub server_ip: Arc<str>,
    /// Capacity of each new connection's outbound queue.
    pub outbound_queue_capacity: usize,
}

impl AppState {
    /// Builds the state from a running hub and the loaded configuration.
    #[must_use]
    pub fn new(hub: HubHandle, config: &HubConfig) -> Self {
        Self {
            hub,
            server_ip: Arc::clone(&config.server_ip),
            outbound_queue_capacity: config.outbound_queue_capacity,
        }
    }
}
