//! Hub configuration loaded from environment variables.
//!
//! All settings come from environment variables (or a `.env` file via
//! `dotenvy`). Unset or unparsable numeric values fall back to defaults;
//! an unparsable `LISTEN_ADDR` is an error.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::HubError;
use crate::net;

/// Default bind address: all interfaces, port 8448.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8448";

/// Default capacity of each connection's outbound queue.
pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Default capacity of each coordinator intake. One keeps submissions
/// close to a hand-off, so a busy coordinator slows fast senders down.
pub const DEFAULT_INTAKE_CAPACITY: usize = 1;

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, multi-field lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Top-level hub configuration.
///
/// Loaded once at startup via [`HubConfig::from_env`].
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Socket address to bind the HTTP server to.
    pub listen_addr: SocketAddr,

    /// Maximum frames buffered per connection before it is evicted.
    pub outbound_queue_capacity: usize,

    /// Capacity of each coordinator intake channel.
    pub intake_capacity: usize,

    /// Address written into the `serverIp` field of every envelope.
    pub server_ip: Arc<str>,

    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8448)),
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
            intake_capacity: DEFAULT_INTAKE_CAPACITY,
            server_ip: Arc::from(net::FALLBACK_HOST),
            log_format: LogFormat::Pretty,
        }
    }
}

impl HubConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    /// When `SERVER_IP` is not set the host address is looked up with
    /// [`net::local_ip`].
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Config`] if `LISTEN_ADDR` is set but cannot be
    /// parsed as a [`SocketAddr`].
    pub fn from_env() -> Result<Self, HubError> {
        dotenvy::dotenv().ok();

        let raw_addr =
            std::env::var("LISTEN_ADDR").unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr: SocketAddr = raw_addr
            .parse()
            .map_err(|e| HubError::Config(format!("LISTEN_ADDR {raw_addr:?}: {e}")))?;

        let outbound_queue_capacity =
            parse_env("OUTBOUND_QUEUE_CAPACITY", DEFAULT_OUTBOUND_QUEUE_CAPACITY).max(1);
        let intake_capacity = parse_env("HUB_INTAKE_CAPACITY", DEFAULT_INTAKE_CAPACITY).max(1);

        let server_ip: Arc<str> = match std::env::var("SERVER_IP") {
            Ok(ip) if !ip.trim().is_empty() => Arc::from(ip.trim()),
            _ => Arc::from(net::local_ip()),
        };

        let log_format = parse_log_format(std::env::var("LOG_FORMAT").ok().as_deref());

        Ok(Self {
            listen_addr,
            outbound_queue_capacity,
            intake_capacity,
            server_ip,
            log_format,
        })
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Accepts `"json"` (case-insensitive); anything else is pretty.
fn parse_log_format(value: Option<&str>) -> LogFormat {
    match value {
        Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
        _ => LogFormat::Pretty,
    }
}
