//! Network listener configuration.

use serde::Deserialize;
use std::net::SocketAddr;

/// Listener addresses.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// WebSocket address clients attach to (e.g., "0.0.0.0:6969").
    pub websocket: SocketAddr,
    /// HTTP API address (e.g., "0.0.0.0:6970").
    pub http: SocketAddr,
    /// Allowed origins for the WebSocket handshake.
    /// Empty list allows all origins.
    #[serde(default)]
    pub allow_origins: Vec<String>,
}
