//! Network module.
//!
//! Contains the Gateway (WebSocket listener) and the per-connection task.

mod connection;
mod gateway;

pub use connection::WsConnection;
pub use gateway::Gateway;
