//! Integration test common infrastructure.
//!
//! Provides utilities for spawning test relays, attaching WebSocket
//! clients and calling the HTTP API.

pub mod client;
pub mod server;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use server::TestServer;
