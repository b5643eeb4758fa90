//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: top-level `Config`, `ServerConfig`, `ApiConfig` and loading
//! - [`listen`]: WebSocket and HTTP listener addresses
//! - [`limits`]: queue capacities
//! - [`bridge`]: leader election and the external chat bridge
//! - [`validation`]: startup checks collecting every error found

mod bridge;
mod limits;
mod listen;
mod types;
pub mod validation;

pub use bridge::BridgeConfig;
pub use types::Config;
