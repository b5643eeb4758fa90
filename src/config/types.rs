//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use super::bridge::{BridgeConfig, ElectionConfig};
use super::limits::LimitsConfig;
use super::listen::ListenConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Instance identity.
    pub server: ServerConfig,
    /// Listener addresses.
    pub listen: ListenConfig,
    /// HTTP API authentication.
    #[serde(default)]
    pub api: ApiConfig,
    /// Queue capacities.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Bridge leadership election.
    #[serde(default)]
    pub election: ElectionConfig,
    /// External chat bridge.
    #[serde(default)]
    pub bridge: BridgeConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Instance identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Instance name, used in logs (e.g., "relay-1").
    pub name: String,
    /// Prometheus metrics HTTP port. Disabled when absent or 0.
    pub metrics_port: Option<u16>,
}

/// HTTP API configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    /// Bearer key for `/send` and `/updateUsers`.
    /// The API routes are not mounted without one.
    pub key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
[server]
name = "relay-test"

[listen]
websocket = "127.0.0.1:6969"
http = "127.0.0.1:6970"
"#;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.server.name, "relay-test");
        assert!(config.server.metrics_port.is_none());
        assert!(config.api.key.is_none());
        assert_eq!(config.limits, LimitsConfig::default());
        assert_eq!(config.election.lock_name, "eventrelay.bridge.leader");
        assert_eq!(config.election.retry_interval_secs, 60);
        assert!(!config.bridge.enabled);
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.listen.websocket.port(), 6969);
    }

    #[test]
    fn load_reports_missing_file_and_bad_toml() {
        assert!(matches!(
            Config::load("/nonexistent/relay.toml"),
            Err(ConfigError::Io(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[server\nname=").unwrap();
        assert!(matches!(Config::load(file.path()), Err(ConfigError::Parse(_))));
    }
}
