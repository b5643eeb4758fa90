//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.name is required")]
    MissingServerName,
    #[error("listen.websocket and listen.http must differ, both are {0}")]
    ListenerConflict(std::net::SocketAddr),
    #[error("api.key must not be empty when set")]
    EmptyApiKey,
    #[error("limits.{0} must be greater than zero")]
    ZeroQueue(&'static str),
    #[error("election.lock_name is required")]
    MissingLockName,
    #[error("election.retry_interval_secs must be greater than zero")]
    ZeroRetryInterval,
    #[error("bridge.url must be an http(s) URL, got '{0}'")]
    InvalidBridgeUrl(String),
    #[error("bridge.{0} has an empty channel mapping for '{1}'")]
    EmptyChannelMapping(&'static str, String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.is_empty() {
        errors.push(ValidationError::MissingServerName);
    }
    if config.listen.websocket == config.listen.http {
        errors.push(ValidationError::ListenerConflict(config.listen.websocket));
    }
    if config.api.key.as_deref().is_some_and(str::is_empty) {
        errors.push(ValidationError::EmptyApiKey);
    }

    if config.limits.bus_queue == 0 {
        errors.push(ValidationError::ZeroQueue("bus_queue"));
    }
    if config.limits.connection_queue == 0 {
        errors.push(ValidationError::ZeroQueue("connection_queue"));
    }

    if config.election.lock_name.is_empty() {
        errors.push(ValidationError::MissingLockName);
    }
    if config.election.retry_interval_secs == 0 {
        errors.push(ValidationError::ZeroRetryInterval);
    }

    let bridge = &config.bridge;
    if let Some(url) = &bridge.url
        && !(url.starts_with("http://") || url.starts_with("https://"))
    {
        errors.push(ValidationError::InvalidBridgeUrl(url.clone()));
    }
    for (section, map) in [("outgoing", &bridge.outgoing), ("incoming", &bridge.incoming)] {
        for (from, to) in map {
            if from.is_empty() || to.is_empty() {
                errors.push(ValidationError::EmptyChannelMapping(section, from.clone()));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_valid_config() -> String {
        r#"
[server]
name = "relay-test"

[listen]
websocket = "127.0.0.1:6969"
http = "127.0.0.1:6970"
"#
        .to_string()
    }

    #[test]
    fn test_valid_config_passes() {
        let config: Config = toml::from_str(&minimal_valid_config()).unwrap();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let toml = r#"
[server]
name = ""

[listen]
websocket = "127.0.0.1:6969"
http = "127.0.0.1:6969"

[limits]
bus_queue = 0

[election]
retry_interval_secs = 0
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| matches!(e, ValidationError::MissingServerName)));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::ListenerConflict(_))));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::ZeroQueue("bus_queue"))));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::ZeroRetryInterval)));
    }

    #[test]
    fn test_bad_bridge_url_fails() {
        let toml = format!(
            "{}\n[bridge]\nenabled = true\nurl = \"ftp://example.com\"\n[bridge.outgoing]\ngeneral = \"\"\n",
            minimal_valid_config()
        );
        let config: Config = toml::from_str(&toml).unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidBridgeUrl(_))));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::EmptyChannelMapping("outgoing", _))));
    }
}
