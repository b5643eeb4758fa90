//! Queue capacity configuration.

use serde::Deserialize;

/// Bounded queue sizes.
///
/// Every bus consumer and every connection owns one queue of this size.
/// A full queue drops the newest payload rather than blocking a publisher.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LimitsConfig {
    /// Payloads buffered per bus consumer (default: 1024).
    #[serde(default = "default_bus_queue")]
    pub bus_queue: usize,
    /// Frames buffered per client connection (default: 256).
    #[serde(default = "default_connection_queue")]
    pub connection_queue: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            bus_queue: default_bus_queue(),
            connection_queue: default_connection_queue(),
        }
    }
}

fn default_bus_queue() -> usize {
    1024
}

fn default_connection_queue() -> usize {
    256
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_section_keeps_other_defaults() {
        let cfg: LimitsConfig = toml::from_str("bus_queue = 8").unwrap();
        assert_eq!(cfg.bus_queue, 8);
        assert_eq!(cfg.connection_queue, 256);
    }
}
