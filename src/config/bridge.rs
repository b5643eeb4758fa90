//! Leader election and external chat bridge configuration.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Bridge leadership election.
#[derive(Debug, Clone, Deserialize)]
pub struct ElectionConfig {
    /// Cluster-wide lock guarding bridge ownership.
    #[serde(default = "default_lock_name")]
    pub lock_name: String,
    /// Seconds between acquisition attempts while a follower (default: 60).
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,
}

impl ElectionConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            lock_name: default_lock_name(),
            retry_interval_secs: default_retry_interval_secs(),
        }
    }
}

fn default_lock_name() -> String {
    "eventrelay.bridge.leader".to_string()
}

fn default_retry_interval_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    10
}

/// Slack-style webhook bridge.
///
/// ```toml
/// [bridge]
/// enabled = true
/// url = "https://hooks.slack.com/services/T000/B000/XXXX"
/// username = "relay"
/// token = "incoming-secret"
///
/// [bridge.outgoing]   # relay channel -> external channel
/// general = "#general"
///
/// [bridge.incoming]   # external channel -> relay channel
/// general = "general"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Webhook URL messages are posted to.
    pub url: Option<String>,
    /// Bot username shown on mirrored messages.
    pub username: Option<String>,
    /// Shared token expected on inbound posts.
    pub token: Option<String>,
    #[serde(default)]
    pub outgoing: BTreeMap<String, String>,
    #[serde(default)]
    pub incoming: BTreeMap<String, String>,
    /// Webhook request timeout in seconds (default: 10).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            username: None,
            token: None,
            outgoing: BTreeMap::new(),
            incoming: BTreeMap::new(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}
