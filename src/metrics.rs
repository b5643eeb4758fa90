//! Prometheus metrics collection for eventrelay.
//!
//! Exposed in text format on the optional metrics port. Every helper is a
//! no-op until [`init`] has run, so unit tests can exercise instrumented
//! code without a registry.
//!
//! - `relay_connected_users` / `relay_live_connections` - live state gauges
//! - `relay_active_channels` - channels with at least one local subscriber
//! - `relay_message_fanout` - connections reached per channel message
//! - `relay_bridge_leader` - 1 while this process owns the bridge

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters (monotonic increasing)
// ========================================================================

/// Envelopes queued on client connections.
pub static ENVELOPES_DELIVERED: OnceLock<IntCounter> = OnceLock::new();

/// Frames that could not be queued on a connection, by reason.
pub static WRITE_FAILURES: OnceLock<IntCounterVec> = OnceLock::new();

/// Bus payloads dropped because a consumer queue was full.
pub static BUS_DROPS: OnceLock<IntCounter> = OnceLock::new();

/// Messages mirrored to the external bridge.
pub static BRIDGE_FORWARDED: OnceLock<IntCounter> = OnceLock::new();

/// Failed bridge deliveries, by error code.
pub static BRIDGE_FAILED: OnceLock<IntCounterVec> = OnceLock::new();

/// Messages accepted by the HTTP API, by route.
pub static API_MESSAGES: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Gauges (can increase/decrease)
// ========================================================================

/// Users with a live record.
pub static CONNECTED_USERS: OnceLock<IntGauge> = OnceLock::new();

/// Live client connections.
pub static LIVE_CONNECTIONS: OnceLock<IntGauge> = OnceLock::new();

/// Channels with at least one local subscriber.
pub static ACTIVE_CHANNELS: OnceLock<IntGauge> = OnceLock::new();

/// 1 while this process holds the bridge lock.
pub static BRIDGE_LEADER: OnceLock<IntGauge> = OnceLock::new();

/// Connections reached per channel message.
pub static MESSAGE_FANOUT: OnceLock<Histogram> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at startup before any metrics are recorded.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            match $init {
                Ok(m) => {
                    if let Err(e) = r.register(Box::new(m.clone())) {
                        tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                    }
                    let _ = $metric.set(m);
                }
                Err(e) => {
                    tracing::error!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                }
            }
        };
    }

    register!(ENVELOPES_DELIVERED, IntCounter::new("relay_envelopes_delivered_total", "Envelopes queued on client connections"));
    register!(WRITE_FAILURES, IntCounterVec::new(Opts::new("relay_write_failures_total", "Frames not queued on a connection"), &["reason"]));
    register!(BUS_DROPS, IntCounter::new("relay_bus_drops_total", "Bus payloads dropped on full consumer queues"));
    register!(BRIDGE_FORWARDED, IntCounter::new("relay_bridge_forwarded_total", "Messages mirrored to the bridge"));
    register!(BRIDGE_FAILED, IntCounterVec::new(Opts::new("relay_bridge_failed_total", "Failed bridge deliveries"), &["error"]));
    register!(API_MESSAGES, IntCounterVec::new(Opts::new("relay_api_messages_total", "Messages accepted by the HTTP API"), &["route"]));
    register!(CONNECTED_USERS, IntGauge::new("relay_connected_users", "Users with a live record"));
    register!(LIVE_CONNECTIONS, IntGauge::new("relay_live_connections", "Live client connections"));
    register!(ACTIVE_CHANNELS, IntGauge::new("relay_active_channels", "Channels with local subscribers"));
    register!(BRIDGE_LEADER, IntGauge::new("relay_bridge_leader", "Whether this process owns the bridge"));
    register!(MESSAGE_FANOUT, Histogram::with_opts(
        HistogramOpts::new("relay_message_fanout", "Connections reached per channel message")
            .buckets(vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0])));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Helper functions
// ============================================================================

#[inline]
pub fn record_envelopes(count: usize) {
    if let Some(c) = ENVELOPES_DELIVERED.get() {
        c.inc_by(count as u64);
    }
}

#[inline]
pub fn record_write_failure(reason: &str) {
    if let Some(c) = WRITE_FAILURES.get() {
        c.with_label_values(&[reason]).inc();
    }
}

#[inline]
pub fn record_bus_drop() {
    if let Some(c) = BUS_DROPS.get() {
        c.inc();
    }
}

/// Record message fan-out (how many connections received a channel message).
#[inline]
pub fn record_fanout(recipients: usize) {
    if let Some(h) = MESSAGE_FANOUT.get() {
        h.observe(recipients as f64);
    }
}

#[inline]
pub fn record_bridge_forwarded() {
    if let Some(c) = BRIDGE_FORWARDED.get() {
        c.inc();
    }
}

#[inline]
pub fn record_bridge_failed(error: &str) {
    if let Some(c) = BRIDGE_FAILED.get() {
        c.with_label_values(&[error]).inc();
    }
}

#[inline]
pub fn record_api_messages(route: &str, count: usize) {
    if let Some(c) = API_MESSAGES.get() {
        c.with_label_values(&[route]).inc_by(count as u64);
    }
}

#[inline]
pub fn set_connected_users(count: usize) {
    if let Some(g) = CONNECTED_USERS.get() {
        g.set(count as i64);
    }
}

#[inline]
pub fn inc_connections() {
    if let Some(g) = LIVE_CONNECTIONS.get() {
        g.inc();
    }
}

#[inline]
pub fn dec_connections() {
    if let Some(g) = LIVE_CONNECTIONS.get() {
        g.dec();
    }
}

#[inline]
pub fn set_active_channels(count: usize) {
    if let Some(g) = ACTIVE_CHANNELS.get() {
        g.set(count as i64);
    }
}

#[inline]
pub fn set_leader(leader: bool) {
    if let Some(g) = BRIDGE_LEADER.get() {
        g.set(i64::from(leader));
    }
}
