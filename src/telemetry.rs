//! Standardized span constructors for relay observability.

use tracing::{Span, info_span};

/// Span for one client connection.
pub fn connection(user_id: &str, peer: &str) -> Span {
    info_span!("connection", user = %user_id, peer = %peer)
}

/// Span for one HTTP API request.
pub fn api_request(route: &'static str, items: usize) -> Span {
    info_span!("api", route, items)
}

/// Span for an inbound bridge post.
pub fn bridge_incoming(external_channel: Option<&str>) -> Span {
    match external_channel {
        Some(channel) => info_span!("bridge_incoming", external = %channel),
        None => info_span!("bridge_incoming"),
    }
}
