//! External chat bridge.
//!
//! The relay core only sees [`BridgeAdapter`]. Outgoing delivery is driven
//! by the elected leader; incoming posts are translated at the HTTP edge.

mod slack;

pub use slack::{IncomingForm, SlackBridge};

use async_trait::async_trait;
use relay_proto::ChatMessage;

use crate::error::BridgeError;

/// Outcome of one outgoing delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Not forwarded: no text, loop-marked, or channel not mirrored.
    Skipped,
}

/// Adapter between relay channels and a third-party chat service.
#[async_trait]
pub trait BridgeAdapter: Send + Sync {
    /// Whether outgoing mirroring is configured.
    fn can_send_outgoing(&self) -> bool;

    /// Whether inbound webhook posts are accepted.
    fn can_receive_incoming(&self) -> bool;

    /// Relay channels mirrored outwards.
    fn outgoing_channels(&self) -> Vec<String>;

    /// Forward one channel message.
    async fn deliver_outgoing(
        &self,
        channel: &str,
        message: &ChatMessage,
    ) -> Result<Delivery, BridgeError>;
}
