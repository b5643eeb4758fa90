//! Message fan-out from bus consumers to live connections.
//!
//! Each envelope is serialized once per delivery and the same `Bytes` is
//! queued on every target connection. No lock is held while writing.

use async_trait::async_trait;
use bytes::Bytes;
use relay_proto::{ChatEnvelope, ChatMessage};
use std::sync::{Arc, Weak};
use tracing::{trace, warn};

use crate::bus::{BusHandler, Payload};
use crate::state::{ChannelTable, User, UserRegistry};

/// Routes chat messages to the connections of interested users.
#[derive(Clone)]
pub struct MessageRouter {
    registry: Weak<UserRegistry>,
    channels: Arc<ChannelTable>,
}

impl MessageRouter {
    pub fn new(registry: Weak<UserRegistry>, channels: Arc<ChannelTable>) -> Self {
        Self { registry, channels }
    }

    /// Deliver a channel message to every connection of every subscriber.
    ///
    /// Subscribers without a live record are skipped. Returns the number of
    /// frames queued.
    pub fn deliver_channel(&self, channel: &str, message: &ChatMessage) -> usize {
        let Some(registry) = self.registry.upgrade() else {
            return 0;
        };
        let subscribers = self.channels.subscribers_of(channel);
        if subscribers.is_empty() {
            return 0;
        }
        let Some(frame) = encode(message) else {
            return 0;
        };

        let delivered: usize = subscribers
            .iter()
            .filter_map(|user_id| registry.get(user_id))
            .map(|user| write_all(&user, &frame))
            .sum();

        crate::metrics::record_fanout(delivered);
        trace!(%channel, subscribers = subscribers.len(), delivered, "Channel fan-out");
        delivered
    }

    /// Deliver a direct payload to every connection of `user_id`.
    ///
    /// Dropped silently if the user has no live record.
    pub fn deliver_direct(&self, user_id: &str, payload: &Payload) -> usize {
        let Some(user) = self.registry.upgrade().and_then(|r| r.get(user_id)) else {
            trace!(user = %user_id, "Direct message for unknown user dropped");
            return 0;
        };
        let frame = match payload {
            Payload::Chat(message) => match encode(message) {
                Some(frame) => frame,
                None => return 0,
            },
            Payload::Raw(bytes) => bytes.clone(),
            Payload::Channels(_) => {
                warn!(user = %user_id, "Channel list on private address ignored");
                return 0;
            }
        };
        write_all(&user, &frame)
    }
}

fn encode(message: &ChatMessage) -> Option<Bytes> {
    match ChatEnvelope::for_message(message).to_bytes() {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!(error = %e, "Failed to encode envelope");
            None
        }
    }
}

/// Queue `frame` on every live connection of `user`.
fn write_all(user: &User, frame: &Bytes) -> usize {
    let delivered = user
        .connections()
        .iter()
        .filter(|conn| conn.write(frame.clone()))
        .count();
    crate::metrics::record_envelopes(delivered);
    delivered
}

/// Consumer on `channel.<name>` feeding channel fan-out.
pub struct ChannelDelivery {
    channel: String,
    router: MessageRouter,
}

impl ChannelDelivery {
    pub fn new(channel: &str, router: MessageRouter) -> Self {
        Self {
            channel: channel.to_string(),
            router,
        }
    }
}

#[async_trait]
impl BusHandler for ChannelDelivery {
    async fn handle(&self, payload: Payload) {
        match payload {
            Payload::Chat(message) => {
                self.router.deliver_channel(&self.channel, &message);
            }
            other => {
                warn!(channel = %self.channel, kind = other.kind(), "Unexpected payload on channel address");
            }
        }
    }

    fn name(&self) -> &'static str {
        "channel_delivery"
    }
}

/// Consumer on `user.private.<id>` feeding direct delivery.
pub struct PrivateDelivery {
    user_id: String,
    router: MessageRouter,
}

impl PrivateDelivery {
    pub fn new(user_id: &str, router: MessageRouter) -> Self {
        Self {
            user_id: user_id.to_string(),
            router,
        }
    }
}

#[async_trait]
impl BusHandler for PrivateDelivery {
    async fn handle(&self, payload: Payload) {
        self.router.deliver_direct(&self.user_id, &payload);
    }

    fn name(&self) -> &'static str {
        "private_delivery"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Bus, LocalBus};
    use crate::state::Connection;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn setup() -> (Arc<LocalBus>, Arc<UserRegistry>) {
        let bus = Arc::new(LocalBus::new(64));
        let registry = UserRegistry::new(bus.clone(), Arc::new(ChannelTable::new()));
        (bus, registry)
    }

    fn attach(registry: &UserRegistry, user_id: &str) -> mpsc::Receiver<Bytes> {
        let (tx, rx) = mpsc::channel(16);
        registry.attach_connection(user_id, Connection::new(tx)).unwrap();
        rx
    }

    async fn next_frame(rx: &mut mpsc::Receiver<Bytes>) -> Option<Bytes> {
        tokio::time::timeout(Duration::from_millis(300), rx.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn channel_delivery_reaches_only_subscribers() {
        let (_bus, registry) = setup();
        let mut a1 = attach(&registry, "a");
        let mut a2 = attach(&registry, "a");
        let mut b = attach(&registry, "b");
        let user_a = registry.get("a").unwrap();
        registry.update_subscriptions(&user_a, &["general".to_string()]);

        let msg = ChatMessage::to_channel("general", "x", "X", "hi");
        assert_eq!(registry.router().deliver_channel("general", &msg), 2);

        let f1 = next_frame(&mut a1).await.unwrap();
        let f2 = next_frame(&mut a2).await.unwrap();
        assert_eq!(f1, f2);
        assert_eq!(ChatEnvelope::from_slice(&f1).unwrap().message, msg);
        assert!(next_frame(&mut b).await.is_none());
    }

    #[tokio::test]
    async fn unsubscribed_user_stops_receiving() {
        let (_bus, registry) = setup();
        let mut rx = attach(&registry, "a");
        let user = registry.get("a").unwrap();
        registry.update_subscriptions(&user, &["general".to_string()]);
        registry.update_subscriptions(&user, &[]);

        let msg = ChatMessage::to_channel("general", "x", "X", "hi");
        assert_eq!(registry.router().deliver_channel("general", &msg), 0);
        assert!(!registry.channels().subscribers_of("general").contains(&"a".to_string()));
        assert!(next_frame(&mut rx).await.is_none());
    }

    #[tokio::test]
    async fn direct_message_reaches_every_connection_of_target() {
        let (bus, registry) = setup();
        let mut x1 = attach(&registry, "x");
        let mut x2 = attach(&registry, "x");
        let mut y = attach(&registry, "y");

        let msg = ChatMessage::direct("s", "Sender", "psst");
        assert_eq!(bus.publish("user.private.x", msg.into()), 1);

        let f1 = next_frame(&mut x1).await.unwrap();
        let f2 = next_frame(&mut x2).await.unwrap();
        let e1 = ChatEnvelope::from_slice(&f1).unwrap();
        let e2 = ChatEnvelope::from_slice(&f2).unwrap();
        assert_eq!(e1, e2);
        assert_eq!(e1.message.text.as_deref(), Some("psst"));
        assert!(next_frame(&mut y).await.is_none());
    }

    #[tokio::test]
    async fn direct_message_to_unknown_user_is_dropped() {
        let (bus, registry) = setup();
        let msg = ChatMessage::direct("s", "Sender", "psst");
        assert_eq!(bus.publish("user.private.ghost", msg.clone().into()), 0);
        assert_eq!(registry.router().deliver_direct("ghost", &msg.into()), 0);
    }

    #[tokio::test]
    async fn raw_direct_payload_is_written_verbatim() {
        let (_bus, registry) = setup();
        let mut rx = attach(&registry, "x");
        let raw = Bytes::from_static(br#"{"kind":"notice"}"#);
        assert_eq!(registry.router().deliver_direct("x", &Payload::Raw(raw.clone())), 1);
        assert_eq!(next_frame(&mut rx).await.unwrap(), raw);
    }
}
