//! Topic-addressed publish/subscribe bus.
//!
//! The relay core only ever talks to the [`Bus`] trait. Topics follow the
//! families in [`relay_proto::address`]; payloads are shared behind `Arc`
//! so a single publish can be queued for many consumers without copying.
//!
//! [`LocalBus`] is the in-process implementation used by the daemon and by
//! tests. A cluster transport would implement the same trait.

mod local;

pub use local::LocalBus;

use async_trait::async_trait;
use bytes::Bytes;
use relay_proto::ChatMessage;
use std::fmt;
use std::sync::Arc;

use crate::error::BusError;

/// A message travelling over the bus.
#[derive(Debug, Clone)]
pub enum Payload {
    /// A chat message (channel or direct).
    Chat(Arc<ChatMessage>),
    /// A full desired subscription list.
    Channels(Arc<[String]>),
    /// Opaque JSON bytes for a user's private address, written to the
    /// connection verbatim.
    Raw(Bytes),
}

impl Payload {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Chat(_) => "chat",
            Self::Channels(_) => "channels",
            Self::Raw(_) => "raw",
        }
    }
}

impl From<ChatMessage> for Payload {
    fn from(msg: ChatMessage) -> Self {
        Self::Chat(Arc::new(msg))
    }
}

impl From<Vec<String>> for Payload {
    fn from(channels: Vec<String>) -> Self {
        Self::Channels(channels.into())
    }
}

/// Identifies one registration so it can be removed again.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConsumerHandle {
    id: u64,
    topic: Arc<str>,
}

impl ConsumerHandle {
    pub(crate) fn new(id: u64, topic: &str) -> Self {
        Self {
            id,
            topic: Arc::from(topic),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl fmt::Display for ConsumerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.topic, self.id)
    }
}

/// Receives payloads published on the topic it was registered for.
#[async_trait]
pub trait BusHandler: Send + Sync {
    /// Handle one payload. Called sequentially per registration.
    async fn handle(&self, payload: Payload);

    /// Name used in logs.
    fn name(&self) -> &'static str;
}

/// Cluster-wide publish/subscribe transport.
///
/// `register` and `unregister` are bounded and never wait on a consumer, so
/// callers may hold the per-user or channel-table lock around them.
pub trait Bus: Send + Sync {
    /// Start delivering payloads published on `topic` to `handler`.
    fn register(
        &self,
        topic: &str,
        handler: Arc<dyn BusHandler>,
    ) -> Result<ConsumerHandle, BusError>;

    /// Stop a registration. Unknown handles are ignored.
    fn unregister(&self, handle: &ConsumerHandle);

    /// Publish to every consumer of `topic`.
    ///
    /// Returns the number of consumers the payload was queued for.
    fn publish(&self, topic: &str, payload: Payload) -> usize;
}
