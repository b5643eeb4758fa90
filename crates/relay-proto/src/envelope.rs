//! The frame written to a live client connection.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtoError;
use crate::message::ChatMessage;

/// Wire wrapper around one [`ChatMessage`] plus delivery metadata.
///
/// Has no identity of its own; it is derived one-to-one from a message at
/// delivery time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEnvelope {
    /// When the relay wrapped the message.
    pub timestamp: DateTime<Utc>,
    /// The wrapped message.
    pub message: ChatMessage,
}

impl ChatEnvelope {
    /// Wrap a message, stamping it with the current time.
    pub fn for_message(message: &ChatMessage) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.clone(),
        }
    }

    /// Serialize to the bytes written to each connection.
    pub fn to_bytes(&self) -> Result<Bytes, ProtoError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Decode a frame received from the relay.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ProtoError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
