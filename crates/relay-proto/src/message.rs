//! Chat message schema.
//!
//! A [`ChatMessage`] is what travels over the bus. The router only reads it;
//! once published it is shared behind an `Arc` and never mutated.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtoError;

/// Loop-prevention marker set on messages that entered through the bridge.
pub const DATA_MARKER_FROM_BRIDGE: &str = "__fromSlack";

/// Optional hyperlink for the author, rendered by the bridge.
pub const DATA_AUTHOR_LINK: &str = "slackAuthorLink";

/// Optional author color, rendered by the bridge.
pub const DATA_AUTHOR_COLOR: &str = "slackAuthorColor";

/// Optional list of structured fields, rendered by the bridge.
pub const DATA_ADDITIONAL_FIELDS: &str = "slackAdditionalFields";

/// Open string-keyed metadata attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdditionalData(Map<String, Value>);

impl AdditionalData {
    /// Create an empty metadata map.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Metadata for a message that was mirrored in from the bridge.
    pub fn from_bridge() -> Self {
        let mut data = Self::new();
        data.insert(DATA_MARKER_FROM_BRIDGE, Value::Bool(true));
        data
    }

    /// Insert or replace a key.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    /// Raw lookup.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether the loop-prevention marker is set.
    ///
    /// Anything other than a literal `true` counts as unset.
    pub fn is_from_bridge(&self) -> bool {
        matches!(self.0.get(DATA_MARKER_FROM_BRIDGE), Some(Value::Bool(true)))
    }

    /// Author hyperlink, if present and a string.
    pub fn author_link(&self) -> Option<&str> {
        self.0.get(DATA_AUTHOR_LINK).and_then(Value::as_str)
    }

    /// Author color, if present and a string.
    pub fn author_color(&self) -> Option<&str> {
        self.0.get(DATA_AUTHOR_COLOR).and_then(Value::as_str)
    }

    /// Structured fields, if present and an array.
    pub fn additional_fields(&self) -> Option<&Vec<Value>> {
        self.0.get(DATA_ADDITIONAL_FIELDS).and_then(Value::as_array)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A chat message addressed to a channel or, with no channel, to a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Target channel; absent for direct messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    /// Sender identity.
    pub sender_id: String,

    /// Human-readable sender name.
    #[serde(default)]
    pub sender_display_name: String,

    /// Message text. `None` means no textual content; the bridge ignores it.
    #[serde(default)]
    pub text: Option<String>,

    /// Open metadata map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<AdditionalData>,
}

impl ChatMessage {
    /// Build a channel message.
    pub fn to_channel(
        channel: impl Into<String>,
        sender_id: impl Into<String>,
        sender_display_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            channel: Some(channel.into()),
            sender_id: sender_id.into(),
            sender_display_name: sender_display_name.into(),
            text: Some(text.into()),
            additional_data: None,
        }
    }

    /// Build a direct message (no channel).
    pub fn direct(
        sender_id: impl Into<String>,
        sender_display_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            channel: None,
            sender_id: sender_id.into(),
            sender_display_name: sender_display_name.into(),
            text: Some(text.into()),
            additional_data: None,
        }
    }

    /// Attach metadata.
    pub fn with_additional_data(mut self, data: AdditionalData) -> Self {
        self.additional_data = Some(data);
        self
    }

    /// Whether this message carries the loop-prevention marker.
    pub fn is_from_bridge(&self) -> bool {
        self.additional_data
            .as_ref()
            .is_some_and(AdditionalData::is_from_bridge)
    }

    /// Boundary validation applied before a message is put on the bus.
    pub fn validate(&self) -> Result<(), ProtoError> {
        if self.sender_id.is_empty() {
            return Err(ProtoError::MissingField("senderId"));
        }
        if self.channel.as_deref().is_some_and(str::is_empty) {
            return Err(ProtoError::EmptyChannel);
        }
        Ok(())
    }

    /// Decode from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ProtoError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
