//! Bus topic addresses.
//!
//! Three families of string topics exist cluster-wide:
//!
//! | Topic                  | Payload                                   |
//! |------------------------|-------------------------------------------|
//! | `channel.<name>`       | chat messages for a channel               |
//! | `user.update.<id>`     | full desired subscription list of a user  |
//! | `user.private.<id>`    | direct messages for a user                |

use std::collections::HashSet;

use serde_json::Value;

use crate::error::ProtoError;

/// Prefix of channel topics.
pub const CHANNEL_PREFIX: &str = "channel.";

/// Prefix of subscription-update topics.
pub const UPDATE_PREFIX: &str = "user.update.";

/// Prefix of private-message topics.
pub const PRIVATE_PREFIX: &str = "user.private.";

/// Topic carrying messages for `channel`.
pub fn channel_address(channel: &str) -> String {
    format!("{CHANNEL_PREFIX}{channel}")
}

/// Topic carrying subscription updates for `user_id`.
pub fn user_update_address(user_id: &str) -> String {
    format!("{UPDATE_PREFIX}{user_id}")
}

/// Topic carrying direct messages for `user_id`.
pub fn private_address(user_id: &str) -> String {
    format!("{PRIVATE_PREFIX}{user_id}")
}

/// A parsed bus topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address<'a> {
    /// `channel.<name>`
    Channel(&'a str),
    /// `user.update.<id>`
    UserUpdate(&'a str),
    /// `user.private.<id>`
    Private(&'a str),
}

impl<'a> Address<'a> {
    /// Recognise one of the three topic families.
    ///
    /// Returns `None` for unknown prefixes or an empty suffix.
    pub fn parse(topic: &'a str) -> Option<Self> {
        let parsed = if let Some(rest) = topic.strip_prefix(UPDATE_PREFIX) {
            Self::UserUpdate(rest)
        } else if let Some(rest) = topic.strip_prefix(PRIVATE_PREFIX) {
            Self::Private(rest)
        } else if let Some(rest) = topic.strip_prefix(CHANNEL_PREFIX) {
            Self::Channel(rest)
        } else {
            return None;
        };

        match parsed {
            Self::Channel(s) | Self::UserUpdate(s) | Self::Private(s) if s.is_empty() => None,
            other => Some(other),
        }
    }
}

/// Decode a subscription-update payload: a JSON array of channel names.
///
/// Order is preserved and duplicates are dropped.
pub fn parse_channel_list(bytes: &[u8]) -> Result<Vec<String>, ProtoError> {
    let value: Value = serde_json::from_slice(bytes)?;
    let Value::Array(items) = value else {
        return Err(ProtoError::NotAList);
    };
    channel_list_from_values(&items)
}

/// Same as [`parse_channel_list`] for an already-decoded array.
pub fn channel_list_from_values(items: &[Value]) -> Result<Vec<String>, ProtoError> {
    let mut seen = HashSet::with_capacity(items.len());
    let mut channels = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let Some(name) = item.as_str() else {
            return Err(ProtoError::InvalidChannelList { index });
        };
        if seen.insert(name) {
            channels.push(name.to_string());
        }
    }
    Ok(channels)
}
