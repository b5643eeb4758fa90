//! # relay-proto
//!
//! Wire schemas shared by the event relay daemon and anything that talks to
//! its bus or its client connections.
//!
//! ## Features
//!
//! - [`ChatMessage`] with an open [`AdditionalData`] metadata map and typed
//!   accessors for the reserved bridge keys
//! - [`ChatEnvelope`], the exact frame written to a live client connection
//! - Bus address helpers (`channel.<name>`, `user.update.<id>`,
//!   `user.private.<id>`) and [`Address`] parsing
//! - Subscription-list payload decoding
//!
//! ## Quick Start
//!
//! ```rust
//! use relay_proto::{channel_address, ChatEnvelope, ChatMessage};
//!
//! let msg = ChatMessage::to_channel("general", "u-1", "Alice", "hello");
//! assert_eq!(channel_address("general"), "channel.general");
//!
//! let frame = ChatEnvelope::for_message(&msg).to_bytes().unwrap();
//! assert!(!frame.is_empty());
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod address;
pub mod envelope;
pub mod error;
pub mod message;

pub use address::{
    channel_address, channel_list_from_values, parse_channel_list, private_address, user_update_address, Address,
    CHANNEL_PREFIX, PRIVATE_PREFIX, UPDATE_PREFIX,
};
pub use envelope::ChatEnvelope;
pub use error::ProtoError;
pub use message::{
    AdditionalData, ChatMessage, DATA_ADDITIONAL_FIELDS, DATA_AUTHOR_COLOR, DATA_AUTHOR_LINK,
    DATA_MARKER_FROM_BRIDGE,
};
