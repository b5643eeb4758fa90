//! Errors raised while decoding or validating relay payloads.

use thiserror::Error;

/// Errors produced by the relay wire schemas.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// The payload was not valid JSON for the expected schema.
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    /// A subscription list contained something other than strings.
    #[error("channel list item {index} is not a string")]
    InvalidChannelList {
        /// Position of the offending item.
        index: usize,
    },

    /// A subscription list was not a JSON array.
    #[error("channel list must be a JSON array")]
    NotAList,

    /// A required message field was missing or empty.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A channel name was empty.
    #[error("channel name must not be empty")]
    EmptyChannel,
}

impl ProtoError {
    /// Static code for metrics labeling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Json(_) => "malformed_json",
            Self::InvalidChannelList { .. } => "invalid_channel_list",
            Self::NotAList => "not_a_list",
            Self::MissingField(_) => "missing_field",
            Self::EmptyChannel => "empty_channel",
        }
    }
}
