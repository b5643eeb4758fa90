//! Slack-style incoming/outgoing webhook bridge.

use async_trait::async_trait;
use relay_proto::{AdditionalData, ChatMessage};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing::{debug, trace};

use super::{BridgeAdapter, Delivery};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, IncomingError};

/// Form fields of an inbound webhook post.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct IncomingForm {
    pub token: Option<String>,
    pub user_name: Option<String>,
    pub text: Option<String>,
    pub channel_name: Option<String>,
}

/// Bridge to a Slack-compatible webhook.
pub struct SlackBridge {
    client: reqwest::Client,
    config: BridgeConfig,
}

impl SlackBridge {
    pub fn new(config: BridgeConfig) -> Result<Self, BridgeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// Webhook payload for `message` on relay `channel`.
    ///
    /// `None` when the message must not be forwarded: no text, carries the
    /// loop-prevention marker, or the channel is not mirrored.
    pub fn build_payload(&self, channel: &str, message: &ChatMessage) -> Option<Value> {
        let text = message.text.as_deref()?;
        if message.is_from_bridge() {
            return None;
        }
        let external = self.config.outgoing.get(channel)?;

        let data = message.additional_data.as_ref();
        let mut attachment = Map::new();
        attachment.insert("fallback".into(), json!(text));
        attachment.insert("text".into(), json!(text));
        attachment.insert("author_name".into(), json!(message.sender_display_name));
        if let Some(link) = data.and_then(AdditionalData::author_link) {
            attachment.insert("author_link".into(), json!(link));
        }
        if let Some(color) = data.and_then(AdditionalData::author_color) {
            attachment.insert("color".into(), json!(color));
        }
        if let Some(fields) = data.and_then(AdditionalData::additional_fields) {
            attachment.insert("fields".into(), Value::Array(fields.clone()));
        }

        let mut payload = Map::new();
        payload.insert("channel".into(), json!(external));
        if let Some(username) = &self.config.username {
            payload.insert("username".into(), json!(username));
        }
        payload.insert("attachments".into(), json!([attachment]));
        Some(Value::Object(payload))
    }

    /// Translate an inbound post into a relay channel message.
    ///
    /// `Ok(None)` means the external channel is not mapped and the post is
    /// accepted without effect.
    pub fn translate_incoming(
        &self,
        form: &IncomingForm,
    ) -> Result<Option<ChatMessage>, IncomingError> {
        let token = form.token.as_deref().ok_or(IncomingError::MissingField("token"))?;
        let user_name = form
            .user_name
            .as_deref()
            .ok_or(IncomingError::MissingField("user_name"))?;
        let text = form.text.as_deref().ok_or(IncomingError::MissingField("text"))?;
        let external = form
            .channel_name
            .as_deref()
            .ok_or(IncomingError::MissingField("channel_name"))?;

        let expected = self.config.token.as_deref().unwrap_or_default();
        if expected.is_empty() || !bool::from(expected.as_bytes().ct_eq(token.as_bytes())) {
            return Err(IncomingError::BadToken);
        }

        let Some(channel) = self.config.incoming.get(external) else {
            trace!(%external, "Inbound post for unmapped channel");
            return Ok(None);
        };

        let message = ChatMessage::to_channel(channel, format!("slack:{external}"), user_name, text)
            .with_additional_data(AdditionalData::from_bridge());
        Ok(Some(message))
    }
}

#[async_trait]
impl BridgeAdapter for SlackBridge {
    fn can_send_outgoing(&self) -> bool {
        self.config.enabled && self.config.url.is_some() && !self.config.outgoing.is_empty()
    }

    fn can_receive_incoming(&self) -> bool {
        self.config.enabled
            && self.config.url.is_some()
            && self.config.token.is_some()
            && !self.config.incoming.is_empty()
    }

    fn outgoing_channels(&self) -> Vec<String> {
        self.config.outgoing.keys().cloned().collect()
    }

    async fn deliver_outgoing(
        &self,
        channel: &str,
        message: &ChatMessage,
    ) -> Result<Delivery, BridgeError> {
        let Some(url) = self.config.url.as_deref().filter(|_| self.can_send_outgoing()) else {
            return Err(BridgeError::NotConfigured);
        };
        let Some(payload) = self.build_payload(channel, message) else {
            return Ok(Delivery::Skipped);
        };

        let response = self.client.post(url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Status(status.as_u16()));
        }
        debug!(%channel, "Mirrored message to bridge");
        Ok(Delivery::Sent)
    }
}
