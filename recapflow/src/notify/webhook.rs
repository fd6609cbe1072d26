//! Incoming-webhook chat channel.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::channel::{ChatChannel, DeliveryReceipt};
use super::render::RenderedMessage;
use crate::errors::ProviderError;

#[derive(Debug, Deserialize)]
struct WebhookReply {
    #[serde(default)]
    name: Option<String>,
}

/// Posts `{"text": ...}` bodies to a chat webhook URL.
pub struct WebhookChatChannel {
    client: reqwest::Client,
    name: String,
    url: String,
}

impl WebhookChatChannel {
    /// Creates a channel for `url` with a per-request timeout.
    pub fn new(name: impl Into<String>, url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            name: name.into(),
            url: url.into(),
        })
    }
}

#[async_trait]
impl ChatChannel for WebhookChatChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn post(&self, message: &RenderedMessage) -> Result<DeliveryReceipt, ProviderError> {
        debug!(channel = %self.name, title = %message.title, "Posting chat message");
        let response = self
            .client
            .post(&self.url)
            .json(&message.to_payload())
            .send()
            .await
            .map_err(|e| ProviderError::network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::network(format!("failed to read webhook reply: {e}")))?;
        if !status.is_success() {
            return Err(ProviderError::http(status.as_u16(), body));
        }

        let message_id = serde_json::from_str::<WebhookReply>(&body)
            .ok()
            .and_then(|r| r.name);
        Ok(DeliveryReceipt::new(self.name.clone(), message_id))
    }
}

impl std::fmt::Debug for WebhookChatChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookChatChannel")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
