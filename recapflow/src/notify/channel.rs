//! The chat channel seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::render::RenderedMessage;
use crate::errors::ProviderError;
use crate::utils::Timestamp;

/// Proof that a message was accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// Channel the message went to.
    pub channel: String,
    /// Provider message id, when returned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// When the channel accepted it.
    pub delivered_at: Timestamp,
}

impl DeliveryReceipt {
    /// A receipt stamped now.
    #[must_use]
    pub fn new(channel: impl Into<String>, message_id: Option<String>) -> Self {
        Self {
            channel: channel.into(),
            message_id,
            delivered_at: chrono::Utc::now(),
        }
    }
}

/// Posts rendered messages to a team-chat destination.
#[async_trait]
pub trait ChatChannel: Send + Sync {
    /// Channel name for logs and receipts.
    fn name(&self) -> &str;

    /// Posts one message.
    async fn post(&self, message: &RenderedMessage) -> Result<DeliveryReceipt, ProviderError>;
}
