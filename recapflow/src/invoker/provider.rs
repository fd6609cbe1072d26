//! The generative-model provider seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::MediaPayload;
use crate::errors::ProviderError;

/// One entry in the provider's model catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier used in `generate`.
    pub id: String,
    /// Human-readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Whether the model accepts content generation.
    #[serde(default = "default_true")]
    pub supports_generation: bool,
}

fn default_true() -> bool {
    true
}

impl ModelInfo {
    /// A generation-capable model.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            supports_generation: true,
        }
    }
}

/// Raw model output before parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawResponse {
    /// Generated text.
    pub text: String,
    /// Model that produced it.
    pub model: String,
    /// Provider stop reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    /// Prompt tokens, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u32>,
    /// Output tokens, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u32>,
}

impl RawResponse {
    /// A response with just text.
    #[must_use]
    pub fn new(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: model.into(),
            finish_reason: None,
            input_tokens: None,
            output_tokens: None,
        }
    }

    /// Returns total tokens.
    #[must_use]
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens.unwrap_or(0) + self.output_tokens.unwrap_or(0)
    }
}

/// Model catalog and content generation.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// The provider's model catalog, in provider order.
    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError>;

    /// Sends media plus prompt to `model`.
    async fn generate(
        &self,
        model: &str,
        media: &MediaPayload,
        prompt: &str,
    ) -> Result<RawResponse, ProviderError>;
}
