//! HTTP provider for the Gemini generative-language API.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::provider::{ModelInfo, ModelProvider, RawResponse};
use crate::core::MediaPayload;
use crate::errors::ProviderError;

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Inline request payloads above this size are rejected by the API.
pub const DEFAULT_INLINE_LIMIT_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelEntry {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

impl From<ModelEntry> for ModelInfo {
    fn from(entry: ModelEntry) -> Self {
        Self {
            supports_generation: entry
                .supported_generation_methods
                .iter()
                .any(|m| m == "generateContent"),
            id: entry.name,
            display_name: entry.display_name,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Inline { inline_data: InlineData },
    Text { text: String },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<Usage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<TextPart>,
}

#[derive(Debug, Deserialize)]
struct TextPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Usage {
    #[serde(default)]
    prompt_token_count: Option<u32>,
    #[serde(default)]
    candidates_token_count: Option<u32>,
}

/// Calls `models` and `models/{id}:generateContent` with media sent inline.
pub struct GeminiModelProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    inline_limit: usize,
}

impl GeminiModelProvider {
    /// Creates a provider against the public endpoint with a per-request
    /// timeout.
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            inline_limit: DEFAULT_INLINE_LIMIT_BYTES,
        })
    }

    /// Overrides the API root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Overrides the inline media limit.
    #[must_use]
    pub fn with_inline_limit(mut self, bytes: usize) -> Self {
        self.inline_limit = bytes;
        self
    }

    async fn read_body(response: reqwest::Response) -> Result<String, ProviderError> {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::network(format!("failed to read response body: {e}")))?;

        if status.is_success() {
            return Ok(body);
        }
        let mut err = ProviderError::http(status.as_u16(), error_message(&body));
        if let Some(wait) = retry_after {
            err = err.with_retry_after(wait);
        }
        Err(err)
    }
}

fn transport_error(err: &reqwest::Error) -> ProviderError {
    match err.status() {
        Some(status) => ProviderError::http(status.as_u16(), err.to_string()),
        None if err.is_timeout() => ProviderError::network(format!("timeout: {err}")),
        None => ProviderError::network(err.to_string()),
    }
}

fn parse_retry_after(raw: &str) -> Option<Duration> {
    raw.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Pulls `error.message` out of an API error body, else returns the body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

fn build_request(media: &MediaPayload, prompt: &str) -> GenerateRequest {
    GenerateRequest {
        contents: vec![Content {
            parts: vec![
                Part::Inline {
                    inline_data: InlineData {
                        mime_type: media.mime_type.clone(),
                        data: STANDARD.encode(&media.bytes),
                    },
                },
                Part::Text {
                    text: prompt.to_string(),
                },
            ],
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json",
            temperature: 0.2,
        },
    }
}

fn into_raw(model: &str, body: &str) -> Result<RawResponse, ProviderError> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::network(format!("unreadable generateContent response: {e}")))?;
    let candidate = parsed.candidates.into_iter().next();
    let finish_reason = candidate.as_ref().and_then(|c| c.finish_reason.clone());
    let text: String = candidate
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    Ok(RawResponse {
        text,
        model: model.to_string(),
        finish_reason,
        input_tokens: parsed.usage_metadata.as_ref().and_then(|u| u.prompt_token_count),
        output_tokens: parsed.usage_metadata.as_ref().and_then(|u| u.candidates_token_count),
    })
}

#[async_trait]
impl ModelProvider for GeminiModelProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        let body = Self::read_body(response).await?;
        let list: ModelList = serde_json::from_str(&body)
            .map_err(|e| ProviderError::network(format!("unreadable model catalog: {e}")))?;
        Ok(list.models.into_iter().map(ModelInfo::from).collect())
    }

    async fn generate(
        &self,
        model: &str,
        media: &MediaPayload,
        prompt: &str,
    ) -> Result<RawResponse, ProviderError> {
        if media.len() > self.inline_limit {
            return Err(ProviderError::malformed_request(format!(
                "media is {} bytes, inline limit is {}",
                media.len(),
                self.inline_limit
            )));
        }
        let model = model.strip_prefix("models/").unwrap_or(model);
        debug!(model, bytes = media.len(), "Calling generateContent");

        let response = self
            .client
            .post(format!("{}/models/{model}:generateContent", self.base_url))
            .header("x-goog-api-key", &self.api_key)
            .json(&build_request(media, prompt))
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        let body = Self::read_body(response).await?;
        into_raw(model, &body)
    }
}

impl std::fmt::Debug for GeminiModelProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiModelProvider")
            .field("base_url", &self.base_url)
            .field("inline_limit", &self.inline_limit)
            .finish_non_exhaustive()
    }
}
