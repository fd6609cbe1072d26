//! Scripted collaborators for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::budget::ManualClock;
use crate::core::MediaPayload;
use crate::errors::ProviderError;
use crate::invoker::{ModelInfo, ModelProvider, RawResponse};
use crate::notify::{ChatChannel, DeliveryReceipt, RenderedMessage};

type Reply = Result<String, ProviderError>;

/// A model provider that replays a queue of replies.
///
/// Once the queue is empty the fallback reply is used; without one, calls
/// fail with a fatal error so a runaway loop shows up at once.
#[derive(Debug)]
pub struct ScriptedModelProvider {
    script: Mutex<VecDeque<Reply>>,
    fallback: Option<Reply>,
    catalog: Result<Vec<ModelInfo>, ProviderError>,
    calls: Mutex<Vec<(String, String)>>,
    advance: Option<(Arc<ManualClock>, Duration)>,
    stall: bool,
}

impl Default for ScriptedModelProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedModelProvider {
    /// Creates a provider with an empty script and catalog.
    #[must_use]
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            catalog: Ok(Vec::new()),
            calls: Mutex::new(Vec::new()),
            advance: None,
            stall: false,
        }
    }

    /// Queues a text reply.
    #[must_use]
    pub fn then_text(self, text: impl Into<String>) -> Self {
        self.script.lock().push_back(Ok(text.into()));
        self
    }

    /// Queues a failure.
    #[must_use]
    pub fn then_error(self, err: ProviderError) -> Self {
        self.script.lock().push_back(Err(err));
        self
    }

    /// Reply used once the queue is empty.
    #[must_use]
    pub fn with_fallback_text(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(Ok(text.into()));
        self
    }

    /// Failure used once the queue is empty.
    #[must_use]
    pub fn with_fallback_error(mut self, err: ProviderError) -> Self {
        self.fallback = Some(Err(err));
        self
    }

    /// Sets the model catalog.
    #[must_use]
    pub fn with_catalog(mut self, models: Vec<ModelInfo>) -> Self {
        self.catalog = Ok(models);
        self
    }

    /// Makes catalog listing fail.
    #[must_use]
    pub fn with_catalog_error(mut self, err: ProviderError) -> Self {
        self.catalog = Err(err);
        self
    }

    /// Advances `clock` by `per_call` on every `generate`.
    #[must_use]
    pub fn advancing(mut self, clock: Arc<ManualClock>, per_call: Duration) -> Self {
        self.advance = Some((clock, per_call));
        self
    }

    /// Makes every `generate` hang once the queue is empty.
    #[must_use]
    pub fn stalling(mut self) -> Self {
        self.stall = true;
        self
    }

    /// Number of `generate` calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Model passed to each call.
    #[must_use]
    pub fn models_called(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(m, _)| m.clone()).collect()
    }

    /// Prompt passed to each call.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(_, p)| p.clone()).collect()
    }
}

#[async_trait]
impl ModelProvider for ScriptedModelProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        self.catalog.clone()
    }

    async fn generate(
        &self,
        model: &str,
        _media: &MediaPayload,
        prompt: &str,
    ) -> Result<RawResponse, ProviderError> {
        self.calls.lock().push((model.to_string(), prompt.to_string()));
        if let Some((clock, per_call)) = &self.advance {
            clock.advance(*per_call);
        }
        let reply = self.script.lock().pop_front();
        if reply.is_none() && self.stall {
            std::future::pending::<()>().await;
        }
        let reply = match reply.or_else(|| self.fallback.clone()) {
            Some(reply) => reply,
            None => Err(ProviderError::malformed_request("model script exhausted")),
        };
        reply.map(|text| RawResponse::new(model, text))
    }
}

/// A chat channel that replays a queue of outcomes and records every post.
#[derive(Debug)]
pub struct ScriptedChatChannel {
    script: Mutex<VecDeque<Option<ProviderError>>>,
    fallback: Option<ProviderError>,
    posted: Mutex<Vec<RenderedMessage>>,
    stall: bool,
}

impl Default for ScriptedChatChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedChatChannel {
    /// A channel that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            posted: Mutex::new(Vec::new()),
            stall: false,
        }
    }

    /// A channel that rejects everything with `err`.
    #[must_use]
    pub fn failing(err: ProviderError) -> Self {
        Self {
            fallback: Some(err),
            ..Self::new()
        }
    }

    /// A channel whose posts never complete once the queue is empty.
    #[must_use]
    pub fn stalling() -> Self {
        Self {
            stall: true,
            ..Self::new()
        }
    }

    /// Queues a rejection.
    #[must_use]
    pub fn then_fail(self, err: ProviderError) -> Self {
        self.script.lock().push_back(Some(err));
        self
    }

    /// Queues an acceptance.
    #[must_use]
    pub fn then_ok(self) -> Self {
        self.script.lock().push_back(None);
        self
    }

    /// Number of `post` calls, accepted or not.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.posted.lock().len()
    }

    /// Every message posted, in order.
    #[must_use]
    pub fn messages(&self) -> Vec<RenderedMessage> {
        self.posted.lock().clone()
    }

    /// Titles of every message posted.
    #[must_use]
    pub fn titles(&self) -> Vec<String> {
        self.posted.lock().iter().map(|m| m.title.clone()).collect()
    }
}

#[async_trait]
impl ChatChannel for ScriptedChatChannel {
    fn name(&self) -> &str {
        "scripted-chat"
    }

    async fn post(&self, message: &RenderedMessage) -> Result<DeliveryReceipt, ProviderError> {
        let attempt = {
            let mut posted = self.posted.lock();
            posted.push(message.clone());
            posted.len()
        };
        let scripted = self.script.lock().pop_front();
        if scripted.is_none() && self.stall {
            std::future::pending::<()>().await;
        }
        match scripted.unwrap_or_else(|| self.fallback.clone()) {
            Some(err) => Err(err),
            None => Ok(DeliveryReceipt::new(
                self.name(),
                Some(format!("spaces/test/messages/{attempt}")),
            )),
        }
    }
}
