//! Test doubles and fixtures.
//!
//! Scripted collaborators let tests drive every failure path of a run
//! deterministically; [`PipelineHarness`] wires them into an orchestrator
//! with in-memory stores and a manual clock.

mod fixtures;
mod mocks;

pub use fixtures::{legacy_model_output, sample_media, sample_recording, valid_model_output};
pub use mocks::{ScriptedChatChannel, ScriptedModelProvider};

pub use crate::source::InMemoryRecordingSource;

use std::sync::Arc;

use crate::budget::ManualClock;
use crate::core::Recording;
use crate::errors::ConfigError;
use crate::events::CollectingEventSink;
use crate::invoker::ModelSelection;
use crate::pipeline::{OrchestratorBuilder, PipelineOrchestrator, PipelineOutcome};
use crate::recovery::InMemoryRecoveryStore;
use crate::storage::InMemoryBlobStore;

/// Models the harness asks for, in order.
pub const HARNESS_MODELS: [&str; 2] = ["primary-model", "secondary-model"];

/// An orchestrator wired to in-memory collaborators.
#[derive(Debug)]
pub struct PipelineHarness {
    /// Clock driving the budget guard.
    pub clock: Arc<ManualClock>,
    /// Source seeded with [`sample_recording`].
    pub source: Arc<InMemoryRecordingSource>,
    /// Artifact and execution-log store.
    pub store: Arc<InMemoryBlobStore>,
    /// Model provider.
    pub provider: Arc<ScriptedModelProvider>,
    /// Chat channel.
    pub channel: Arc<ScriptedChatChannel>,
    /// Recovery store.
    pub recovery: Arc<InMemoryRecoveryStore>,
    /// Collected events.
    pub events: Arc<CollectingEventSink>,
    /// The seeded recording.
    pub recording: Recording,
}

impl PipelineHarness {
    /// Creates a harness with a fresh clock.
    #[must_use]
    pub fn new(provider: ScriptedModelProvider, channel: ScriptedChatChannel) -> Self {
        Self::with_clock(Arc::new(ManualClock::new()), provider, channel)
    }

    /// Creates a harness around an existing clock.
    #[must_use]
    pub fn with_clock(
        clock: Arc<ManualClock>,
        provider: ScriptedModelProvider,
        channel: ScriptedChatChannel,
    ) -> Self {
        let recording = sample_recording();
        let source = Arc::new(InMemoryRecordingSource::new());
        source.add(recording.clone(), sample_media());
        Self {
            clock,
            source,
            store: Arc::new(InMemoryBlobStore::new()),
            provider: Arc::new(provider),
            channel: Arc::new(channel),
            recovery: Arc::new(InMemoryRecoveryStore::new()),
            events: Arc::new(CollectingEventSink::new()),
            recording,
        }
    }

    /// A builder wired to the harness collaborators, for further tweaks.
    #[must_use]
    pub fn builder(&self) -> OrchestratorBuilder {
        PipelineOrchestrator::builder()
            .source(self.source.clone())
            .blob_store(self.store.clone())
            .model_provider(self.provider.clone())
            .chat_channel(self.channel.clone())
            .recovery_store(self.recovery.clone())
            .events(self.events.clone())
            .clock(self.clock.clone())
            .models(
                ModelSelection::Fixed,
                HARNESS_MODELS.iter().map(ToString::to_string).collect(),
            )
            .artifact_root(vec!["meetings".to_string()])
    }

    /// Builds the orchestrator with harness defaults.
    pub fn orchestrator(&self) -> Result<PipelineOrchestrator, ConfigError> {
        self.builder().build()
    }

    /// Runs the seeded recording once.
    pub async fn run(&self) -> Result<PipelineOutcome, ConfigError> {
        Ok(self.orchestrator()?.run(self.recording.clone()).await)
    }
}
