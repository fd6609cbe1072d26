//! The stage sequencer.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::context::RunContext;
use super::outcome::{PipelineOutcome, StageCosts};
use super::retry::RetryPolicy;
use crate::audit::{AuditPersister, StepRecord, StepTimer};
use crate::budget::{BudgetConfig, Clock, SystemClock, TimeoutBudgetGuard};
use crate::core::{
    ArtifactCategory, ArtifactRef, MediaBundle, PipelineStage, Recording, RunOutcome, StepStatus,
    StructuredResult,
};
use crate::errors::{
    codes, BudgetExceeded, ConfigError, DeliveryError, ErrorClass, RunError, StorageError,
};
use crate::events::{names, EventSink, LoggingEventSink};
use crate::invoker::{ModelProvider, ModelSelection, ResilientModelInvoker};
use crate::notify::{
    render_failure_message, render_result_message, ChatChannel, DeliveryOutcome,
    NotificationDispatcher, Preservation, FIELD_CHAR_LIMIT,
};
use crate::recovery::{RecoveryReference, RecoveryStore, RemediationAction};
use crate::source::RecordingSource;
use crate::storage::{layout, BlobStore};
use crate::utils::millis;

/// Everything a run accumulates between stages.
#[derive(Debug, Default)]
struct RunState {
    result: Option<StructuredResult>,
    artifacts_persisted: bool,
    audit_ref: Option<ArtifactRef>,
    delivery: Option<DeliveryOutcome>,
    recovery: Vec<RecoveryReference>,
    error: Option<RunError>,
    outcome: Option<RunOutcome>,
    failure_notice_sent: bool,
}

impl RunState {
    fn fail(&mut self, outcome: RunOutcome, error: RunError) {
        self.outcome = Some(outcome);
        self.error = Some(error);
    }
}

/// Runs one recording through media acquisition, analysis, artifact
/// persistence, audit persistence and notification, in that order.
///
/// Every exit path finalizes and writes the execution log. The orchestrator
/// never deletes the source recording; it reports whether deletion is safe.
pub struct PipelineOrchestrator {
    source: Arc<dyn RecordingSource>,
    store: Arc<dyn BlobStore>,
    invoker: ResilientModelInvoker,
    dispatcher: NotificationDispatcher,
    audit: AuditPersister,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    budget: BudgetConfig,
    costs: StageCosts,
    artifact_root: Vec<String>,
}

impl PipelineOrchestrator {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// The recording source.
    #[must_use]
    pub fn source(&self) -> &Arc<dyn RecordingSource> {
        &self.source
    }

    /// The stage costs in use.
    #[must_use]
    pub fn costs(&self) -> &StageCosts {
        &self.costs
    }

    /// Processes one recording.
    pub async fn run(&self, recording: Recording) -> PipelineOutcome {
        let guard = TimeoutBudgetGuard::with_clock(self.budget.clone(), Arc::clone(&self.clock));
        let mut ctx = RunContext::new(recording, guard).with_events(Arc::clone(&self.events));
        let mut state = RunState::default();

        info!(
            run_id = %ctx.run_id(),
            recording_id = %ctx.recording().id,
            topic = %ctx.recording().topic,
            deadline_ms = self.budget.effective_deadline().as_millis(),
            "Pipeline run started"
        );
        self.events
            .emit(
                names::PIPELINE_STARTED,
                Some(json!({
                    "run_id": ctx.run_id(),
                    "recording_id": ctx.recording().id,
                })),
            )
            .await;

        self.drive(&mut ctx, &mut state).await;
        self.finish(ctx, state).await
    }

    async fn drive(&self, ctx: &mut RunContext, state: &mut RunState) {
        // (a) media acquisition
        if let Err(budget) = self.gate(ctx, PipelineStage::MediaAcquisition) {
            state.fail(
                RunOutcome::Error,
                RunError::from_budget(&budget, PipelineStage::MediaAcquisition),
            );
            return;
        }
        let media = match self.acquire(ctx).await {
            Ok(media) => media,
            Err(err) => {
                self.stage_event(ctx, PipelineStage::MediaAcquisition, Some(&err)).await;
                state.fail(RunOutcome::Error, err);
                return;
            }
        };
        self.stage_event(ctx, PipelineStage::MediaAcquisition, None).await;

        // (b) analysis
        if let Err(budget) = self.gate(ctx, PipelineStage::AiAnalysis) {
            state.fail(
                RunOutcome::Error,
                RunError::from_budget(&budget, PipelineStage::AiAnalysis),
            );
            return;
        }
        let Some(payload) = media.analysis_media() else {
            state.fail(
                RunOutcome::Error,
                RunError::new(codes::MEDIA_UNAVAILABLE, ErrorClass::Fatal, "no usable media")
                    .at_stage(PipelineStage::MediaAcquisition),
            );
            return;
        };
        let result = match self.invoker.analyze(ctx, payload).await {
            Ok(result) => result,
            Err(err) => {
                let run_error = RunError::from_analysis(&err);
                self.stage_event(ctx, PipelineStage::AiAnalysis, Some(&run_error)).await;
                state.fail(RunOutcome::Error, run_error);
                return;
            }
        };
        self.stage_event(ctx, PipelineStage::AiAnalysis, None).await;
        state.result = Some(result.clone());

        // (c) artifact persistence
        if let Err(budget) = self.gate(ctx, PipelineStage::ArtifactPersistence) {
            let error = RunError::from_budget(&budget, PipelineStage::ArtifactPersistence);
            self.preserve(
                ctx,
                state,
                PipelineStage::ArtifactPersistence,
                RemediationAction::PersistArtifacts,
                &error,
            )
            .await;
            state.fail(RunOutcome::Error, error);
            return;
        }
        if let Err(err) = self.persist_artifacts(ctx, media, &result).await {
            let error = RunError::new(
                codes::ARTIFACT_PERSISTENCE_FAILED,
                ErrorClass::Transient,
                err.to_string(),
            )
            .at_stage(PipelineStage::ArtifactPersistence);
            self.stage_event(ctx, PipelineStage::ArtifactPersistence, Some(&error)).await;
            self.preserve(
                ctx,
                state,
                PipelineStage::ArtifactPersistence,
                RemediationAction::PersistArtifacts,
                &error,
            )
            .await;
            state.fail(RunOutcome::Error, error);
            return;
        }
        state.artifacts_persisted = true;
        self.stage_event(ctx, PipelineStage::ArtifactPersistence, None).await;

        // (d) interim audit persistence
        if let Err(budget) = self.gate(ctx, PipelineStage::AuditPersistence) {
            self.defer_notification(ctx, state, &budget, PipelineStage::AuditPersistence)
                .await;
            return;
        }
        self.write_interim_audit(ctx, state).await;

        // (e) notification
        if let Err(budget) = self.gate(ctx, PipelineStage::Notification) {
            self.defer_notification(ctx, state, &budget, PipelineStage::Notification)
                .await;
            return;
        }
        let mut links = ctx.artifacts().to_vec();
        if let Some(audit_ref) = &state.audit_ref {
            links.push(audit_ref.clone());
        }
        let message =
            render_result_message(ctx.recording(), &result, &links, self.dispatcher.field_limit());
        match self.dispatcher.deliver(ctx, &message, Some(&result)).await {
            Ok(DeliveryOutcome::Delivered(receipt)) => {
                state.delivery = Some(DeliveryOutcome::Delivered(receipt));
                self.stage_event(ctx, PipelineStage::Notification, None).await;
            }
            Ok(DeliveryOutcome::Recovered(reference)) => {
                let error = RunError::new(
                    codes::NOTIFICATION_DEFERRED,
                    ErrorClass::DownstreamDelivery,
                    format!("notification deferred, data preserved at {reference}"),
                )
                .at_stage(PipelineStage::Notification);
                self.stage_event(ctx, PipelineStage::Notification, Some(&error)).await;
                state.recovery.push(reference.clone());
                state.delivery = Some(DeliveryOutcome::Recovered(reference));
                state.failure_notice_sent = true;
                state.fail(RunOutcome::PartialSuccess, error);
            }
            Err(err @ DeliveryError::RecoveryFailed { .. }) => {
                let error = RunError::new(
                    codes::NOTIFICATION_LOST,
                    ErrorClass::DownstreamDelivery,
                    err.to_string(),
                )
                .at_stage(PipelineStage::Notification);
                self.stage_event(ctx, PipelineStage::Notification, Some(&error)).await;
                state.fail(RunOutcome::PartialSuccess, error);
            }
        }
    }

    /// Checks that the next stage's worst-case cost still fits.
    fn gate(&self, ctx: &mut RunContext, stage: PipelineStage) -> Result<(), BudgetExceeded> {
        let cost = self.costs.cost_of(stage);
        match ctx.guard().ensure_affordable(stage.as_str(), cost) {
            Ok(()) => Ok(()),
            Err(budget) => {
                warn!(
                    run_id = %ctx.run_id(),
                    stage = %stage,
                    error = %budget,
                    "Budget cannot cover the next stage, aborting"
                );
                let remaining = ctx.guard().remaining();
                ctx.record(
                    StepRecord::new("budget_check", StepStatus::Error)
                        .with_detail("stage", stage.as_str())
                        .with_detail("cost_ms", millis(cost))
                        .with_detail("remaining_ms", millis(remaining))
                        .with_error(codes::BUDGET_EXCEEDED, budget.to_string()),
                );
                Err(budget)
            }
        }
    }

    async fn acquire(&self, ctx: &mut RunContext) -> Result<MediaBundle, RunError> {
        let timer = StepTimer::start(PipelineStage::MediaAcquisition.as_str());
        match self.source.fetch_media(ctx.recording()).await {
            Ok(bundle) if !bundle.is_empty() => {
                ctx.record(
                    timer
                        .finish(StepStatus::Success)
                        .with_detail("audio_bytes", bundle.audio.as_ref().map_or(0, |m| m.len()))
                        .with_detail("video_bytes", bundle.video.as_ref().map_or(0, |m| m.len())),
                );
                Ok(bundle)
            }
            Ok(_) => {
                let error = RunError::new(
                    codes::MEDIA_UNAVAILABLE,
                    ErrorClass::Fatal,
                    "recording has no audio or video content",
                )
                .at_stage(PipelineStage::MediaAcquisition);
                ctx.record(
                    timer
                        .finish(StepStatus::Error)
                        .with_error(&error.code, &error.message),
                );
                Err(error)
            }
            Err(err) => {
                let class = self.invoker.policy().classify(&err);
                let error = RunError::new(codes::MEDIA_UNAVAILABLE, class, err.to_string())
                    .at_stage(PipelineStage::MediaAcquisition);
                ctx.record(
                    timer
                        .finish(StepStatus::Error)
                        .with_detail("class", class.to_string())
                        .with_error(&error.code, &error.message),
                );
                Err(error)
            }
        }
    }

    async fn persist_artifacts(
        &self,
        ctx: &mut RunContext,
        media: MediaBundle,
        result: &StructuredResult,
    ) -> Result<(), StorageError> {
        let folder_segments = layout::recording_folder(&self.artifact_root, ctx.recording());
        let folder = self.store.ensure_path(&folder_segments).await?;
        let label = ctx.recording().folder_label();

        let mut uploads: Vec<(Vec<u8>, String, ArtifactCategory)> = Vec::new();
        match (media.video, media.audio) {
            (Some(video), _) if !video.is_empty() => {
                let name = format!("{label}.{}", video.extension());
                uploads.push((video.bytes, name, ArtifactCategory::Video));
            }
            (_, Some(audio)) if !audio.is_empty() => {
                let name = format!("{label}.{}", audio.extension());
                uploads.push((audio.bytes, name, ArtifactCategory::Audio));
            }
            _ => {}
        }
        uploads.push((
            result.transcription.clone().into_bytes(),
            format!("{label} transcript.txt"),
            ArtifactCategory::Transcript,
        ));
        let summary = serde_json::to_vec_pretty(&json!({
            "schema_version": result.schema_version,
            "summary": result.summary,
            "metadata": result.metadata,
        }))?;
        uploads.push((summary, format!("{label} summary.json"), ArtifactCategory::Summary));

        for (bytes, name, category) in uploads {
            let timer = StepTimer::start("artifact_upload");
            let size = bytes.len();
            match self.store.upload(bytes, &name, &folder, category).await {
                Ok(artifact) => {
                    ctx.record(
                        timer
                            .finish(StepStatus::Success)
                            .with_detail("name", name.as_str())
                            .with_detail("category", category.to_string())
                            .with_detail("bytes", size),
                    );
                    ctx.add_artifact(artifact);
                }
                Err(err) => {
                    error!(
                        run_id = %ctx.run_id(),
                        name = %name,
                        error = %err,
                        "Artifact upload failed"
                    );
                    ctx.record(
                        timer
                            .finish(StepStatus::Error)
                            .with_detail("name", name.as_str())
                            .with_detail("category", category.to_string())
                            .with_error(codes::ARTIFACT_PERSISTENCE_FAILED, err.to_string()),
                    );
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    async fn write_interim_audit(&self, ctx: &mut RunContext, state: &mut RunState) {
        let timer = StepTimer::start(PipelineStage::AuditPersistence.as_str());
        let snapshot = ctx.audit().snapshot();
        match self.audit.write(&snapshot).await {
            Ok(artifact) => {
                ctx.record(
                    timer
                        .finish(StepStatus::Success)
                        .with_detail("location", artifact.id.as_str()),
                );
                state.audit_ref = Some(artifact);
                self.stage_event(ctx, PipelineStage::AuditPersistence, None).await;
            }
            Err(err) => {
                warn!(
                    run_id = %ctx.run_id(),
                    error = %err,
                    "Interim execution log write failed, continuing"
                );
                ctx.record(
                    timer
                        .finish(StepStatus::Warn)
                        .with_error(codes::AUDIT_PERSISTENCE_FAILED, err.to_string()),
                );
            }
        }
    }

    /// Budget ran out after artifacts were stored: keep the result for a
    /// later resend.
    async fn defer_notification(
        &self,
        ctx: &mut RunContext,
        state: &mut RunState,
        budget: &BudgetExceeded,
        stage: PipelineStage,
    ) {
        let error = RunError::from_budget(budget, stage);
        if let Some(reference) = self
            .preserve(
                ctx,
                state,
                PipelineStage::Notification,
                RemediationAction::ResendNotification,
                &error,
            )
            .await
        {
            state.delivery = Some(DeliveryOutcome::Recovered(reference));
        }
        state.fail(RunOutcome::PartialSuccess, error);
    }

    async fn preserve(
        &self,
        ctx: &mut RunContext,
        state: &mut RunState,
        stage: PipelineStage,
        remediation: RemediationAction,
        cause: &RunError,
    ) -> Option<RecoveryReference> {
        let message = cause.to_string();
        let saved = self
            .dispatcher
            .preserve(
                ctx,
                Preservation {
                    stage,
                    remediation,
                    result: state.result.as_ref(),
                    attempts: 0,
                    last_error: Some(&message),
                },
            )
            .await;
        match saved {
            Ok(reference) => {
                state.recovery.push(reference.clone());
                Some(reference)
            }
            Err(err) => {
                error!(
                    run_id = %ctx.run_id(),
                    stage = %stage,
                    error = %err,
                    "Recovery save failed"
                );
                None
            }
        }
    }

    async fn stage_event(&self, ctx: &RunContext, stage: PipelineStage, error: Option<&RunError>) {
        let (name, data) = match error {
            None => (
                names::STAGE_COMPLETED,
                json!({ "run_id": ctx.run_id(), "stage": stage.as_str() }),
            ),
            Some(err) => (
                names::STAGE_FAILED,
                json!({
                    "run_id": ctx.run_id(),
                    "stage": stage.as_str(),
                    "code": err.code,
                    "message": err.message,
                }),
            ),
        };
        self.events.emit(name, Some(data)).await;
    }

    /// Sends the run's single error notice, if it has not gone out yet.
    async fn send_failure_notice(&self, ctx: &mut RunContext, state: &mut RunState) {
        if state.failure_notice_sent {
            return;
        }
        let Some(err) = &state.error else {
            return;
        };
        let audit_link = state.audit_ref.as_ref().map(|a| a.link.as_str());
        let notice = render_failure_message(
            ctx.recording(),
            err,
            audit_link,
            self.dispatcher.field_limit(),
        );
        self.dispatcher.notify_failure(ctx, &notice).await;
        state.failure_notice_sent = true;
    }

    async fn finish(&self, mut ctx: RunContext, mut state: RunState) -> PipelineOutcome {
        let mut outcome = state.outcome.unwrap_or(RunOutcome::Success);

        if outcome != RunOutcome::Success {
            self.send_failure_notice(&mut ctx, &mut state).await;
        }

        ctx.audit_mut().set_outcome(outcome);
        if let Some(err) = &state.error {
            ctx.audit_mut().set_error(err.clone());
        }
        let draft = ctx.audit_mut().draft();

        let (document, audit_ref) = match self.audit.write(&draft).await {
            Ok(artifact) => {
                info!(
                    run_id = %ctx.run_id(),
                    status = %draft.status,
                    location = %artifact.id,
                    "Execution log persisted"
                );
                (ctx.audit_mut().finalize(), Some(artifact))
            }
            Err(err) => {
                error!(
                    run_id = %ctx.run_id(),
                    error = %err,
                    "Execution log write failed, emitting to fallback channel"
                );
                ctx.record(
                    StepRecord::new(PipelineStage::AuditPersistence.as_str(), StepStatus::Error)
                        .with_error(codes::AUDIT_PERSISTENCE_FAILED, err.to_string()),
                );
                if outcome == RunOutcome::Success {
                    outcome = RunOutcome::PartialSuccess;
                }
                if state.error.is_none() {
                    state.error = Some(
                        RunError::new(
                            codes::AUDIT_PERSISTENCE_FAILED,
                            ErrorClass::Transient,
                            err.to_string(),
                        )
                        .at_stage(PipelineStage::AuditPersistence),
                    );
                }
                self.send_failure_notice(&mut ctx, &mut state).await;

                ctx.audit_mut().set_outcome(outcome);
                if let Some(run_err) = &state.error {
                    ctx.audit_mut().set_error(run_err.clone());
                }
                let document = ctx.audit_mut().finalize();
                self.audit.emit_fallback(&document, &err).await;
                (document, None)
            }
        };

        let deletion_eligible =
            state.artifacts_persisted && state.delivery.is_some() && outcome != RunOutcome::Error;
        let run_id = ctx.run_id();
        let recording_id = ctx.recording().id.clone();
        let (_, artifacts) = ctx.into_parts();

        info!(
            run_id = %run_id,
            recording_id = %recording_id,
            status = %outcome,
            steps = document.counts.total,
            deletion_eligible,
            "Pipeline run finished"
        );
        self.events
            .emit(
                names::PIPELINE_COMPLETED,
                Some(json!({
                    "run_id": run_id,
                    "recording_id": recording_id,
                    "status": outcome,
                    "error_code": state.error.as_ref().map(|e| e.code.clone()),
                    "deletion_eligible": deletion_eligible,
                })),
            )
            .await;

        PipelineOutcome {
            run_id,
            recording_id,
            status: outcome,
            error: state.error,
            result: state.result,
            artifacts,
            delivery: state.delivery,
            recovery: state.recovery,
            audit: document,
            audit_ref,
            deletion_eligible,
        }
    }
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("invoker", &self.invoker)
            .field("dispatcher", &self.dispatcher)
            .field("budget", &self.budget)
            .field("costs", &self.costs)
            .field("artifact_root", &self.artifact_root)
            .finish_non_exhaustive()
    }
}

/// Assembles a [`PipelineOrchestrator`] from its collaborators.
pub struct OrchestratorBuilder {
    source: Option<Arc<dyn RecordingSource>>,
    store: Option<Arc<dyn BlobStore>>,
    provider: Option<Arc<dyn ModelProvider>>,
    channel: Option<Arc<dyn ChatChannel>>,
    recovery: Option<Arc<dyn RecoveryStore>>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    budget: BudgetConfig,
    costs: StageCosts,
    selection: ModelSelection,
    preferences: Vec<String>,
    model_policy: RetryPolicy,
    notification_policy: RetryPolicy,
    field_limit: usize,
    secondary_timeout: Duration,
    artifact_root: Vec<String>,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self {
            source: None,
            store: None,
            provider: None,
            channel: None,
            recovery: None,
            events: Arc::new(LoggingEventSink::default()),
            clock: Arc::new(SystemClock),
            budget: BudgetConfig::default(),
            costs: StageCosts::default(),
            selection: ModelSelection::Auto,
            preferences: Vec::new(),
            model_policy: RetryPolicy::model_default(),
            notification_policy: RetryPolicy::notification_default(),
            field_limit: FIELD_CHAR_LIMIT,
            secondary_timeout: Duration::from_secs(5),
            artifact_root: vec!["recordings".to_string()],
        }
    }
}

impl OrchestratorBuilder {
    /// Sets the recording source.
    #[must_use]
    pub fn source(mut self, source: Arc<dyn RecordingSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Sets the blob store for artifacts and execution logs.
    #[must_use]
    pub fn blob_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the model provider.
    #[must_use]
    pub fn model_provider(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Sets the chat channel.
    #[must_use]
    pub fn chat_channel(mut self, channel: Arc<dyn ChatChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Sets the recovery store.
    #[must_use]
    pub fn recovery_store(mut self, recovery: Arc<dyn RecoveryStore>) -> Self {
        self.recovery = Some(recovery);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the clock the budget guard reads.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the execution budget.
    #[must_use]
    pub fn budget(mut self, budget: BudgetConfig) -> Self {
        self.budget = budget;
        self
    }

    /// Sets the worst-case stage costs.
    #[must_use]
    pub fn stage_costs(mut self, costs: StageCosts) -> Self {
        self.costs = costs;
        self
    }

    /// Sets model selection and the preference list.
    #[must_use]
    pub fn models(mut self, selection: ModelSelection, preferences: Vec<String>) -> Self {
        self.selection = selection;
        self.preferences = preferences;
        self
    }

    /// Sets the model retry policy.
    #[must_use]
    pub fn model_policy(mut self, policy: RetryPolicy) -> Self {
        self.model_policy = policy;
        self
    }

    /// Sets the notification retry policy.
    #[must_use]
    pub fn notification_policy(mut self, policy: RetryPolicy) -> Self {
        self.notification_policy = policy;
        self
    }

    /// Sets the chat field character limit.
    #[must_use]
    pub fn field_limit(mut self, limit: usize) -> Self {
        self.field_limit = limit;
        self
    }

    /// Sets the timeout for best-effort messages.
    #[must_use]
    pub fn secondary_timeout(mut self, timeout: Duration) -> Self {
        self.secondary_timeout = timeout;
        self
    }

    /// Sets the root path segments for artifacts and execution logs.
    #[must_use]
    pub fn artifact_root(mut self, root: Vec<String>) -> Self {
        self.artifact_root = root;
        self
    }

    /// Builds the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if a collaborator is missing.
    pub fn build(self) -> Result<PipelineOrchestrator, ConfigError> {
        let missing = |what: &str| ConfigError::Invalid(format!("orchestrator needs a {what}"));
        let source = self.source.ok_or_else(|| missing("recording source"))?;
        let store = self.store.ok_or_else(|| missing("blob store"))?;
        let provider = self.provider.ok_or_else(|| missing("model provider"))?;
        let channel = self.channel.ok_or_else(|| missing("chat channel"))?;
        let recovery = self.recovery.ok_or_else(|| missing("recovery store"))?;

        let invoker = ResilientModelInvoker::new(provider, self.preferences)
            .with_selection(self.selection)
            .with_policy(self.model_policy);
        let dispatcher = NotificationDispatcher::new(channel, recovery)
            .with_policy(self.notification_policy)
            .with_field_limit(self.field_limit)
            .with_secondary_timeout(self.secondary_timeout);
        let audit = AuditPersister::new(
            Arc::clone(&store),
            self.artifact_root.clone(),
            Arc::clone(&self.events),
        );

        Ok(PipelineOrchestrator {
            source,
            store,
            invoker,
            dispatcher,
            audit,
            events: self.events,
            clock: self.clock,
            budget: self.budget,
            costs: self.costs,
            artifact_root: self.artifact_root,
        })
    }
}

impl std::fmt::Debug for OrchestratorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorBuilder")
            .field("budget", &self.budget)
            .field("preferences", &self.preferences)
            .finish_non_exhaustive()
    }
}
