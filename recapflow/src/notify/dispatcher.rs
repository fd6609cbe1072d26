//! Bounded-retry delivery with recovery on exhaustion.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::channel::{ChatChannel, DeliveryReceipt};
use super::render::{render_delivery_failed_message, RenderedMessage};
use super::size_budget::{truncate_result, FIELD_CHAR_LIMIT};
use crate::audit::{StepRecord, StepTimer};
use crate::core::{PipelineStage, StepStatus, StructuredResult};
use crate::errors::{
    codes, BudgetExceeded, DeliveryError, DeliveryFailure, ErrorClass, ProviderError, StorageError,
};
use crate::events::names;
use crate::pipeline::{RetryPolicy, RunContext};
use crate::recovery::{RecoveryRecord, RecoveryReference, RecoveryStore, RemediationAction};

/// Audit step name for one delivery attempt.
pub const NOTIFICATION_STEP: &str = "notification";

/// How a delivery ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// The channel accepted the message.
    Delivered(DeliveryReceipt),
    /// Delivery was exhausted; the payload was preserved instead.
    Recovered(RecoveryReference),
}

impl DeliveryOutcome {
    /// Returns true if the message reached the channel.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }
}

/// What to preserve when a stage cannot complete.
#[derive(Debug, Clone, Copy)]
pub struct Preservation<'a> {
    /// Failing stage.
    pub stage: PipelineStage,
    /// Recommended follow-up.
    pub remediation: RemediationAction,
    /// Result to keep, if one was produced.
    pub result: Option<&'a StructuredResult>,
    /// Attempts made at the failing stage.
    pub attempts: u32,
    /// Last failure text.
    pub last_error: Option<&'a str>,
}

/// Posts messages to the chat channel with bounded retries and hands
/// undeliverable payloads to the recovery store.
pub struct NotificationDispatcher {
    channel: Arc<dyn ChatChannel>,
    recovery: Arc<dyn RecoveryStore>,
    policy: RetryPolicy,
    field_limit: usize,
    secondary_timeout: Duration,
}

impl NotificationDispatcher {
    /// Creates a dispatcher with the default notification policy.
    #[must_use]
    pub fn new(channel: Arc<dyn ChatChannel>, recovery: Arc<dyn RecoveryStore>) -> Self {
        Self {
            channel,
            recovery,
            policy: RetryPolicy::notification_default(),
            field_limit: FIELD_CHAR_LIMIT,
            secondary_timeout: Duration::from_secs(5),
        }
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the per-field character limit.
    #[must_use]
    pub fn with_field_limit(mut self, limit: usize) -> Self {
        self.field_limit = limit;
        self
    }

    /// Sets the timeout for best-effort messages.
    #[must_use]
    pub fn with_secondary_timeout(mut self, timeout: Duration) -> Self {
        self.secondary_timeout = timeout;
        self
    }

    /// The per-field character limit.
    #[must_use]
    pub fn field_limit(&self) -> usize {
        self.field_limit
    }

    /// The recovery store.
    #[must_use]
    pub fn recovery(&self) -> &Arc<dyn RecoveryStore> {
        &self.recovery
    }

    /// Delivers `message`, or preserves `result` when every attempt fails.
    ///
    /// Returns `Recovered` rather than an error when the recovery write
    /// succeeds. Only a failed recovery write is an error.
    pub async fn deliver(
        &self,
        ctx: &mut RunContext,
        message: &RenderedMessage,
        result: Option<&StructuredResult>,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let mut attempts = 0u32;
        let mut stopped: Option<DeliveryFailure> = None;

        while attempts < self.policy.max_attempts {
            if let Err(budget) = ctx.guard().ensure(NOTIFICATION_STEP) {
                warn!(run_id = %ctx.run_id(), error = %budget, "Budget exhausted during delivery");
                ctx.record(budget_step(&budget, attempts));
                stopped = Some(DeliveryFailure::Budget(budget));
                break;
            }

            attempts += 1;
            let timer = StepTimer::start(NOTIFICATION_STEP);
            let posted = ctx
                .guard()
                .bounded(NOTIFICATION_STEP, self.channel.post(message))
                .await;
            let posted = match posted {
                Ok(posted) => posted,
                Err(budget) => {
                    warn!(
                        run_id = %ctx.run_id(),
                        channel = self.channel.name(),
                        attempt = attempts,
                        "Notification attempt outlived the run budget"
                    );
                    ctx.record(
                        timer
                            .finish(StepStatus::Error)
                            .with_detail("attempt", attempts)
                            .with_detail("class", ErrorClass::BudgetExceeded.to_string())
                            .with_error(codes::BUDGET_EXCEEDED, budget.to_string()),
                    );
                    stopped = Some(DeliveryFailure::Budget(budget));
                    break;
                }
            };

            match posted {
                Ok(receipt) => {
                    ctx.record(
                        timer
                            .finish(StepStatus::Success)
                            .with_detail("attempt", attempts)
                            .with_detail("channel", receipt.channel.as_str()),
                    );
                    info!(
                        run_id = %ctx.run_id(),
                        channel = self.channel.name(),
                        attempt = attempts,
                        "Notification delivered"
                    );
                    return Ok(DeliveryOutcome::Delivered(receipt));
                }
                Err(err) => {
                    let class = self.policy.classify(&err);
                    warn!(
                        run_id = %ctx.run_id(),
                        channel = self.channel.name(),
                        attempt = attempts,
                        max_attempts = self.policy.max_attempts,
                        error = %err,
                        "Notification attempt failed"
                    );
                    ctx.record(
                        timer
                            .finish(StepStatus::Error)
                            .with_detail("attempt", attempts)
                            .with_detail("class", class.to_string())
                            .with_error(codes::NOTIFICATION_DEFERRED, err.to_string()),
                    );

                    let delay = self.policy.delay_after(attempts - 1, &err);
                    stopped = Some(DeliveryFailure::Channel(err));
                    if class == ErrorClass::Fatal || !self.policy.allows_retry(attempts) {
                        break;
                    }
                    if let Err(budget) = ctx.guard().ensure_affordable("notification_backoff", delay) {
                        warn!(run_id = %ctx.run_id(), error = %budget, "No budget left for delivery backoff");
                        ctx.record(budget_step(&budget, attempts));
                        break;
                    }
                    ctx.guard().sleep(delay).await;
                }
            }
        }

        let delivery = stopped.unwrap_or_else(|| {
            DeliveryFailure::Channel(ProviderError::network("delivery was not attempted"))
        });
        let cause = delivery.to_string();
        let preserved = self
            .preserve(
                ctx,
                Preservation {
                    stage: PipelineStage::Notification,
                    remediation: RemediationAction::ResendNotification,
                    result,
                    attempts,
                    last_error: Some(&cause),
                },
            )
            .await;

        match preserved {
            Ok(reference) => {
                self.announce_recovery(ctx, &reference).await;
                Ok(DeliveryOutcome::Recovered(reference))
            }
            Err(storage) => {
                error!(
                    run_id = %ctx.run_id(),
                    attempts,
                    delivery = %delivery,
                    error = %storage,
                    "Delivery exhausted and recovery save failed"
                );
                Err(DeliveryError::RecoveryFailed {
                    attempts,
                    delivery,
                    storage,
                })
            }
        }
    }

    /// Writes a recovery record for the run, truncating the result to the
    /// field budget. Records a `recovery_save` step either way.
    pub async fn preserve(
        &self,
        ctx: &mut RunContext,
        what: Preservation<'_>,
    ) -> Result<RecoveryReference, StorageError> {
        let mut record = RecoveryRecord::new(
            ctx.recording(),
            what.stage,
            ctx.run_id().to_string(),
            what.remediation,
        )
        .with_attempts(what.attempts)
        .with_artifacts(ctx.artifacts().to_vec());
        if let Some(result) = what.result {
            let (cut, truncated) = truncate_result(result, self.field_limit);
            record = record.with_result(cut, truncated);
        }
        if let Some(err) = what.last_error {
            record = record.with_last_error(err);
        }

        let timer = StepTimer::start("recovery_save");
        match self.recovery.save(&record).await {
            Ok(reference) => {
                ctx.record(
                    timer
                        .finish(StepStatus::Warn)
                        .with_detail("stage", what.stage.as_str())
                        .with_detail("remediation", what.remediation.to_string())
                        .with_detail("location", reference.location.as_str())
                        .with_detail("truncated", record.truncated),
                );
                info!(
                    run_id = %ctx.run_id(),
                    recording_id = %ctx.recording().id,
                    stage = %what.stage,
                    location = %reference.location,
                    "Result preserved for replay"
                );
                ctx.events()
                    .emit(
                        names::RECOVERY_SAVED,
                        Some(serde_json::json!({
                            "run_id": ctx.run_id(),
                            "recording_id": ctx.recording().id,
                            "stage": what.stage.as_str(),
                            "location": reference.location,
                        })),
                    )
                    .await;
                Ok(reference)
            }
            Err(err) => {
                ctx.record(
                    timer
                        .finish(StepStatus::Error)
                        .with_detail("stage", what.stage.as_str())
                        .with_error(codes::NOTIFICATION_LOST, err.to_string()),
                );
                Err(err)
            }
        }
    }

    async fn announce_recovery(&self, ctx: &mut RunContext, reference: &RecoveryReference) {
        let notice = render_delivery_failed_message(ctx.recording(), &reference.location);
        let sent = self.post_best_effort(&notice).await;
        ctx.record(
            StepRecord::new(
                "notification_fallback",
                if sent { StepStatus::Info } else { StepStatus::Warn },
            )
            .with_detail("delivered", sent)
            .with_detail("reference", reference.location.as_str()),
        );
    }

    /// Posts one best-effort error notification. Never fails the caller.
    pub async fn notify_failure(&self, ctx: &mut RunContext, message: &RenderedMessage) -> bool {
        let sent = self.post_best_effort(message).await;
        ctx.record(
            StepRecord::new(
                "error_notification",
                if sent { StepStatus::Info } else { StepStatus::Warn },
            )
            .with_detail("delivered", sent),
        );
        sent
    }

    async fn post_best_effort(&self, message: &RenderedMessage) -> bool {
        match tokio::time::timeout(self.secondary_timeout, self.channel.post(message)).await {
            Ok(Ok(_)) => true,
            Ok(Err(err)) => {
                warn!(channel = self.channel.name(), error = %err, "Best-effort message failed");
                false
            }
            Err(_) => {
                warn!(
                    channel = self.channel.name(),
                    timeout_ms = self.secondary_timeout.as_millis(),
                    "Best-effort message timed out"
                );
                false
            }
        }
    }
}

fn budget_step(budget: &BudgetExceeded, attempts: u32) -> StepRecord {
    StepRecord::new("budget_check", StepStatus::Error)
        .with_detail("stage", PipelineStage::Notification.as_str())
        .with_detail("checkpoint", budget.label.as_str())
        .with_detail("attempts", attempts)
        .with_error(codes::BUDGET_EXCEEDED, budget.to_string())
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("channel", &self.channel.name())
            .field("policy", &self.policy)
            .field("field_limit", &self.field_limit)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::{BudgetConfig, ManualClock, TimeoutBudgetGuard};
    use crate::invoker::parse_model_output;
    use crate::recovery::{InMemoryRecoveryStore, RecoveryKey};
    use crate::testing::{sample_recording, valid_model_output, ScriptedChatChannel};
    use crate::notify::TRUNCATION_MARKER;

    fn context(clock: Arc<ManualClock>) -> RunContext {
        let guard = TimeoutBudgetGuard::with_clock(BudgetConfig::default(), clock);
        RunContext::new(sample_recording(), guard)
    }

    fn result() -> StructuredResult {
        parse_model_output(&valid_model_output(), "m", 1).unwrap()
    }

    #[tokio::test]
    async fn test_delivered_after_one_failure() {
        let clock = Arc::new(ManualClock::new());
        let channel = Arc::new(ScriptedChatChannel::new().then_fail(ProviderError::http(503, "busy")));
        let store = Arc::new(InMemoryRecoveryStore::new());
        let dispatcher = NotificationDispatcher::new(channel.clone(), store.clone());
        let mut ctx = context(clock.clone());

        let outcome = dispatcher
            .deliver(&mut ctx, &RenderedMessage::new("t", "b"), Some(&result()))
            .await
            .unwrap();

        assert!(outcome.is_delivered());
        assert_eq!(channel.attempts(), 2);
        assert_eq!(ctx.audit().steps_named(NOTIFICATION_STEP).len(), 2);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(1)]);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_exhaustion_saves_recovery_and_sends_notice() {
        let clock = Arc::new(ManualClock::new());
        let channel = Arc::new(ScriptedChatChannel::failing(ProviderError::http(500, "down")));
        let store = Arc::new(InMemoryRecoveryStore::new());
        let dispatcher = NotificationDispatcher::new(channel.clone(), store.clone());
        let mut ctx = context(clock.clone());

        let mut long = result();
        long.transcription = "x".repeat(FIELD_CHAR_LIMIT * 2);
        let outcome = dispatcher
            .deliver(&mut ctx, &RenderedMessage::new("t", "b"), Some(&long))
            .await
            .unwrap();

        let DeliveryOutcome::Recovered(reference) = outcome else {
            panic!("expected recovery");
        };
        assert_eq!(reference.key.recording_id, ctx.recording().id);
        assert_eq!(store.save_count(), 1);

        let record = store
            .get(&RecoveryKey::new(ctx.recording().id.clone(), PipelineStage::Notification))
            .unwrap();
        assert_eq!(record.attempt_count, 3);
        assert_eq!(record.remediation, RemediationAction::ResendNotification);
        assert!(record.truncated);
        assert!(record.result.unwrap().transcription.ends_with(TRUNCATION_MARKER));

        // three attempts plus the secondary notice
        assert_eq!(channel.attempts(), 4);
        assert!(channel.titles().last().unwrap().contains("delivery failed"));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(1), Duration::from_secs(2)]);
    }

    #[tokio::test]
    async fn test_fatal_channel_error_stops_early() {
        let clock = Arc::new(ManualClock::new());
        let channel = Arc::new(ScriptedChatChannel::failing(ProviderError::http(404, "no webhook")));
        let store = Arc::new(InMemoryRecoveryStore::new());
        let dispatcher = NotificationDispatcher::new(channel.clone(), store.clone());
        let mut ctx = context(clock);

        let outcome = dispatcher
            .deliver(&mut ctx, &RenderedMessage::new("t", "b"), None)
            .await
            .unwrap();
        assert!(!outcome.is_delivered());
        assert_eq!(ctx.audit().steps_named(NOTIFICATION_STEP).len(), 1);
    }

    #[tokio::test]
    async fn test_budget_stop_before_first_post_keeps_cause() {
        let clock = Arc::new(ManualClock::new());
        let channel = Arc::new(ScriptedChatChannel::new());
        let store = Arc::new(InMemoryRecoveryStore::new());
        let dispatcher = NotificationDispatcher::new(channel.clone(), store.clone());
        let mut ctx = context(clock.clone());
        clock.advance(Duration::from_secs(400));

        let outcome = dispatcher
            .deliver(&mut ctx, &RenderedMessage::new("t", "b"), Some(&result()))
            .await
            .unwrap();
        assert!(!outcome.is_delivered());
        assert!(ctx.audit().steps_named(NOTIFICATION_STEP).is_empty());

        let checks = ctx.audit().steps_named("budget_check");
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].error_code.as_deref(), Some(codes::BUDGET_EXCEEDED));

        let record = store
            .get(&RecoveryKey::new(ctx.recording().id.clone(), PipelineStage::Notification))
            .unwrap();
        assert_eq!(record.attempt_count, 0);
        assert!(record
            .last_error
            .unwrap()
            .starts_with("execution budget exceeded at 'notification'"));
    }

    #[tokio::test]
    async fn test_stalled_post_is_cut_at_budget() {
        let clock = Arc::new(ManualClock::new());
        let channel = Arc::new(ScriptedChatChannel::stalling());
        let store = Arc::new(InMemoryRecoveryStore::new());
        let dispatcher = NotificationDispatcher::new(channel.clone(), store.clone())
            .with_secondary_timeout(Duration::from_millis(50));
        let guard = TimeoutBudgetGuard::with_clock(
            BudgetConfig::new(Duration::from_secs(6), Duration::from_secs(5)),
            clock,
        );
        let mut ctx = RunContext::new(sample_recording(), guard);

        let outcome = dispatcher
            .deliver(&mut ctx, &RenderedMessage::new("t", "b"), Some(&result()))
            .await
            .unwrap();
        assert!(!outcome.is_delivered());
        assert!(ctx.guard().is_exceeded());

        let steps = ctx.audit().steps_named(NOTIFICATION_STEP);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].error_code.as_deref(), Some(codes::BUDGET_EXCEEDED));

        let record = store
            .get(&RecoveryKey::new(ctx.recording().id.clone(), PipelineStage::Notification))
            .unwrap();
        assert_eq!(record.attempt_count, 1);
        assert!(record.last_error.unwrap().contains("execution budget exceeded"));
    }

    #[tokio::test]
    async fn test_recovery_failure_is_surfaced() {
        let clock = Arc::new(ManualClock::new());
        let channel = Arc::new(ScriptedChatChannel::failing(ProviderError::http(500, "down")));
        let store = Arc::new(InMemoryRecoveryStore::new());
        store.set_fail_saves(true);
        let dispatcher = NotificationDispatcher::new(channel, store.clone());
        let mut ctx = context(clock);

        let err = dispatcher
            .deliver(&mut ctx, &RenderedMessage::new("t", "b"), Some(&result()))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::RecoveryFailed { attempts: 3, .. }));
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_notify_failure_swallows_errors() {
        let clock = Arc::new(ManualClock::new());
        let channel = Arc::new(ScriptedChatChannel::failing(ProviderError::network("reset")));
        let dispatcher =
            NotificationDispatcher::new(channel, Arc::new(InMemoryRecoveryStore::new()));
        let mut ctx = context(clock);

        assert!(!dispatcher.notify_failure(&mut ctx, &RenderedMessage::new("t", "b")).await);
        assert_eq!(ctx.audit().steps_named("error_notification").len(), 1);
    }
}
