//! Model selection, retry and fallback around a [`ModelProvider`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::parse::parse_model_output;
use super::prompt::{analysis_prompt, strict_prompt};
use super::provider::{ModelInfo, ModelProvider};
use crate::audit::{StepRecord, StepTimer};
use crate::core::{MediaPayload, StepStatus, StructuredResult};
use crate::errors::{codes, AnalysisError, ErrorClass, ProviderError, SchemaError};
use crate::pipeline::{RetryPolicy, RunContext};

/// Audit step name for one model call.
pub const ANALYSIS_STEP: &str = "ai_analysis";

/// Audit step name for the model choice.
pub const SELECTION_STEP: &str = "model_selection";

/// How the invoker picks models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSelection {
    /// Query the catalog and prefer entries on the preference list.
    #[default]
    Auto,
    /// Use the preference list as-is.
    Fixed,
}

impl fmt::Display for ModelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Fixed => write!(f, "fixed"),
        }
    }
}

enum LastFailure {
    Provider(ProviderError),
    Schema(SchemaError),
}

/// Calls the model provider until one model yields a schema-valid result.
///
/// Per model: transient failures are retried with policy backoff up to the
/// attempt ceiling, then the next model is tried with a fresh counter. The
/// first structural failure on a model is retried at once with a stricter
/// prompt and does not count against the ceiling; later ones count like
/// transient failures. A fatal failure ends the call. The budget guard is
/// consulted before every attempt and before every backoff sleep.
pub struct ResilientModelInvoker {
    provider: Arc<dyn ModelProvider>,
    selection: ModelSelection,
    preferences: Vec<String>,
    policy: RetryPolicy,
}

impl ResilientModelInvoker {
    /// Creates an invoker with the default model retry policy.
    #[must_use]
    pub fn new(provider: Arc<dyn ModelProvider>, preferences: Vec<String>) -> Self {
        Self {
            provider,
            selection: ModelSelection::Auto,
            preferences,
            policy: RetryPolicy::model_default(),
        }
    }

    /// Sets the selection mode.
    #[must_use]
    pub fn with_selection(mut self, selection: ModelSelection) -> Self {
        self.selection = selection;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The retry policy in use.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Resolves the ordered list of models to try.
    pub async fn candidate_models(&self) -> Result<Vec<String>, AnalysisError> {
        let models = match self.selection {
            ModelSelection::Fixed => self.preferences.clone(),
            ModelSelection::Auto => match self.provider.list_models().await {
                Ok(catalog) => order_catalog(&catalog, &self.preferences),
                Err(err) => {
                    warn!(
                        provider = self.provider.name(),
                        error = %err,
                        "Model catalog unavailable, using preference list"
                    );
                    self.preferences.clone()
                }
            },
        };
        if models.is_empty() {
            return Err(AnalysisError::NoModelsAvailable);
        }
        Ok(models)
    }

    /// Produces one validated result for `media`, or a classified failure.
    ///
    /// Every model call is recorded as an `ai_analysis` step in the run's
    /// audit log.
    pub async fn analyze(
        &self,
        ctx: &mut RunContext,
        media: &MediaPayload,
    ) -> Result<StructuredResult, AnalysisError> {
        let models = ctx
            .guard()
            .bounded(SELECTION_STEP, self.candidate_models())
            .await??;
        ctx.record(
            StepRecord::new(SELECTION_STEP, StepStatus::Info)
                .with_detail("mode", self.selection.to_string())
                .with_detail("candidates", models.clone())
                .with_detail("media_bytes", media.len()),
        );
        info!(
            run_id = %ctx.run_id(),
            provider = self.provider.name(),
            models = ?models,
            "Starting analysis"
        );

        let base_prompt = analysis_prompt(ctx.recording());
        let mut total_attempts = 0u32;
        let mut last: Option<LastFailure> = None;

        for model in &models {
            let mut charged = 0u32;
            let mut reprompted = false;
            let mut prompt = base_prompt.clone();

            loop {
                ctx.guard().ensure(ANALYSIS_STEP)?;
                total_attempts += 1;
                let timer = StepTimer::start(ANALYSIS_STEP);

                let reply = ctx
                    .guard()
                    .bounded(ANALYSIS_STEP, self.provider.generate(model, media, &prompt))
                    .await;
                let reply = match reply {
                    Ok(reply) => reply,
                    Err(budget) => {
                        ctx.record(failure_step(
                            timer,
                            model,
                            total_attempts,
                            ErrorClass::BudgetExceeded,
                            codes::BUDGET_EXCEEDED,
                            &budget.to_string(),
                        ));
                        warn!(
                            run_id = %ctx.run_id(),
                            model = %model,
                            attempt = total_attempts,
                            "Model call outlived the run budget"
                        );
                        return Err(budget.into());
                    }
                };

                let failure = match reply {
                    Ok(raw) => match parse_model_output(&raw.text, model, total_attempts) {
                        Ok(result) => {
                            let mut step = timer
                                .finish(StepStatus::Success)
                                .with_detail("model", model.as_str())
                                .with_detail("attempt", total_attempts)
                                .with_detail("reprompted", reprompted)
                                .with_detail("transcript_chars", result.metadata.transcript_chars);
                            if raw.total_tokens() > 0 {
                                step = step.with_detail("tokens", raw.total_tokens());
                            }
                            ctx.record(step);
                            info!(
                                run_id = %ctx.run_id(),
                                model = %model,
                                attempts = total_attempts,
                                "Analysis succeeded"
                            );
                            return Ok(result);
                        }
                        Err(schema) => {
                            ctx.record(failure_step(
                                timer,
                                model,
                                total_attempts,
                                ErrorClass::Structural,
                                codes::AI_STRUCTURAL,
                                &schema.to_string(),
                            ));
                            warn!(
                                run_id = %ctx.run_id(),
                                model = %model,
                                attempt = total_attempts,
                                problems = ?schema.problems,
                                "Model output failed schema validation"
                            );
                            if !reprompted {
                                reprompted = true;
                                prompt = strict_prompt(ctx.recording(), &schema.problems);
                                continue;
                            }
                            LastFailure::Schema(schema)
                        }
                    },
                    Err(err) => {
                        let class = self.policy.classify(&err);
                        let code = if class == ErrorClass::Fatal {
                            codes::AI_FATAL
                        } else {
                            codes::AI_EXHAUSTED
                        };
                        ctx.record(failure_step(
                            timer,
                            model,
                            total_attempts,
                            class,
                            code,
                            &err.to_string(),
                        ));
                        if class == ErrorClass::Fatal {
                            warn!(
                                run_id = %ctx.run_id(),
                                model = %model,
                                error = %err,
                                "Fatal provider error, not retrying"
                            );
                            return Err(AnalysisError::Fatal {
                                model: model.clone(),
                                source: err,
                            });
                        }
                        warn!(
                            run_id = %ctx.run_id(),
                            model = %model,
                            attempt = total_attempts,
                            error = %err,
                            "Transient provider error"
                        );
                        LastFailure::Provider(err)
                    }
                };

                charged += 1;
                let delay = match &failure {
                    LastFailure::Provider(err) => self.policy.delay_after(charged - 1, err),
                    LastFailure::Schema(_) => self.policy.delay_for(charged - 1),
                };
                last = Some(failure);

                if !self.policy.allows_retry(charged) {
                    info!(
                        run_id = %ctx.run_id(),
                        model = %model,
                        attempts = charged,
                        "Attempt ceiling reached, moving to next model"
                    );
                    break;
                }

                ctx.guard().ensure_affordable("ai_backoff", delay)?;
                debug!(model = %model, delay_ms = delay.as_millis(), "Backing off");
                ctx.guard().sleep(delay).await;
            }
        }

        Err(match last {
            Some(LastFailure::Schema(schema)) => AnalysisError::Structural {
                models,
                attempts: total_attempts,
                schema,
            },
            Some(LastFailure::Provider(last_error)) => AnalysisError::Exhausted {
                models,
                attempts: total_attempts,
                last_error,
            },
            None => AnalysisError::NoModelsAvailable,
        })
    }
}

fn failure_step(
    timer: StepTimer,
    model: &str,
    attempt: u32,
    class: ErrorClass,
    code: &str,
    message: &str,
) -> StepRecord {
    timer
        .finish(StepStatus::Error)
        .with_detail("model", model)
        .with_detail("attempt", attempt)
        .with_detail("class", class.to_string())
        .with_error(code, message)
}

fn bare_id(id: &str) -> &str {
    id.strip_prefix("models/").unwrap_or(id)
}

/// Orders the catalog: preferred models in preference order, or the whole
/// generation-capable catalog in provider order when none match.
fn order_catalog(catalog: &[ModelInfo], preferences: &[String]) -> Vec<String> {
    let usable: Vec<&str> = catalog
        .iter()
        .filter(|m| m.supports_generation)
        .map(|m| bare_id(&m.id))
        .collect();

    let preferred: Vec<String> = preferences
        .iter()
        .filter(|p| usable.contains(&bare_id(p)))
        .map(|p| bare_id(p).to_string())
        .collect();

    if preferred.is_empty() {
        usable.into_iter().map(str::to_string).collect()
    } else {
        preferred
    }
}

impl fmt::Debug for ResilientModelInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientModelInvoker")
            .field("provider", &self.provider.name())
            .field("selection", &self.selection)
            .field("preferences", &self.preferences)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::{BudgetConfig, ManualClock, TimeoutBudgetGuard};
    use crate::core::MediaKind;
    use crate::testing::{sample_recording, valid_model_output, ScriptedModelProvider};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn context(clock: Arc<ManualClock>, ceiling: u64) -> RunContext {
        let config = BudgetConfig::new(Duration::from_secs(ceiling), Duration::from_secs(5));
        RunContext::new(sample_recording(), TimeoutBudgetGuard::with_clock(config, clock))
    }

    fn media() -> MediaPayload {
        MediaPayload::new(MediaKind::Audio, "audio/mp4", vec![1, 2, 3])
    }

    fn preferences() -> Vec<String> {
        vec!["pro".to_string(), "flash".to_string()]
    }

    #[test]
    fn test_order_catalog_prefers_list() {
        let catalog = vec![
            ModelInfo::new("models/flash"),
            ModelInfo::new("models/pro"),
            ModelInfo::new("models/other"),
        ];
        assert_eq!(order_catalog(&catalog, &preferences()), vec!["pro", "flash"]);
    }

    #[test]
    fn test_order_catalog_falls_back_to_catalog_order() {
        let mut embed = ModelInfo::new("embed");
        embed.supports_generation = false;
        let catalog = vec![ModelInfo::new("b"), embed, ModelInfo::new("a")];
        assert_eq!(order_catalog(&catalog, &preferences()), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_catalog_failure_uses_preferences() {
        let provider = Arc::new(ScriptedModelProvider::new().with_catalog_error(ProviderError::http(500, "x")));
        let invoker = ResilientModelInvoker::new(provider, preferences());
        assert_eq!(invoker.candidate_models().await.unwrap(), preferences());
    }

    #[tokio::test]
    async fn test_transient_then_success_same_model() {
        let clock = Arc::new(ManualClock::new());
        let provider = Arc::new(
            ScriptedModelProvider::new()
                .then_error(ProviderError::http(503, "overloaded"))
                .then_error(ProviderError::http(503, "overloaded"))
                .then_text(valid_model_output()),
        );
        let invoker = ResilientModelInvoker::new(provider.clone(), preferences())
            .with_selection(ModelSelection::Fixed);
        let mut ctx = context(clock.clone(), 360);

        let result = invoker.analyze(&mut ctx, &media()).await.unwrap();
        assert_eq!(result.metadata.model, "pro");
        assert_eq!(result.metadata.attempts, 3);
        assert_eq!(provider.models_called(), vec!["pro", "pro", "pro"]);

        let steps = ctx.audit().steps_named(ANALYSIS_STEP);
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].status, StepStatus::Error);
        assert_eq!(steps[0].detail("class"), Some(&serde_json::json!("transient")));
        assert_eq!(steps[2].status, StepStatus::Success);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(2), Duration::from_secs(4)]);
    }

    #[tokio::test]
    async fn test_ceiling_advances_to_next_model() {
        let clock = Arc::new(ManualClock::new());
        let provider = Arc::new(
            ScriptedModelProvider::new()
                .then_error(ProviderError::http(429, "quota"))
                .then_error(ProviderError::http(429, "quota"))
                .then_error(ProviderError::http(429, "quota"))
                .then_text(valid_model_output()),
        );
        let invoker = ResilientModelInvoker::new(provider.clone(), preferences())
            .with_selection(ModelSelection::Fixed);
        let mut ctx = context(clock, 360);

        let result = invoker.analyze(&mut ctx, &media()).await.unwrap();
        assert_eq!(result.metadata.model, "flash");
        assert_eq!(provider.models_called(), vec!["pro", "pro", "pro", "flash"]);
    }

    #[tokio::test]
    async fn test_fatal_never_retries() {
        let clock = Arc::new(ManualClock::new());
        let provider = Arc::new(
            ScriptedModelProvider::new().then_error(ProviderError::http(401, "API key not valid")),
        );
        let invoker = ResilientModelInvoker::new(provider.clone(), preferences())
            .with_selection(ModelSelection::Fixed);
        let mut ctx = context(clock.clone(), 360);

        let err = invoker.analyze(&mut ctx, &media()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Fatal { .. }));
        assert_eq!(err.code(), codes::AI_FATAL);
        assert_eq!(provider.call_count(), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_structural_reprompts_once_without_charge() {
        let clock = Arc::new(ManualClock::new());
        let provider = Arc::new(
            ScriptedModelProvider::new()
                .then_text("Sorry, here is a summary in prose.")
                .then_text(valid_model_output()),
        );
        let invoker = ResilientModelInvoker::new(provider.clone(), preferences())
            .with_selection(ModelSelection::Fixed);
        let mut ctx = context(clock.clone(), 360);

        let result = invoker.analyze(&mut ctx, &media()).await.unwrap();
        assert_eq!(result.metadata.attempts, 2);
        assert!(clock.sleeps().is_empty());
        assert!(provider.prompts()[1].contains("ONLY the JSON object"));
    }

    #[tokio::test]
    async fn test_persistent_structural_is_surfaced() {
        let clock = Arc::new(ManualClock::new());
        let provider = Arc::new(ScriptedModelProvider::new().with_fallback_text("not json"));
        let invoker = ResilientModelInvoker::new(provider.clone(), vec!["pro".to_string()])
            .with_selection(ModelSelection::Fixed);
        let mut ctx = context(clock, 360);

        let err = invoker.analyze(&mut ctx, &media()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Structural { .. }));
        assert_eq!(err.class(), ErrorClass::Fatal);
        // one free re-prompt plus three charged attempts
        assert_eq!(provider.call_count(), 4);
    }

    #[tokio::test]
    async fn test_budget_stops_retry_loop() {
        let clock = Arc::new(ManualClock::new());
        let provider = Arc::new(
            ScriptedModelProvider::new()
                .with_fallback_error(ProviderError::http(503, "overloaded"))
                .advancing(clock.clone(), Duration::from_secs(25)),
        );
        let invoker = ResilientModelInvoker::new(provider.clone(), preferences())
            .with_selection(ModelSelection::Fixed);
        let mut ctx = context(clock, 60);

        let err = invoker.analyze(&mut ctx, &media()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::BudgetExceeded(_)));
        assert!(provider.call_count() < 3);
        assert!(ctx.guard().is_exceeded());
    }

    #[tokio::test]
    async fn test_stalled_call_is_cut_at_budget() {
        let clock = Arc::new(ManualClock::new());
        let provider = Arc::new(ScriptedModelProvider::new().stalling());
        let invoker = ResilientModelInvoker::new(provider.clone(), preferences())
            .with_selection(ModelSelection::Fixed);
        let mut ctx = context(clock, 6);

        let err = invoker.analyze(&mut ctx, &media()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::BudgetExceeded(_)));
        assert_eq!(err.class(), ErrorClass::BudgetExceeded);
        assert_eq!(provider.call_count(), 1);

        let steps = ctx.audit().steps_named(ANALYSIS_STEP);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].error_code.as_deref(), Some(codes::BUDGET_EXCEEDED));
        assert_eq!(ctx.guard().exceeded_at().as_deref(), Some(ANALYSIS_STEP));
    }
}
