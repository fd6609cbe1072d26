//! Error types for the recapflow pipeline.
//!
//! Errors are grouped by the component that raises them. The three-way
//! retry classification (plus the budget and delivery conditions) lives in
//! [`ErrorClass`]; run-level failures are reported as a serialisable
//! [`RunError`] carrying one of the stable [`codes`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::core::PipelineStage;

/// Stable error codes written into audit documents and recovery records.
pub mod codes {
    /// No usable media could be fetched for the recording.
    pub const MEDIA_UNAVAILABLE: &str = "MEDIA_UNAVAILABLE";
    /// The model provider rejected the request (auth, malformed request).
    pub const AI_FATAL: &str = "AI_FATAL";
    /// Every model in the fallback chain exhausted its attempts.
    pub const AI_EXHAUSTED: &str = "AI_EXHAUSTED";
    /// Model output never validated against the summary schema.
    pub const AI_STRUCTURAL: &str = "AI_STRUCTURAL";
    /// The wall-clock budget ran out.
    pub const BUDGET_EXCEEDED: &str = "BUDGET_EXCEEDED";
    /// Uploading derived artifacts failed.
    pub const ARTIFACT_PERSISTENCE_FAILED: &str = "ARTIFACT_PERSISTENCE_FAILED";
    /// Writing the execution log failed.
    pub const AUDIT_PERSISTENCE_FAILED: &str = "AUDIT_PERSISTENCE_FAILED";
    /// Chat delivery failed and the payload went to the recovery store.
    pub const NOTIFICATION_DEFERRED: &str = "NOTIFICATION_DEFERRED";
    /// Chat delivery failed and the recovery write failed too.
    pub const NOTIFICATION_LOST: &str = "NOTIFICATION_LOST";
}

/// Classification of a failure, driving retry and run-level decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Quota, overload, internal 5xx, network. Retried with backoff.
    Transient,
    /// Authentication or malformed request. Never retried.
    Fatal,
    /// Output did not validate against the summary schema.
    Structural,
    /// Cooperative cancellation from the budget guard.
    BudgetExceeded,
    /// The chat channel could not be reached.
    DownstreamDelivery,
}

impl ErrorClass {
    /// Returns true if a failure of this class may be retried locally.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient | Self::Structural)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Fatal => write!(f, "fatal"),
            Self::Structural => write!(f, "structural"),
            Self::BudgetExceeded => write!(f, "budget_exceeded"),
            Self::DownstreamDelivery => write!(f, "downstream_delivery"),
        }
    }
}

/// A failure reported by an external collaborator (model API, chat API,
/// recording provider, blob store backend).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", self.describe())]
pub struct ProviderError {
    /// HTTP status, when the failure came from an HTTP response.
    pub status: Option<u16>,
    /// Provider message or transport error text.
    pub message: String,
    /// Server-suggested wait before retrying.
    pub retry_after: Option<Duration>,
}

impl ProviderError {
    /// Creates an error from an HTTP status and body.
    #[must_use]
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
            retry_after: None,
        }
    }

    /// Creates a transport-level error with no HTTP status.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Creates an error for a request the provider will never accept.
    #[must_use]
    pub fn malformed_request(message: impl Into<String>) -> Self {
        Self::http(400, format!("malformed request: {}", message.into()))
    }

    /// Sets the retry-after hint.
    #[must_use]
    pub fn with_retry_after(mut self, wait: Duration) -> Self {
        self.retry_after = Some(wait);
        self
    }

    fn describe(&self) -> String {
        match self.status {
            Some(status) => format!("HTTP {}: {}", status, self.message),
            None => self.message.clone(),
        }
    }
}

/// Raised when model output does not validate against the summary schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("response failed schema validation: {}", .problems.join("; "))]
pub struct SchemaError {
    /// Every problem found, in discovery order.
    pub problems: Vec<String>,
}

impl SchemaError {
    /// Creates a schema error with a single problem.
    #[must_use]
    pub fn new(problem: impl Into<String>) -> Self {
        Self {
            problems: vec![problem.into()],
        }
    }

    /// Creates a schema error from a list of problems.
    #[must_use]
    pub fn from_problems(problems: Vec<String>) -> Self {
        Self { problems }
    }
}

/// Typed cancellation condition raised by the budget guard.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "execution budget exceeded at '{label}' ({}ms elapsed, deadline {}ms)",
    .elapsed.as_millis(),
    .deadline.as_millis()
)]
pub struct BudgetExceeded {
    /// Checkpoint that observed the condition.
    pub label: String,
    /// Time elapsed since the run started.
    pub elapsed: Duration,
    /// Effective deadline (hard ceiling minus safety margin).
    pub deadline: Duration,
}

/// Errors surfaced by the resilient model invoker.
#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    /// Non-retryable provider failure.
    #[error("model '{model}' rejected the request: {source}")]
    Fatal {
        /// Model that produced the failure.
        model: String,
        /// Underlying provider failure.
        source: ProviderError,
    },

    /// Every model exhausted its transient retry ceiling.
    #[error("all models exhausted after {attempts} attempts ({}): {last_error}", .models.join(", "))]
    Exhausted {
        /// Models tried, in order.
        models: Vec<String>,
        /// Total attempts across all models.
        attempts: u32,
        /// The last failure observed.
        last_error: ProviderError,
    },

    /// Model output never validated, even after a corrective re-prompt.
    #[error("no schema-valid response after {attempts} attempts ({}): {schema}", .models.join(", "))]
    Structural {
        /// Models tried, in order.
        models: Vec<String>,
        /// Total attempts across all models.
        attempts: u32,
        /// The last validation failure.
        schema: SchemaError,
    },

    /// The budget guard cancelled the retry loop.
    #[error(transparent)]
    BudgetExceeded(#[from] BudgetExceeded),

    /// Neither the catalog nor the preference list yielded a model.
    #[error("no models available for analysis")]
    NoModelsAvailable,
}

impl AnalysisError {
    /// Returns the classification of this failure.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Fatal { .. } | Self::NoModelsAvailable | Self::Structural { .. } => {
                ErrorClass::Fatal
            }
            Self::Exhausted { .. } => ErrorClass::Transient,
            Self::BudgetExceeded(_) => ErrorClass::BudgetExceeded,
        }
    }

    /// Returns the stable run-level error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Fatal { .. } | Self::NoModelsAvailable => codes::AI_FATAL,
            Self::Exhausted { .. } => codes::AI_EXHAUSTED,
            Self::Structural { .. } => codes::AI_STRUCTURAL,
            Self::BudgetExceeded(_) => codes::BUDGET_EXCEEDED,
        }
    }
}

/// Errors from blob storage and the recovery store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Document could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The requested object does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A path segment is empty or escapes the store root.
    #[error("Invalid path segment: {0}")]
    InvalidPath(String),

    /// Remote storage backend failure.
    #[error("Storage backend error: {0}")]
    Backend(ProviderError),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors from the notification dispatcher.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Delivery was exhausted and the recovery write failed as well.
    #[error("delivery failed after {attempts} attempts ({delivery}) and recovery save failed: {storage}")]
    RecoveryFailed {
        /// Attempts made against the chat channel.
        attempts: u32,
        /// What stopped delivery.
        delivery: DeliveryFailure,
        /// Recovery store failure.
        storage: StorageError,
    },
}

/// What stopped a delivery loop.
#[derive(Debug, Clone, Error)]
pub enum DeliveryFailure {
    /// The chat channel rejected the last attempt.
    #[error(transparent)]
    Channel(ProviderError),

    /// The run budget ran out before or during an attempt.
    #[error(transparent)]
    Budget(BudgetExceeded),
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is out of range or inconsistent.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// The TOML document could not be parsed.
    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment override could not be parsed.
    #[error("Invalid value for {key}: {value}")]
    Env {
        /// Environment variable name.
        key: String,
        /// Offending value.
        value: String,
    },
}

/// The main error type for recapflow operations.
#[derive(Debug, Error)]
pub enum RecapflowError {
    /// A collaborator failure.
    #[error("{0}")]
    Provider(#[from] ProviderError),

    /// The AI stage failed.
    #[error("{0}")]
    Analysis(#[from] AnalysisError),

    /// Storage failed.
    #[error("{0}")]
    Storage(#[from] StorageError),

    /// Delivery failed without a recovery substitute.
    #[error("{0}")]
    Delivery(#[from] DeliveryError),

    /// Configuration was rejected.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// The budget ran out.
    #[error("{0}")]
    Budget(#[from] BudgetExceeded),
}

/// Run-level error summary persisted in audit documents and outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    /// Stable error code (see [`codes`]).
    pub code: String,
    /// Classification of the failure.
    pub class: ErrorClass,
    /// Human-readable message.
    pub message: String,
    /// Stage that failed, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<PipelineStage>,
}

impl RunError {
    /// Creates a new run error.
    #[must_use]
    pub fn new(code: impl Into<String>, class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            class,
            message: message.into(),
            stage: None,
        }
    }

    /// Sets the failing stage.
    #[must_use]
    pub fn at_stage(mut self, stage: PipelineStage) -> Self {
        self.stage = Some(stage);
        self
    }

    /// Builds a run error from an analysis failure.
    #[must_use]
    pub fn from_analysis(err: &AnalysisError) -> Self {
        Self::new(err.code(), err.class(), err.to_string()).at_stage(PipelineStage::AiAnalysis)
    }

    /// Builds a run error from a budget cancellation.
    #[must_use]
    pub fn from_budget(err: &BudgetExceeded, stage: PipelineStage) -> Self {
        Self::new(codes::BUDGET_EXCEEDED, ErrorClass::BudgetExceeded, err.to_string())
            .at_stage(stage)
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::http(503, "model is overloaded");
        assert_eq!(err.to_string(), "HTTP 503: model is overloaded");

        let err = ProviderError::network("connection reset");
        assert_eq!(err.to_string(), "connection reset");
    }

    #[test]
    fn test_malformed_request_is_400() {
        let err = ProviderError::malformed_request("media too large");
        assert_eq!(err.status, Some(400));
        assert!(err.message.contains("media too large"));
    }

    #[test]
    fn test_schema_error_lists_problems() {
        let err = SchemaError::from_problems(vec![
            "summary.purpose is empty".to_string(),
            "transcription is empty".to_string(),
        ]);
        let text = err.to_string();
        assert!(text.contains("summary.purpose is empty; transcription is empty"));
    }

    #[test]
    fn test_budget_exceeded_display() {
        let err = BudgetExceeded {
            label: "ai_analysis".to_string(),
            elapsed: Duration::from_secs(356),
            deadline: Duration::from_secs(355),
        };
        assert!(err.to_string().contains("356000ms elapsed"));
    }

    #[test]
    fn test_analysis_error_codes() {
        let fatal = AnalysisError::Fatal {
            model: "m".to_string(),
            source: ProviderError::http(401, "bad key"),
        };
        assert_eq!(fatal.code(), codes::AI_FATAL);
        assert_eq!(fatal.class(), ErrorClass::Fatal);

        let exhausted = AnalysisError::Exhausted {
            models: vec!["a".to_string(), "b".to_string()],
            attempts: 6,
            last_error: ProviderError::http(429, "quota"),
        };
        assert_eq!(exhausted.code(), codes::AI_EXHAUSTED);
        assert!(exhausted.to_string().contains("a, b"));
    }

    #[test]
    fn test_run_error_serialization() {
        let err = RunError::new(codes::MEDIA_UNAVAILABLE, ErrorClass::Fatal, "no audio")
            .at_stage(PipelineStage::MediaAcquisition);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "MEDIA_UNAVAILABLE");
        assert_eq!(json["class"], "fatal");
        assert_eq!(json["stage"], "media_acquisition");
    }

    #[test]
    fn test_error_class_retryable() {
        assert!(ErrorClass::Transient.is_retryable());
        assert!(ErrorClass::Structural.is_retryable());
        assert!(!ErrorClass::Fatal.is_retryable());
        assert!(!ErrorClass::BudgetExceeded.is_retryable());
    }
}
