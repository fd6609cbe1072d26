//! Step records and the timer that produces them.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::core::StepStatus;
use crate::observability::SpanTimer;
use crate::utils::{millis, Timestamp};

/// One entry in the execution ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Position in the ledger, assigned on append.
    #[serde(default)]
    pub sequence: u32,
    /// Step name.
    pub step: String,
    /// Outcome of the step.
    pub status: StepStatus,
    /// When the step began.
    pub started_at: Timestamp,
    /// When the step ended.
    pub ended_at: Timestamp,
    /// Wall-clock duration.
    pub duration_ms: u64,
    /// Free-form detail.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub detail: BTreeMap<String, Value>,
    /// Error code, for failed steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Error message, for failed steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl StepRecord {
    /// Creates an instantaneous record.
    #[must_use]
    pub fn new(step: impl Into<String>, status: StepStatus) -> Self {
        let now = Utc::now();
        Self {
            sequence: 0,
            step: step.into(),
            status,
            started_at: now,
            ended_at: now,
            duration_ms: 0,
            detail: BTreeMap::new(),
            error_code: None,
            error_message: None,
        }
    }

    /// Adds a detail entry.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.detail.insert(key.into(), value.into());
        self
    }

    /// Merges a detail map.
    #[must_use]
    pub fn with_details(mut self, detail: BTreeMap<String, Value>) -> Self {
        self.detail.extend(detail);
        self
    }

    /// Sets the error code and message.
    #[must_use]
    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self.error_message = Some(message.into());
        self
    }

    /// Returns a detail value.
    #[must_use]
    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.detail.get(key)
    }
}

/// Measures a step from start to finish.
#[derive(Debug)]
pub struct StepTimer {
    started_at: Timestamp,
    span: SpanTimer,
}

impl StepTimer {
    /// Starts timing `step`.
    #[must_use]
    pub fn start(step: impl Into<String>) -> Self {
        Self {
            started_at: Utc::now(),
            span: SpanTimer::start(step),
        }
    }

    /// The step name.
    #[must_use]
    pub fn step(&self) -> &str {
        self.span.name()
    }

    /// Stops the timer and builds the record.
    #[must_use]
    pub fn finish(self, status: StepStatus) -> StepRecord {
        let duration_ms = millis(self.span.elapsed());
        let mut record = StepRecord::new(self.span.name(), status);
        record.started_at = self.started_at;
        record.ended_at = Utc::now();
        record.duration_ms = duration_ms;
        record
    }
}
