//! The durable audit document.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::step::StepRecord;
use crate::core::{sanitize_name, ArtifactRef, RunOutcome, StepStatus};
use crate::errors::{RunError, StorageError};
use crate::utils::Timestamp;

/// Version of the persisted audit layout.
pub const AUDIT_SCHEMA_VERSION: u32 = 1;

/// Run status as written in the audit document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// Interim snapshot; the run has not ended.
    Running,
    /// All stages completed.
    Success,
    /// Artifacts persisted, notification or audit deferred.
    PartialSuccess,
    /// No usable artifacts.
    Error,
}

impl From<RunOutcome> for AuditStatus {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Success => Self::Success,
            RunOutcome::PartialSuccess => Self::PartialSuccess,
            RunOutcome::Error => Self::Error,
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::PartialSuccess => write!(f, "partial_success"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Step counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCounts {
    /// SUCCESS steps.
    pub success: u32,
    /// ERROR steps.
    pub error: u32,
    /// WARN steps.
    pub warn: u32,
    /// INFO steps.
    pub info: u32,
    /// All steps.
    pub total: u32,
}

impl StepCounts {
    /// Tallies a list of steps.
    #[must_use]
    pub fn from_steps(steps: &[StepRecord]) -> Self {
        steps.iter().fold(Self::default(), |mut counts, step| {
            match step.status {
                StepStatus::Success => counts.success += 1,
                StepStatus::Error => counts.error += 1,
                StepStatus::Warn => counts.warn += 1,
                StepStatus::Info => counts.info += 1,
            }
            counts.total += 1;
            counts
        })
    }
}

/// Serialised execution log of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditDocument {
    /// Layout version.
    pub schema_version: u32,
    /// Run identifier.
    pub run_id: String,
    /// Recording identifier.
    pub recording_id: String,
    /// Recording topic.
    pub recording_topic: String,
    /// Recording start time; decides the storage partition.
    pub recording_start: Timestamp,
    /// When the run began.
    pub started_at: Timestamp,
    /// When the run ended; absent on interim snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<Timestamp>,
    /// Run duration so far.
    pub total_duration_ms: u64,
    /// Overall status.
    pub status: AuditStatus,
    /// Step tallies.
    pub counts: StepCounts,
    /// Every recorded step, in order.
    pub steps: Vec<StepRecord>,
    /// Artifacts persisted during the run.
    #[serde(default)]
    pub artifacts: Vec<ArtifactRef>,
    /// Run-level error, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
}

impl AuditDocument {
    /// Document file name: `execution-log_<recording_id>_<run_id>.json`.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!(
            "execution-log_{}_{}.json",
            sanitize_name(&self.recording_id),
            self.run_id
        )
    }

    /// Returns true for interim snapshots.
    #[must_use]
    pub fn is_interim(&self) -> bool {
        self.status == AuditStatus::Running
    }

    /// Pretty-printed JSON bytes.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, StorageError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// JSON value, used for the event-sink fallback.
    pub fn to_value(&self) -> Result<serde_json::Value, StorageError> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let steps = vec![
            StepRecord::new("a", StepStatus::Success),
            StepRecord::new("b", StepStatus::Error),
            StepRecord::new("c", StepStatus::Error),
            StepRecord::new("d", StepStatus::Info),
        ];
        let counts = StepCounts::from_steps(&steps);
        assert_eq!(
            counts,
            StepCounts {
                success: 1,
                error: 2,
                warn: 0,
                info: 1,
                total: 4
            }
        );
    }

    #[test]
    fn test_status_from_outcome() {
        assert_eq!(
            AuditStatus::from(RunOutcome::PartialSuccess).to_string(),
            "partial_success"
        );
    }
}
