//! What one run reports back.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::audit::AuditDocument;
use crate::core::{ArtifactRef, PipelineStage, RunOutcome, StructuredResult};
use crate::errors::RunError;
use crate::notify::DeliveryOutcome;
use crate::recovery::RecoveryReference;

fn default_media_secs() -> u64 {
    60
}

fn default_analysis_secs() -> u64 {
    120
}

fn default_artifact_secs() -> u64 {
    30
}

fn default_audit_secs() -> u64 {
    10
}

fn default_notification_secs() -> u64 {
    20
}

/// Worst-case cost of each stage, checked against the remaining budget
/// before the stage starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCosts {
    /// Media download.
    #[serde(default = "default_media_secs")]
    pub media_acquisition_secs: u64,
    /// Model analysis, including retries.
    #[serde(default = "default_analysis_secs")]
    pub ai_analysis_secs: u64,
    /// Artifact uploads.
    #[serde(default = "default_artifact_secs")]
    pub artifact_persistence_secs: u64,
    /// Interim audit write.
    #[serde(default = "default_audit_secs")]
    pub audit_persistence_secs: u64,
    /// Chat delivery.
    #[serde(default = "default_notification_secs")]
    pub notification_secs: u64,
}

impl Default for StageCosts {
    fn default() -> Self {
        Self {
            media_acquisition_secs: default_media_secs(),
            ai_analysis_secs: default_analysis_secs(),
            artifact_persistence_secs: default_artifact_secs(),
            audit_persistence_secs: default_audit_secs(),
            notification_secs: default_notification_secs(),
        }
    }
}

impl StageCosts {
    /// Every stage free; only the deadline itself is checked.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            media_acquisition_secs: 0,
            ai_analysis_secs: 0,
            artifact_persistence_secs: 0,
            audit_persistence_secs: 0,
            notification_secs: 0,
        }
    }

    /// Worst-case cost of `stage`.
    #[must_use]
    pub fn cost_of(&self, stage: PipelineStage) -> Duration {
        Duration::from_secs(match stage {
            PipelineStage::MediaAcquisition => self.media_acquisition_secs,
            PipelineStage::AiAnalysis => self.ai_analysis_secs,
            PipelineStage::ArtifactPersistence => self.artifact_persistence_secs,
            PipelineStage::AuditPersistence => self.audit_persistence_secs,
            PipelineStage::Notification => self.notification_secs,
        })
    }

    /// Sum of every stage cost.
    #[must_use]
    pub fn total(&self) -> Duration {
        PipelineStage::ORDER.iter().map(|s| self.cost_of(*s)).sum()
    }
}

/// The result of [`PipelineOrchestrator::run`](super::PipelineOrchestrator::run).
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    /// Run identifier.
    pub run_id: Uuid,
    /// Recording processed.
    pub recording_id: String,
    /// Run classification.
    pub status: RunOutcome,
    /// Run-level error, if any.
    pub error: Option<RunError>,
    /// Analysis result, if the AI stage succeeded.
    pub result: Option<StructuredResult>,
    /// Artifacts persisted (excluding the execution log).
    pub artifacts: Vec<ArtifactRef>,
    /// How the notification ended, if it was attempted or substituted.
    pub delivery: Option<DeliveryOutcome>,
    /// Recovery records written during the run.
    pub recovery: Vec<RecoveryReference>,
    /// The finalized execution log.
    pub audit: AuditDocument,
    /// Where the execution log was written, if the write succeeded.
    pub audit_ref: Option<ArtifactRef>,
    /// Whether the source recording may now be deleted.
    pub deletion_eligible: bool,
}

impl PipelineOutcome {
    /// Returns true for a fully successful run.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RunOutcome::Success
    }

    /// The run-level error code, if any.
    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_cost_defaults() {
        let costs = StageCosts::default();
        assert_eq!(costs.cost_of(PipelineStage::AiAnalysis), Duration::from_secs(120));
        assert_eq!(costs.total(), Duration::from_secs(240));
        assert_eq!(StageCosts::zero().total(), Duration::ZERO);
    }

    #[test]
    fn test_stage_costs_from_partial_toml() {
        let costs: StageCosts = toml::from_str("ai_analysis_secs = 200").unwrap();
        assert_eq!(costs.ai_analysis_secs, 200);
        assert_eq!(costs.notification_secs, 20);
    }
}
