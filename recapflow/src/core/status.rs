//! Step status, run outcome, and pipeline stage enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The status of one audit step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepStatus {
    /// Step completed successfully.
    Success,
    /// Step failed.
    Error,
    /// Step completed with a non-fatal problem.
    Warn,
    /// Informational marker.
    Info,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Error => write!(f, "ERROR"),
            Self::Warn => write!(f, "WARN"),
            Self::Info => write!(f, "INFO"),
        }
    }
}

/// The aggregate classification of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// All five stages completed.
    Success,
    /// Artifacts persisted but notification or audit persistence failed.
    PartialSuccess,
    /// No usable artifacts were produced.
    Error,
}

impl RunOutcome {
    /// Returns true if the run produced usable artifacts.
    #[must_use]
    pub fn has_artifacts(&self) -> bool {
        matches!(self, Self::Success | Self::PartialSuccess)
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::PartialSuccess => write!(f, "partial_success"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// The fixed sequence of pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// (a) Fetch media from the recording provider.
    MediaAcquisition,
    /// (b) Transcribe and summarise via the model provider.
    AiAnalysis,
    /// (c) Upload video and derived documents.
    ArtifactPersistence,
    /// (d) Write the execution log.
    AuditPersistence,
    /// (e) Post the result to the chat channel.
    Notification,
}

impl PipelineStage {
    /// All stages in execution order.
    pub const ORDER: [Self; 5] = [
        Self::MediaAcquisition,
        Self::AiAnalysis,
        Self::ArtifactPersistence,
        Self::AuditPersistence,
        Self::Notification,
    ];

    /// Returns the stable snake_case name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MediaAcquisition => "media_acquisition",
            Self::AiAnalysis => "ai_analysis",
            Self::ArtifactPersistence => "artifact_persistence",
            Self::AuditPersistence => "audit_persistence",
            Self::Notification => "notification",
        }
    }

    /// Returns the stage that follows this one, if any.
    #[must_use]
    pub fn next(&self) -> Option<Self> {
        let idx = Self::ORDER.iter().position(|s| s == self)?;
        Self::ORDER.get(idx + 1).copied()
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_status_serialize() {
        let json = serde_json::to_string(&StepStatus::Warn).unwrap();
        assert_eq!(json, r#""WARN""#);

        let parsed: StepStatus = serde_json::from_str(r#""SUCCESS""#).unwrap();
        assert_eq!(parsed, StepStatus::Success);
    }

    #[test]
    fn test_run_outcome_display() {
        assert_eq!(RunOutcome::PartialSuccess.to_string(), "partial_success");
        assert_eq!(
            serde_json::to_string(&RunOutcome::PartialSuccess).unwrap(),
            r#""partial_success""#
        );
    }

    #[test]
    fn test_run_outcome_has_artifacts() {
        assert!(RunOutcome::Success.has_artifacts());
        assert!(RunOutcome::PartialSuccess.has_artifacts());
        assert!(!RunOutcome::Error.has_artifacts());
    }

    #[test]
    fn test_stage_order() {
        assert_eq!(
            PipelineStage::MediaAcquisition.next(),
            Some(PipelineStage::AiAnalysis)
        );
        assert_eq!(PipelineStage::Notification.next(), None);
        assert!(PipelineStage::AiAnalysis < PipelineStage::ArtifactPersistence);
    }

    #[test]
    fn test_stage_name_matches_serde() {
        for stage in PipelineStage::ORDER {
            let json = serde_json::to_string(&stage).unwrap();
            assert_eq!(json, format!("\"{}\"", stage.as_str()));
        }
    }
}
