//! Recovery record types.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::{sanitize_name, ArtifactRef, PipelineStage, Recording, StructuredResult};
use crate::utils::{stable_reference_id, Timestamp};

/// Version of the persisted recovery layout.
pub const RECOVERY_SCHEMA_VERSION: u32 = 1;

/// Identity of a recovery record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecoveryKey {
    /// Recording the record belongs to.
    pub recording_id: String,
    /// Stage that could not complete.
    pub failing_stage: PipelineStage,
}

impl RecoveryKey {
    /// Creates a key.
    #[must_use]
    pub fn new(recording_id: impl Into<String>, failing_stage: PipelineStage) -> Self {
        Self {
            recording_id: recording_id.into(),
            failing_stage,
        }
    }

    /// `<recording_id>__<stage>`, safe for blob names.
    #[must_use]
    pub fn file_stem(&self) -> String {
        format!("{}__{}", sanitize_name(&self.recording_id), self.failing_stage)
    }

    /// Blob name of the record.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.json", self.file_stem())
    }

    /// Stable reference id derived from the key.
    #[must_use]
    pub fn reference_id(&self) -> String {
        stable_reference_id(&[&self.file_stem()])
    }

    /// The stage named by a record blob name, if `name` has that shape.
    ///
    /// The recording id in a blob name is sanitised and cannot be recovered
    /// from it; read the stored record for the full key.
    #[must_use]
    pub fn stage_in_file_name(name: &str) -> Option<PipelineStage> {
        let stem = name.strip_suffix(".json")?;
        let (_, stage) = stem.rsplit_once("__")?;
        serde_json::from_value(serde_json::Value::String(stage.to_string())).ok()
    }
}

impl fmt::Display for RecoveryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.recording_id, self.failing_stage)
    }
}

/// What an operator or the replayer should do with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationAction {
    /// Artifacts are stored; only the chat message is missing.
    ResendNotification,
    /// The result exists but its documents were never stored.
    PersistArtifacts,
    /// Needs a human.
    ManualReview,
}

impl fmt::Display for RemediationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResendNotification => write!(f, "resend_notification"),
            Self::PersistArtifacts => write!(f, "persist_artifacts"),
            Self::ManualReview => write!(f, "manual_review"),
        }
    }
}

/// The recording fields a record keeps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingIdentity {
    /// Meeting identifier.
    pub id: String,
    /// Session identifier.
    pub uuid: String,
    /// Topic.
    pub topic: String,
    /// Start time; decides the storage partition.
    pub start_time: Timestamp,
}

impl From<&Recording> for RecordingIdentity {
    fn from(recording: &Recording) -> Self {
        Self {
            id: recording.id.clone(),
            uuid: recording.uuid.clone(),
            topic: recording.topic.clone(),
            start_time: recording.start_time,
        }
    }
}

/// A result preserved after a stage could not complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryRecord {
    /// Layout version.
    pub schema_version: u32,
    /// Record identity.
    pub key: RecoveryKey,
    /// Recording the result belongs to.
    pub recording: RecordingIdentity,
    /// Run that produced the record.
    pub run_id: String,
    /// The analysis result, possibly truncated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<StructuredResult>,
    /// True if any result field was cut to fit the size budget.
    #[serde(default)]
    pub truncated: bool,
    /// Attempts made at the failing stage.
    pub attempt_count: u32,
    /// Last failure observed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When the record was built.
    pub created_at: Timestamp,
    /// Recommended follow-up.
    pub remediation: RemediationAction,
    /// Artifacts already stored for the run.
    #[serde(default)]
    pub artifacts: Vec<ArtifactRef>,
}

impl RecoveryRecord {
    /// Starts a record for `recording` failing at `stage`.
    #[must_use]
    pub fn new(
        recording: &Recording,
        stage: PipelineStage,
        run_id: impl Into<String>,
        remediation: RemediationAction,
    ) -> Self {
        Self {
            schema_version: RECOVERY_SCHEMA_VERSION,
            key: RecoveryKey::new(recording.id.clone(), stage),
            recording: RecordingIdentity::from(recording),
            run_id: run_id.into(),
            result: None,
            truncated: false,
            attempt_count: 0,
            last_error: None,
            created_at: Utc::now(),
            remediation,
            artifacts: Vec::new(),
        }
    }

    /// Attaches the (possibly truncated) result.
    #[must_use]
    pub fn with_result(mut self, result: StructuredResult, truncated: bool) -> Self {
        self.result = Some(result);
        self.truncated = truncated;
        self
    }

    /// Sets the attempt count.
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempt_count = attempts;
        self
    }

    /// Sets the last error.
    #[must_use]
    pub fn with_last_error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(error.into());
        self
    }

    /// Attaches stored artifacts.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Vec<ArtifactRef>) -> Self {
        self.artifacts = artifacts;
        self
    }
}

/// Handle to a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecoveryReference {
    /// Stable id derived from the key.
    pub id: String,
    /// Record identity.
    pub key: RecoveryKey,
    /// Where the record lives (store-specific).
    pub location: String,
}

impl fmt::Display for RecoveryReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_key_file_name_round_trip() {
        let key = RecoveryKey::new("812345", PipelineStage::Notification);
        assert_eq!(key.file_name(), "812345__notification.json");
        assert_eq!(
            RecoveryKey::stage_in_file_name(&key.file_name()),
            Some(PipelineStage::Notification)
        );
        assert_eq!(RecoveryKey::stage_in_file_name("notes.txt"), None);
        assert_eq!(RecoveryKey::stage_in_file_name("a__nowhere.json"), None);

        let odd = RecoveryKey::new("acct/81:23", PipelineStage::ArtifactPersistence);
        assert_eq!(odd.file_name(), "acct_81_23__artifact_persistence.json");
    }

    #[test]
    fn test_reference_id_stable_per_key() {
        let a = RecoveryKey::new("1", PipelineStage::Notification);
        let b = RecoveryKey::new("1", PipelineStage::ArtifactPersistence);
        assert_eq!(a.reference_id(), a.clone().reference_id());
        assert_ne!(a.reference_id(), b.reference_id());
    }

    #[test]
    fn test_record_builder() {
        let recording = Recording::new(
            "1",
            "u",
            "t",
            Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
        );
        let record = RecoveryRecord::new(
            &recording,
            PipelineStage::Notification,
            "run-1",
            RemediationAction::ResendNotification,
        )
        .with_attempts(3)
        .with_last_error("HTTP 500");

        assert_eq!(record.key.recording_id, "1");
        assert_eq!(record.attempt_count, 3);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["remediation"], "resend_notification");
        assert_eq!(json["key"]["failing_stage"], "notification");
        assert!(json.get("result").is_none());
    }
}
