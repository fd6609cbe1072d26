//! The in-memory execution ledger.

use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};
use uuid::Uuid;

use super::document::{AuditDocument, AuditStatus, StepCounts, AUDIT_SCHEMA_VERSION};
use super::step::StepRecord;
use crate::core::{ArtifactRef, Recording, RunOutcome, StepStatus};
use crate::errors::RunError;
use crate::observability::SpanTimer;
use crate::utils::{millis, Timestamp};

/// Append-only step ledger for one run.
///
/// Owned by the run context; never shared between runs. Once
/// [`finalize`](Self::finalize) has been called the ledger is frozen:
/// further records are refused and logged, and every later `finalize`
/// returns the same document.
#[derive(Debug)]
pub struct ExecutionAuditLog {
    run_id: Uuid,
    recording_id: String,
    recording_topic: String,
    recording_start: Timestamp,
    started_at: Timestamp,
    timer: SpanTimer,
    steps: Vec<StepRecord>,
    artifacts: Vec<ArtifactRef>,
    outcome: Option<RunOutcome>,
    error: Option<RunError>,
    draft: Option<AuditDocument>,
    finalized: Option<AuditDocument>,
    refused: u32,
}

impl ExecutionAuditLog {
    /// Opens a ledger for `recording`.
    #[must_use]
    pub fn new(run_id: Uuid, recording: &Recording) -> Self {
        Self {
            run_id,
            recording_id: recording.id.clone(),
            recording_topic: recording.topic.clone(),
            recording_start: recording.start_time,
            started_at: Utc::now(),
            timer: SpanTimer::start(format!("run:{run_id}")),
            steps: Vec::new(),
            artifacts: Vec::new(),
            outcome: None,
            error: None,
            draft: None,
            finalized: None,
            refused: 0,
        }
    }

    /// The run identifier.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Appends a step built from its parts.
    pub fn record(
        &mut self,
        step: impl Into<String>,
        status: StepStatus,
        detail: BTreeMap<String, Value>,
    ) -> bool {
        self.push(StepRecord::new(step, status).with_details(detail))
    }

    /// Appends a prepared step. Returns false if the ledger is frozen.
    pub fn push(&mut self, mut record: StepRecord) -> bool {
        if self.refuse("record", &record.step) {
            return false;
        }
        record.sequence = u32::try_from(self.steps.len()).unwrap_or(u32::MAX);
        self.draft = None;
        debug!(
            run_id = %self.run_id,
            step = %record.step,
            status = %record.status,
            sequence = record.sequence,
            "Audit step recorded"
        );
        self.steps.push(record);
        true
    }

    /// Notes a persisted artifact.
    pub fn attach_artifact(&mut self, artifact: ArtifactRef) -> bool {
        if self.refuse("attach_artifact", &artifact.name) {
            return false;
        }
        self.draft = None;
        self.artifacts.push(artifact);
        true
    }

    /// Sets the run outcome.
    pub fn set_outcome(&mut self, outcome: RunOutcome) {
        if !self.refuse("set_outcome", &outcome.to_string()) {
            self.draft = None;
            self.outcome = Some(outcome);
        }
    }

    /// Sets the run-level error.
    pub fn set_error(&mut self, error: RunError) {
        if !self.refuse("set_error", &error.code) {
            self.draft = None;
            self.error = Some(error);
        }
    }

    /// Recorded steps, in order.
    #[must_use]
    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    /// Steps with the given name.
    #[must_use]
    pub fn steps_named(&self, step: &str) -> Vec<&StepRecord> {
        self.steps.iter().filter(|s| s.step == step).collect()
    }

    /// Number of accepted records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Attached artifacts.
    #[must_use]
    pub fn artifacts(&self) -> &[ArtifactRef] {
        &self.artifacts
    }

    /// The outcome, once set.
    #[must_use]
    pub fn outcome(&self) -> Option<RunOutcome> {
        self.outcome
    }

    /// The run-level error, once set.
    #[must_use]
    pub fn error(&self) -> Option<&RunError> {
        self.error.as_ref()
    }

    /// Returns true once finalised.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized.is_some()
    }

    /// Mutations refused after finalisation.
    #[must_use]
    pub fn refused_count(&self) -> u32 {
        self.refused
    }

    /// Builds an interim document without freezing the ledger.
    #[must_use]
    pub fn snapshot(&self) -> AuditDocument {
        if let Some(doc) = &self.finalized {
            return doc.clone();
        }
        self.build(AuditStatus::Running, None)
    }

    /// Builds the final document without freezing the ledger.
    ///
    /// Until the next mutation, repeated drafts and the following
    /// [`finalize`](Self::finalize) return this same document.
    pub fn draft(&mut self) -> AuditDocument {
        if let Some(doc) = self.finalized.as_ref().or(self.draft.as_ref()) {
            return doc.clone();
        }
        let status = AuditStatus::from(self.outcome.unwrap_or_else(|| self.inferred_outcome()));
        let doc = self.build(status, Some(Utc::now()));
        self.draft = Some(doc.clone());
        doc
    }

    /// Freezes the ledger and returns its document.
    ///
    /// Idempotent: repeated calls return an identical document.
    pub fn finalize(&mut self) -> AuditDocument {
        if let Some(doc) = &self.finalized {
            return doc.clone();
        }

        let doc = self.draft();
        debug!(
            run_id = %self.run_id,
            status = %doc.status,
            steps = doc.counts.total,
            "Audit log finalized"
        );
        self.finalized = Some(doc.clone());
        doc
    }

    fn inferred_outcome(&self) -> RunOutcome {
        let failed = self.error.is_some() || self.steps.iter().any(|s| s.status == StepStatus::Error);
        if failed {
            RunOutcome::Error
        } else {
            RunOutcome::Success
        }
    }

    fn build(&self, status: AuditStatus, ended_at: Option<Timestamp>) -> AuditDocument {
        AuditDocument {
            schema_version: AUDIT_SCHEMA_VERSION,
            run_id: self.run_id.to_string(),
            recording_id: self.recording_id.clone(),
            recording_topic: self.recording_topic.clone(),
            recording_start: self.recording_start,
            started_at: self.started_at,
            ended_at,
            total_duration_ms: millis(self.timer.elapsed()),
            status,
            counts: StepCounts::from_steps(&self.steps),
            steps: self.steps.clone(),
            artifacts: self.artifacts.clone(),
            error: self.error.clone(),
        }
    }

    fn refuse(&mut self, op: &str, what: &str) -> bool {
        if self.finalized.is_none() {
            return false;
        }
        self.refused += 1;
        warn!(
            run_id = %self.run_id,
            operation = op,
            target = what,
            "Audit log already finalized, ignoring mutation"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ArtifactCategory;
    use crate::errors::{codes, ErrorClass};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn log() -> ExecutionAuditLog {
        let recording = Recording::new(
            "812345",
            "uuid==",
            "Weekly sync",
            Utc.with_ymd_and_hms(2026, 3, 4, 9, 0, 0).unwrap(),
        );
        ExecutionAuditLog::new(Uuid::new_v4(), &recording)
    }

    #[test]
    fn test_step_count_matches_record_calls() {
        let mut log = log();
        log.record("media_acquisition", StepStatus::Success, BTreeMap::new());
        log.push(StepRecord::new("ai_analysis", StepStatus::Error));
        log.push(StepRecord::new("ai_analysis", StepStatus::Success));

        let doc = log.finalize();
        assert_eq!(doc.counts.total, 3);
        assert_eq!(doc.steps.len(), 3);
        assert_eq!(doc.steps[2].sequence, 2);
        assert_eq!(log.steps_named("ai_analysis").len(), 2);
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut log = log();
        log.record("a", StepStatus::Info, BTreeMap::new());
        log.set_outcome(RunOutcome::Success);

        let first = serde_json::to_string(&log.finalize()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = serde_json::to_string(&log.finalize()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_records_after_finalize_are_refused() {
        let mut log = log();
        log.record("a", StepStatus::Success, BTreeMap::new());
        let doc = log.finalize();

        assert!(!log.record("late", StepStatus::Info, BTreeMap::new()));
        assert!(!log.attach_artifact(ArtifactRef::new(
            "x",
            "x",
            "memory://x",
            ArtifactCategory::Summary,
            1
        )));
        log.set_outcome(RunOutcome::Error);

        assert_eq!(log.len(), 1);
        assert_eq!(log.refused_count(), 3);
        assert_eq!(log.finalize(), doc);
    }

    #[test]
    fn test_snapshot_does_not_freeze() {
        let mut log = log();
        log.record("a", StepStatus::Success, BTreeMap::new());
        let snap = log.snapshot();
        assert!(snap.is_interim());
        assert!(snap.ended_at.is_none());

        assert!(log.record("b", StepStatus::Success, BTreeMap::new()));
        assert_eq!(log.finalize().counts.total, 2);
    }

    #[test]
    fn test_draft_matches_finalize_until_mutated() {
        let mut log = log_with_success();
        log.set_outcome(RunOutcome::Success);
        let first = log.draft();
        assert_eq!(first.status, AuditStatus::Success);
        assert!(first.ended_at.is_some());
        assert_eq!(log.draft(), first);

        log.set_outcome(RunOutcome::PartialSuccess);
        assert!(log.record("audit_persistence", StepStatus::Error, BTreeMap::new()));
        let second = log.draft();
        assert_eq!(second.status, AuditStatus::PartialSuccess);
        assert_eq!(second.counts.total, 2);
        assert_eq!(log.finalize(), second);
    }

    #[test]
    fn test_status_inferred_when_unset() {
        let mut log = log();
        log.set_error(RunError::new(codes::AI_FATAL, ErrorClass::Fatal, "401"));
        assert_eq!(log.finalize().status, AuditStatus::Error);

        let mut clean = log_with_success();
        assert_eq!(clean.finalize().status, AuditStatus::Success);
    }

    fn log_with_success() -> ExecutionAuditLog {
        let mut log = log();
        log.record("a", StepStatus::Success, BTreeMap::new());
        log
    }

    #[test]
    fn test_document_name() {
        let mut log = log();
        let doc = log.finalize();
        assert_eq!(
            doc.file_name(),
            format!("execution-log_812345_{}.json", log.run_id())
        );
    }
}
