//! Per-run execution context.

use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{ExecutionAuditLog, StepRecord};
use crate::budget::TimeoutBudgetGuard;
use crate::core::{ArtifactRef, Recording};
use crate::events::{EventSink, NoOpEventSink};
use crate::utils::generate_run_id;

/// Everything one run owns: the recording, the budget guard, the audit
/// ledger and the artifacts persisted so far.
///
/// Created fresh for every run and passed explicitly to the components
/// that need it. There is no process-wide registry of runs.
pub struct RunContext {
    run_id: Uuid,
    recording: Recording,
    guard: TimeoutBudgetGuard,
    audit: ExecutionAuditLog,
    artifacts: Vec<ArtifactRef>,
    events: Arc<dyn EventSink>,
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("recording", &self.recording.id)
            .field("guard", &self.guard)
            .field("steps", &self.audit.len())
            .field("artifacts", &self.artifacts.len())
            .finish_non_exhaustive()
    }
}

impl RunContext {
    /// Opens a context with a fresh run id.
    #[must_use]
    pub fn new(recording: Recording, guard: TimeoutBudgetGuard) -> Self {
        Self::with_run_id(generate_run_id(), recording, guard)
    }

    /// Opens a context with a known run id.
    #[must_use]
    pub fn with_run_id(run_id: Uuid, recording: Recording, guard: TimeoutBudgetGuard) -> Self {
        let audit = ExecutionAuditLog::new(run_id, &recording);
        Self {
            run_id,
            recording,
            guard,
            audit,
            artifacts: Vec::new(),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// The run identifier.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The recording under processing.
    #[must_use]
    pub fn recording(&self) -> &Recording {
        &self.recording
    }

    /// The budget guard.
    #[must_use]
    pub fn guard(&self) -> &TimeoutBudgetGuard {
        &self.guard
    }

    /// The audit ledger.
    #[must_use]
    pub fn audit(&self) -> &ExecutionAuditLog {
        &self.audit
    }

    /// Mutable access to the audit ledger.
    pub fn audit_mut(&mut self) -> &mut ExecutionAuditLog {
        &mut self.audit
    }

    /// The event sink.
    #[must_use]
    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    /// Appends a step to the audit ledger.
    pub fn record(&mut self, step: StepRecord) -> bool {
        self.audit.push(step)
    }

    /// Artifacts persisted so far.
    #[must_use]
    pub fn artifacts(&self) -> &[ArtifactRef] {
        &self.artifacts
    }

    /// Keeps a persisted artifact and notes it in the ledger.
    pub fn add_artifact(&mut self, artifact: ArtifactRef) {
        self.audit.attach_artifact(artifact.clone());
        self.artifacts.push(artifact);
    }

    /// Splits the context into its final parts.
    #[must_use]
    pub fn into_parts(self) -> (ExecutionAuditLog, Vec<ArtifactRef>) {
        (self.audit, self.artifacts)
    }
}
