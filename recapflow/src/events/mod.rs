//! Pipeline lifecycle events and the best-effort fallback channel.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type names emitted by the orchestrator.
pub mod names {
    /// A run started.
    pub const PIPELINE_STARTED: &str = "pipeline.started";
    /// A run finished (any outcome).
    pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
    /// A stage finished successfully.
    pub const STAGE_COMPLETED: &str = "stage.completed";
    /// A stage failed.
    pub const STAGE_FAILED: &str = "stage.failed";
    /// A recovery record was written.
    pub const RECOVERY_SAVED: &str = "recovery.saved";
    /// An audit document could not be persisted; the payload carries it.
    pub const AUDIT_FALLBACK: &str = "audit.fallback";
}
