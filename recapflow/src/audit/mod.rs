//! Append-only execution ledger for one pipeline run.
//!
//! Every stage boundary and every retry attempt becomes a [`StepRecord`].
//! At the end of the run (whatever the exit path) the log is finalised into
//! an [`AuditDocument`] and written by the [`AuditPersister`].

mod document;
mod log;
mod persist;
mod step;

pub use document::{AuditDocument, AuditStatus, StepCounts, AUDIT_SCHEMA_VERSION};
pub use log::ExecutionAuditLog;
pub use persist::AuditPersister;
pub use step::{StepRecord, StepTimer};
