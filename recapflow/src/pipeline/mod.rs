//! The pipeline orchestrator and its per-run machinery.
//!
//! This module provides:
//! - [`RunContext`], created per run and passed explicitly
//! - [`RetryPolicy`] and [`ErrorClassifier`], shared by the invoker and the
//!   dispatcher
//! - [`PipelineOrchestrator`], which sequences the five stages
//! - [`RecordingDrainer`], which processes one recording per invocation

mod classifier;
mod context;
mod drain;
mod orchestrator;
mod outcome;
mod retry;


pub use classifier::ErrorClassifier;
pub use context::RunContext;
pub use drain::{DrainConfig, DrainReport, RecordingDrainer};
pub use orchestrator::{OrchestratorBuilder, PipelineOrchestrator};
pub use outcome::{PipelineOutcome, StageCosts};
pub use retry::{BackoffStrategy, JitterStrategy, RetryPolicy};
