//! # Recapflow
//!
//! A resilient pipeline that turns a meeting recording into a transcript,
//! a structured summary, archived documents and a chat notification.
//!
//! One run moves a recording through five stages:
//!
//! - **Media acquisition**: download audio and video from the recording provider
//! - **Analysis**: transcribe and summarise through a model provider, with
//!   classified retries and model fallback
//! - **Artifact persistence**: archive media, transcript and summary
//! - **Audit persistence**: write a structured execution log
//! - **Notification**: post the summary to chat, preserving it for replay when
//!   delivery fails
//!
//! Every stage runs under a wall-clock budget, and every run leaves exactly
//! one execution log behind.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use recapflow::prelude::*;
//!
//! let config = RecapflowConfig::load_from_path("recapflow.toml")?;
//! let orchestrator = config
//!     .apply_to(PipelineOrchestrator::builder())
//!     .source(source)
//!     .blob_store(store.clone())
//!     .model_provider(Arc::new(config.gemini_provider(api_key)?))
//!     .chat_channel(channel)
//!     .recovery_store(Arc::new(config.recovery_store(store)))
//!     .build()?;
//!
//! let drainer = RecordingDrainer::new(Arc::new(orchestrator), config.drain.clone());
//! let report = drainer.drain_once(chrono::Utc::now()).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, missing_docs, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod audit;
pub mod budget;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod invoker;
pub mod notify;
pub mod observability;
pub mod pipeline;
pub mod recovery;
pub mod source;
pub mod storage;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::audit::{AuditDocument, AuditPersister, ExecutionAuditLog, StepRecord};
    pub use crate::budget::{BudgetCheck, BudgetConfig, Clock, SystemClock, TimeoutBudgetGuard};
    pub use crate::config::RecapflowConfig;
    pub use crate::core::{
        ArtifactCategory, ArtifactRef, MediaBundle, MediaKind, MediaPayload, MeetingSummary,
        PipelineStage, Recording, RunOutcome, StepStatus, StructuredResult,
    };
    pub use crate::errors::{
        AnalysisError, BudgetExceeded, ConfigError, DeliveryError, DeliveryFailure, ErrorClass,
        ProviderError,
        RecapflowError, RunError, StorageError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::invoker::{ModelProvider, ModelSelection, ResilientModelInvoker};
    pub use crate::notify::{ChatChannel, DeliveryOutcome, NotificationDispatcher, RenderedMessage};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{
        DrainConfig, OrchestratorBuilder, PipelineOrchestrator, PipelineOutcome, RecordingDrainer,
        RetryPolicy, RunContext, StageCosts,
    };
    pub use crate::recovery::{
        BlobRecoveryStore, InMemoryRecoveryStore, RecoveryRecord, RecoveryReplayer, RecoveryStore,
    };
    pub use crate::source::RecordingSource;
    pub use crate::storage::{BlobStore, InMemoryBlobStore, LocalBlobStore};
    pub use crate::utils::{generate_run_id, iso_timestamp, Timestamp};
}
