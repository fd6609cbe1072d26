//! Core domain model types for recapflow.
//!
//! This module contains the types shared by every component:
//! - Recordings and fetched media
//! - Step status, run outcome and pipeline stages
//! - Artifact references
//! - The structured analysis result and its summary schema

mod artifact;
mod recording;
mod status;
mod summary;

pub use artifact::{ArtifactCategory, ArtifactRef};
pub use recording::{
    folder_label_for, sanitize_name, MediaBundle, MediaFile, MediaKind, MediaPayload, Recording,
};
pub use status::{PipelineStage, RunOutcome, StepStatus};
pub use summary::{
    normalize_summary, parse_offset, DiscussionPoint, MeetingSummary, NextAction, QualityReport,
    ResultMetadata, StructuredResult, SummarySchemaVersion,
};
