//! References to persisted artifacts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical category of a persisted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactCategory {
    /// Meeting video.
    Video,
    /// Meeting audio (archived when no video exists).
    Audio,
    /// Transcription text.
    Transcript,
    /// Structured summary.
    Summary,
    /// Execution log.
    ExecutionLog,
    /// Recovery record awaiting replay.
    Recovery,
}

impl fmt::Display for ArtifactCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Transcript => write!(f, "transcript"),
            Self::Summary => write!(f, "summary"),
            Self::ExecutionLog => write!(f, "execution_log"),
            Self::Recovery => write!(f, "recovery"),
        }
    }
}

/// A persisted document's remote identity and viewable link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Remote identity in the blob store.
    pub id: String,
    /// File name.
    pub name: String,
    /// Human-viewable link.
    pub link: String,
    /// Logical category.
    pub category: ArtifactCategory,
    /// Stored size.
    pub size_bytes: u64,
    /// Content checksum (hex md5) when the store computes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl ArtifactRef {
    /// Creates a new artifact reference.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        link: impl Into<String>,
        category: ArtifactCategory,
        size_bytes: u64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            link: link.into(),
            category,
            size_bytes,
            checksum: None,
        }
    }

    /// Sets the checksum.
    #[must_use]
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }
}
