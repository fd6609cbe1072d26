//! One-recording-per-invocation backlog draining.

use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::orchestrator::PipelineOrchestrator;
use super::outcome::PipelineOutcome;
use crate::errors::ProviderError;
use crate::source::RecordingSource;
use crate::utils::Timestamp;

fn default_lookback_days() -> u32 {
    30
}

fn default_min_duration_minutes() -> u32 {
    1
}

/// Which recordings are picked up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainConfig {
    /// How far back to list recordings.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// Shorter recordings are skipped.
    #[serde(default = "default_min_duration_minutes")]
    pub min_duration_minutes: u32,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            min_duration_minutes: default_min_duration_minutes(),
        }
    }
}

/// What one invocation did.
#[derive(Debug, Clone)]
pub struct DrainReport {
    /// The run, if a recording was processed.
    pub outcome: Option<PipelineOutcome>,
    /// Whether the processed recording was deleted at the provider.
    pub deleted: bool,
    /// Eligible recordings left for later invocations.
    pub pending: usize,
    /// Recordings ignored (no media or too short).
    pub skipped: usize,
}

/// Processes the oldest eligible recording, then stops.
///
/// A backlog is drained by repeated invocations, never by looping inside
/// one, so a single run always has the whole budget to itself.
pub struct RecordingDrainer {
    orchestrator: Arc<PipelineOrchestrator>,
    config: DrainConfig,
}

impl RecordingDrainer {
    /// Creates a drainer.
    #[must_use]
    pub fn new(orchestrator: Arc<PipelineOrchestrator>, config: DrainConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    /// Lists, picks and processes at most one recording.
    pub async fn drain_once(&self, now: Timestamp) -> Result<DrainReport, ProviderError> {
        let source: &Arc<dyn RecordingSource> = self.orchestrator.source();
        let from = now - ChronoDuration::days(i64::from(self.config.lookback_days));
        let listed = source.list(from, now).await?;
        let total = listed.len();

        let mut eligible: Vec<_> = listed
            .into_iter()
            .filter(|r| r.has_media() && r.duration_minutes >= self.config.min_duration_minutes)
            .collect();
        let skipped = total - eligible.len();
        eligible.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));

        if eligible.is_empty() {
            info!(listed = total, skipped, "No recordings to process");
            return Ok(DrainReport {
                outcome: None,
                deleted: false,
                pending: 0,
                skipped,
            });
        }

        let recording = eligible.remove(0);
        let pending = eligible.len();
        info!(
            recording_id = %recording.id,
            pending,
            skipped,
            "Processing oldest recording"
        );

        let outcome = self.orchestrator.run(recording.clone()).await;
        let deleted = if outcome.deletion_eligible {
            match source.delete(&recording).await {
                Ok(()) => {
                    info!(recording_id = %recording.id, "Source recording deleted");
                    true
                }
                Err(err) => {
                    warn!(recording_id = %recording.id, error = %err, "Source deletion failed");
                    false
                }
            }
        } else {
            info!(
                recording_id = %recording.id,
                status = %outcome.status,
                "Source recording kept"
            );
            false
        };

        Ok(DrainReport {
            outcome: Some(outcome),
            deleted,
            pending,
            skipped,
        })
    }
}

impl std::fmt::Debug for RecordingDrainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingDrainer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
