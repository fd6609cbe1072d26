//! Automated replay of preserved notifications.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::record::{RecoveryRecord, RemediationAction};
use super::store::RecoveryStore;
use crate::core::Recording;
use crate::errors::StorageError;
use crate::notify::{render_result_message, ChatChannel, RenderedMessage, FIELD_CHAR_LIMIT};

/// Counts from one replay pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    /// Records posted and purged.
    pub delivered: Vec<String>,
    /// Records left alone (other remediation, or nothing to send).
    pub skipped: Vec<String>,
    /// Records whose post or purge failed; they stay in the store.
    pub failed: Vec<String>,
}

/// Re-posts `ResendNotification` records and purges each one only after
/// the channel accepted it.
pub struct RecoveryReplayer {
    store: Arc<dyn RecoveryStore>,
    channel: Arc<dyn ChatChannel>,
    field_limit: usize,
}

impl RecoveryReplayer {
    /// Creates a replayer.
    #[must_use]
    pub fn new(store: Arc<dyn RecoveryStore>, channel: Arc<dyn ChatChannel>) -> Self {
        Self {
            store,
            channel,
            field_limit: FIELD_CHAR_LIMIT,
        }
    }

    /// Sets the per-field character limit used when re-rendering.
    #[must_use]
    pub fn with_field_limit(mut self, limit: usize) -> Self {
        self.field_limit = limit;
        self
    }

    fn message_for(&self, record: &RecoveryRecord) -> Option<RenderedMessage> {
        let result = record.result.as_ref()?;
        let recording = Recording::new(
            record.recording.id.clone(),
            record.recording.uuid.clone(),
            record.recording.topic.clone(),
            record.recording.start_time,
        );
        Some(render_result_message(
            &recording,
            result,
            &record.artifacts,
            self.field_limit,
        ))
    }

    /// Walks the store once.
    pub async fn replay_all(&self) -> Result<ReplayReport, StorageError> {
        let mut report = ReplayReport::default();

        for reference in self.store.list().await? {
            let record = match self.store.load(&reference).await {
                Ok(record) => record,
                Err(err) => {
                    warn!(location = %reference.location, error = %err, "Unreadable recovery record");
                    report.failed.push(reference.location.clone());
                    continue;
                }
            };

            let message = match record.remediation {
                RemediationAction::ResendNotification => self.message_for(&record),
                RemediationAction::PersistArtifacts | RemediationAction::ManualReview => None,
            };
            let Some(message) = message else {
                report.skipped.push(reference.location.clone());
                continue;
            };

            match self.channel.post(&message).await {
                Ok(_) => match self.store.purge(&reference).await {
                    Ok(()) => {
                        info!(location = %reference.location, "Recovery record replayed");
                        report.delivered.push(reference.location.clone());
                    }
                    Err(err) => {
                        warn!(location = %reference.location, error = %err, "Replayed but purge failed");
                        report.failed.push(reference.location.clone());
                    }
                },
                Err(err) => {
                    warn!(location = %reference.location, error = %err, "Replay post failed");
                    report.failed.push(reference.location.clone());
                }
            }
        }

        Ok(report)
    }
}

impl std::fmt::Debug for RecoveryReplayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryReplayer")
            .field("channel", &self.channel.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PipelineStage;
    use crate::errors::ProviderError;
    use crate::invoker::parse_model_output;
    use crate::recovery::InMemoryRecoveryStore;
    use crate::testing::{sample_recording, valid_model_output, ScriptedChatChannel};

    async fn seeded() -> Arc<InMemoryRecoveryStore> {
        let store = Arc::new(InMemoryRecoveryStore::new());
        let recording = sample_recording();
        let result = parse_model_output(&valid_model_output(), "m", 1).unwrap();
        store
            .save(
                &RecoveryRecord::new(
                    &recording,
                    PipelineStage::Notification,
                    "run-1",
                    RemediationAction::ResendNotification,
                )
                .with_result(result, false),
            )
            .await
            .unwrap();
        store
            .save(&RecoveryRecord::new(
                &recording,
                PipelineStage::ArtifactPersistence,
                "run-1",
                RemediationAction::PersistArtifacts,
            ))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_replay_delivers_and_purges() {
        let store = seeded().await;
        let channel = Arc::new(ScriptedChatChannel::new());
        let report = RecoveryReplayer::new(store.clone(), channel.clone())
            .replay_all()
            .await
            .unwrap();

        assert_eq!(report.delivered.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.failed.is_empty());
        assert_eq!(store.len(), 1);
        assert!(channel.titles()[0].contains("Meeting summary"));
    }

    #[tokio::test]
    async fn test_failed_post_keeps_record() {
        let store = seeded().await;
        let channel = Arc::new(ScriptedChatChannel::failing(ProviderError::http(500, "down")));
        let report = RecoveryReplayer::new(store.clone(), channel)
            .replay_all()
            .await
            .unwrap();

        assert_eq!(report.failed.len(), 1);
        assert_eq!(store.len(), 2);
    }
}
