//! Recovery store backed by a blob store.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::record::{RecoveryKey, RecoveryRecord, RecoveryReference};
use super::store::RecoveryStore;
use crate::core::ArtifactCategory;
use crate::errors::StorageError;
use crate::storage::{layout, BlobStore, FolderHandle};

/// Stores records as JSON under `<root>/<YYYY>/<MM>/<recording_id>__<stage>.json`.
///
/// The partition comes from the recording's start date, so re-saving a key
/// always lands on the same path and replaces the previous record.
#[derive(Clone)]
pub struct BlobRecoveryStore {
    store: Arc<dyn BlobStore>,
    root: Vec<String>,
}

impl BlobRecoveryStore {
    /// Creates a store writing under `root`.
    #[must_use]
    pub fn new(store: Arc<dyn BlobStore>, root: Vec<String>) -> Self {
        Self { store, root }
    }

    fn split_location(location: &str) -> Result<(FolderHandle, String), StorageError> {
        let mut segments: Vec<String> = location.split('/').map(ToString::to_string).collect();
        let name = segments
            .pop()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| StorageError::InvalidPath(location.to_string()))?;
        Ok((FolderHandle::from_segments(segments), name))
    }

    async fn folders_in(&self, folder: &FolderHandle) -> Result<Vec<FolderHandle>, StorageError> {
        Ok(self
            .store
            .list(folder)
            .await?
            .into_iter()
            .filter(|e| e.is_folder)
            .map(|e| folder.child(e.name))
            .collect())
    }
}

#[async_trait]
impl RecoveryStore for BlobRecoveryStore {
    async fn save(&self, record: &RecoveryRecord) -> Result<RecoveryReference, StorageError> {
        let bytes = serde_json::to_vec_pretty(record)?;
        let segments = layout::partitioned(&self.root, &record.recording.start_time);
        let folder = self.store.ensure_path(&segments).await?;
        let artifact = self
            .store
            .upload(bytes, &record.key.file_name(), &folder, ArtifactCategory::Recovery)
            .await?;

        info!(key = %record.key, location = %artifact.id, "Recovery record saved");
        Ok(RecoveryReference {
            id: record.key.reference_id(),
            key: record.key.clone(),
            location: artifact.id,
        })
    }

    async fn list(&self) -> Result<Vec<RecoveryReference>, StorageError> {
        let root = self.store.ensure_path(&self.root).await?;
        let mut references = Vec::new();

        for year in self.folders_in(&root).await? {
            for month in self.folders_in(&year).await? {
                for entry in self.store.list(&month).await? {
                    if entry.is_folder {
                        continue;
                    }
                    if RecoveryKey::stage_in_file_name(&entry.name).is_none() {
                        warn!(
                            folder = %month.id,
                            name = %entry.name,
                            "Skipping unrecognised file in recovery store"
                        );
                        continue;
                    }
                    let bytes = self.store.download(&month, &entry.name).await?;
                    match serde_json::from_slice::<RecoveryRecord>(&bytes) {
                        Ok(record) => references.push(RecoveryReference {
                            id: record.key.reference_id(),
                            location: month.path_of(&entry.name),
                            key: record.key,
                        }),
                        Err(err) => warn!(
                            folder = %month.id,
                            name = %entry.name,
                            error = %err,
                            "Skipping unreadable recovery record"
                        ),
                    }
                }
            }
        }

        Ok(references)
    }

    async fn load(&self, reference: &RecoveryReference) -> Result<RecoveryRecord, StorageError> {
        let (folder, name) = Self::split_location(&reference.location)?;
        let bytes = self.store.download(&folder, &name).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn purge(&self, reference: &RecoveryReference) -> Result<(), StorageError> {
        let (folder, name) = Self::split_location(&reference.location)?;
        self.store.delete(&folder, &name).await?;
        info!(key = %reference.key, "Recovery record purged");
        Ok(())
    }
}

impl std::fmt::Debug for BlobRecoveryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobRecoveryStore")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PipelineStage, Recording};
    use crate::recovery::RemediationAction;
    use crate::storage::{InMemoryBlobStore, LocalBlobStore};
    use chrono::{TimeZone, Utc};

    fn record(id: &str, month: u32, stage: PipelineStage) -> RecoveryRecord {
        let recording = Recording::new(
            id,
            "u",
            "Weekly",
            Utc.with_ymd_and_hms(2026, month, 4, 9, 0, 0).unwrap(),
        );
        RecoveryRecord::new(&recording, stage, "run", RemediationAction::ResendNotification)
    }

    #[tokio::test]
    async fn test_save_uses_dated_path_and_overwrites() {
        let blobs = Arc::new(InMemoryBlobStore::new());
        let store = BlobRecoveryStore::new(blobs.clone(), vec!["recovery".to_string()]);

        let first = store
            .save(&record("812345", 3, PipelineStage::Notification).with_attempts(3))
            .await
            .unwrap();
        let second = store
            .save(&record("812345", 3, PipelineStage::Notification).with_attempts(5))
            .await
            .unwrap();

        assert_eq!(first.location, "recovery/2026/03/812345__notification.json");
        assert_eq!(first, second);
        assert_eq!(blobs.paths().len(), 1);
        assert_eq!(store.load(&first).await.unwrap().attempt_count, 5);
    }

    #[tokio::test]
    async fn test_list_walks_partitions() {
        let blobs = Arc::new(InMemoryBlobStore::new());
        let store = BlobRecoveryStore::new(blobs, vec!["recovery".to_string()]);
        store
            .save(&record("1", 1, PipelineStage::Notification))
            .await
            .unwrap();
        store
            .save(&record("2", 5, PipelineStage::ArtifactPersistence))
            .await
            .unwrap();

        let refs = store.list().await.unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].key.recording_id, "1");
        assert_eq!(refs[1].key.failing_stage, PipelineStage::ArtifactPersistence);

        store.purge(&refs[0]).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_keeps_unsanitised_recording_id() {
        let blobs = Arc::new(InMemoryBlobStore::new());
        let store = BlobRecoveryStore::new(blobs.clone(), vec!["recovery".to_string()]);
        let saved = store
            .save(&record("acct/81:23", 3, PipelineStage::Notification))
            .await
            .unwrap();
        assert_eq!(saved.location, "recovery/2026/03/acct_81_23__notification.json");

        let refs = store.list().await.unwrap();
        assert_eq!(refs, vec![saved.clone()]);
        assert_eq!(refs[0].key.recording_id, "acct/81:23");
        assert_eq!(store.load(&refs[0]).await.unwrap().key, saved.key);
    }

    #[tokio::test]
    async fn test_on_local_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobRecoveryStore::new(
            Arc::new(LocalBlobStore::new(dir.path())),
            vec!["recovery".to_string()],
        );
        let reference = store
            .save(&record("9", 12, PipelineStage::Notification))
            .await
            .unwrap();

        assert!(dir
            .path()
            .join("recovery/2026/12/9__notification.json")
            .exists());
        assert_eq!(store.list().await.unwrap(), vec![reference.clone()]);
        assert_eq!(store.load(&reference).await.unwrap().key.recording_id, "9");
    }
}
