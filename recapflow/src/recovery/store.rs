//! The recovery store trait and its in-memory implementation.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::info;

use super::record::{RecoveryKey, RecoveryRecord, RecoveryReference};
use crate::errors::{ProviderError, StorageError};

/// Durable, provider-agnostic persistence of undelivered results.
///
/// `save` is idempotent per [`RecoveryKey`]: the same key overwrites.
#[async_trait]
pub trait RecoveryStore: Send + Sync {
    /// Stores (or replaces) a record.
    async fn save(&self, record: &RecoveryRecord) -> Result<RecoveryReference, StorageError>;

    /// Lists every stored record.
    async fn list(&self) -> Result<Vec<RecoveryReference>, StorageError>;

    /// Reads a stored record.
    async fn load(&self, reference: &RecoveryReference) -> Result<RecoveryRecord, StorageError>;

    /// Deletes a stored record.
    async fn purge(&self, reference: &RecoveryReference) -> Result<(), StorageError>;
}

/// A recovery store held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryRecoveryStore {
    records: DashMap<RecoveryKey, RecoveryRecord>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl InMemoryRecoveryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save` calls, including overwrites and failures.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Number of distinct records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the record for a key.
    #[must_use]
    pub fn get(&self, key: &RecoveryKey) -> Option<RecoveryRecord> {
        self.records.get(key).map(|r| r.value().clone())
    }

    /// Makes subsequent saves fail.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    fn reference_for(key: &RecoveryKey) -> RecoveryReference {
        RecoveryReference {
            id: key.reference_id(),
            key: key.clone(),
            location: format!("memory://recovery/{}", key.file_name()),
        }
    }
}

#[async_trait]
impl RecoveryStore for InMemoryRecoveryStore {
    async fn save(&self, record: &RecoveryRecord) -> Result<RecoveryReference, StorageError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::Backend(ProviderError::http(
                503,
                "recovery store unavailable",
            )));
        }
        self.records.insert(record.key.clone(), record.clone());
        let reference = Self::reference_for(&record.key);
        info!(key = %record.key, reference = %reference.id, "Recovery record saved");
        Ok(reference)
    }

    async fn list(&self) -> Result<Vec<RecoveryReference>, StorageError> {
        let mut keys: Vec<RecoveryKey> = self.records.iter().map(|r| r.key().clone()).collect();
        keys.sort();
        Ok(keys.iter().map(Self::reference_for).collect())
    }

    async fn load(&self, reference: &RecoveryReference) -> Result<RecoveryRecord, StorageError> {
        self.get(&reference.key)
            .ok_or_else(|| StorageError::NotFound(reference.location.clone()))
    }

    async fn purge(&self, reference: &RecoveryReference) -> Result<(), StorageError> {
        self.records
            .remove(&reference.key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(reference.location.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PipelineStage, Recording};
    use crate::recovery::RemediationAction;
    use chrono::{TimeZone, Utc};

    fn record(attempts: u32) -> RecoveryRecord {
        let recording = Recording::new(
            "812345",
            "u",
            "Weekly",
            Utc.with_ymd_and_hms(2026, 3, 4, 9, 0, 0).unwrap(),
        );
        RecoveryRecord::new(
            &recording,
            PipelineStage::Notification,
            "run",
            RemediationAction::ResendNotification,
        )
        .with_attempts(attempts)
    }

    #[tokio::test]
    async fn test_same_key_overwrites() {
        let store = InMemoryRecoveryStore::new();
        let first = store.save(&record(3)).await.unwrap();
        let second = store.save(&record(4)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
        assert_eq!(store.save_count(), 2);
        assert_eq!(store.load(&first).await.unwrap().attempt_count, 4);
    }

    #[tokio::test]
    async fn test_list_and_purge() {
        let store = InMemoryRecoveryStore::new();
        let reference = store.save(&record(3)).await.unwrap();
        assert_eq!(store.list().await.unwrap(), vec![reference.clone()]);

        store.purge(&reference).await.unwrap();
        assert!(store.is_empty());
        assert!(matches!(
            store.purge(&reference).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failing_saves_are_counted() {
        let store = InMemoryRecoveryStore::new();
        store.set_fail_saves(true);
        assert!(store.save(&record(1)).await.is_err());
        assert_eq!(store.save_count(), 1);
        assert!(store.is_empty());
    }
}
