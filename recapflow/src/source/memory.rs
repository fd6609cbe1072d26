//! In-memory recording source.

use async_trait::async_trait;
use parking_lot::RwLock;

use super::RecordingSource;
use crate::core::{MediaBundle, Recording};
use crate::errors::ProviderError;
use crate::utils::Timestamp;

/// A recording provider held in memory.
#[derive(Debug, Default)]
pub struct InMemoryRecordingSource {
    recordings: RwLock<Vec<(Recording, MediaBundle)>>,
    deleted: RwLock<Vec<String>>,
    fetch_error: RwLock<Option<ProviderError>>,
}

impl InMemoryRecordingSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a recording with its media.
    pub fn add(&self, recording: Recording, media: MediaBundle) {
        self.recordings.write().push((recording, media));
    }

    /// Adds a recording and returns self.
    #[must_use]
    pub fn with_recording(self, recording: Recording, media: MediaBundle) -> Self {
        self.add(recording, media);
        self
    }

    /// Makes every `fetch_media` call fail.
    pub fn fail_fetches(&self, err: ProviderError) {
        *self.fetch_error.write() = Some(err);
    }

    /// Ids passed to `delete`, in order.
    #[must_use]
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.read().clone()
    }

    /// Ids still held.
    #[must_use]
    pub fn remaining(&self) -> Vec<String> {
        self.recordings.read().iter().map(|(r, _)| r.id.clone()).collect()
    }
}

#[async_trait]
impl RecordingSource for InMemoryRecordingSource {
    async fn list(&self, from: Timestamp, to: Timestamp) -> Result<Vec<Recording>, ProviderError> {
        Ok(self
            .recordings
            .read()
            .iter()
            .filter(|(r, _)| r.start_time >= from && r.start_time < to)
            .map(|(r, _)| r.clone())
            .collect())
    }

    async fn fetch_media(&self, recording: &Recording) -> Result<MediaBundle, ProviderError> {
        if let Some(err) = self.fetch_error.read().clone() {
            return Err(err);
        }
        self.recordings
            .read()
            .iter()
            .find(|(r, _)| r.id == recording.id)
            .map(|(_, media)| media.clone())
            .ok_or_else(|| ProviderError::http(404, format!("recording {} not found", recording.id)))
    }

    async fn delete(&self, recording: &Recording) -> Result<(), ProviderError> {
        self.deleted.write().push(recording.id.clone());
        self.recordings.write().retain(|(r, _)| r.id != recording.id);
        Ok(())
    }
}
