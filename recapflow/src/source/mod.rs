//! The recording provider seam.

mod memory;

pub use memory::InMemoryRecordingSource;

use async_trait::async_trait;

use crate::core::{MediaBundle, Recording};
use crate::errors::ProviderError;
use crate::utils::Timestamp;

/// Listing, download and deletion of recordings at the provider.
#[async_trait]
pub trait RecordingSource: Send + Sync {
    /// Recordings that started in `[from, to)`.
    async fn list(&self, from: Timestamp, to: Timestamp) -> Result<Vec<Recording>, ProviderError>;

    /// Downloads the recording's media.
    async fn fetch_media(&self, recording: &Recording) -> Result<MediaBundle, ProviderError>;

    /// Deletes the recording at the provider.
    ///
    /// Only called once a run has made the recording deletion-eligible.
    async fn delete(&self, recording: &Recording) -> Result<(), ProviderError>;
}
