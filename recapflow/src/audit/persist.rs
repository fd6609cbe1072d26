//! Durable audit persistence with an event-sink fallback.

use std::sync::Arc;

use super::document::AuditDocument;
use crate::core::{ArtifactCategory, ArtifactRef};
use crate::errors::StorageError;
use crate::events::{names, EventSink};
use crate::storage::{layout, BlobStore};

/// Writes audit documents under `<root>/<YYYY>/<MM>/<YYYY-MM-DD topic>/`.
///
/// Each run writes one document name; writing again (interim snapshot,
/// then final) replaces it. A document that could not be written goes to
/// the event sink through [`AuditPersister::emit_fallback`].
#[derive(Clone)]
pub struct AuditPersister {
    store: Arc<dyn BlobStore>,
    root: Vec<String>,
    events: Arc<dyn EventSink>,
}

impl AuditPersister {
    /// Creates a persister.
    #[must_use]
    pub fn new(store: Arc<dyn BlobStore>, root: Vec<String>, events: Arc<dyn EventSink>) -> Self {
        Self {
            store,
            root,
            events,
        }
    }

    /// Folder the document belongs in.
    #[must_use]
    pub fn folder_for(&self, doc: &AuditDocument) -> Vec<String> {
        layout::meeting_folder(&self.root, &doc.recording_start, &doc.recording_topic)
    }

    /// Writes the document. Nothing is emitted to the fallback; callers
    /// settle the final document first and then call
    /// [`emit_fallback`](Self::emit_fallback).
    pub async fn write(&self, doc: &AuditDocument) -> Result<ArtifactRef, StorageError> {
        let bytes = doc.to_json_bytes()?;
        let folder = self.store.ensure_path(&self.folder_for(doc)).await?;
        self.store
            .upload(bytes, &doc.file_name(), &folder, ArtifactCategory::ExecutionLog)
            .await
    }

    /// Sends the whole document to the event sink.
    pub async fn emit_fallback(&self, doc: &AuditDocument, cause: &StorageError) {
        let document = match doc.to_value() {
            Ok(value) => value,
            Err(err) => serde_json::json!({
                "run_id": doc.run_id,
                "recording_id": doc.recording_id,
                "encoding_error": err.to_string(),
            }),
        };
        let payload = serde_json::json!({
            "file_name": doc.file_name(),
            "cause": cause.to_string(),
            "document": document,
        });
        self.events.emit(names::AUDIT_FALLBACK, Some(payload)).await;
    }
}

impl std::fmt::Debug for AuditPersister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditPersister")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}
