//! In-memory blob store.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};

use super::blob::{content_checksum, validate_segment, BlobEntry, BlobStore, FolderHandle};
use crate::core::{ArtifactCategory, ArtifactRef};
use crate::errors::{ProviderError, StorageError};

/// A blob store held in process memory.
///
/// Uploads whose name contains a registered fragment fail, which lets tests
/// break one document type while the rest persist.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
    folders: RwLock<BTreeSet<String>>,
    failing_names: RwLock<Vec<String>>,
    upload_attempts: RwLock<Vec<String>>,
}

impl InMemoryBlobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every upload whose name contains `fragment` fail.
    pub fn fail_uploads_containing(&self, fragment: impl Into<String>) {
        self.failing_names.write().push(fragment.into());
    }

    /// Clears injected failures.
    pub fn heal(&self) {
        self.failing_names.write().clear();
    }

    /// Every stored path, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.files.read().keys().cloned().collect()
    }

    /// Stored paths whose file name starts with `prefix`.
    #[must_use]
    pub fn paths_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.files
            .read()
            .keys()
            .filter(|p| p.rsplit('/').next().is_some_and(|n| n.starts_with(prefix)))
            .cloned()
            .collect()
    }

    /// Reads a file by full path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.files.read().get(path).cloned()
    }

    /// Names passed to `upload`, including failed ones.
    #[must_use]
    pub fn upload_attempts(&self) -> Vec<String> {
        self.upload_attempts.read().clone()
    }

    fn link_for(path: &str) -> String {
        format!("memory://{path}")
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn ensure_path(&self, segments: &[String]) -> Result<FolderHandle, StorageError> {
        for segment in segments {
            validate_segment(segment)?;
        }
        let mut folders = self.folders.write();
        for depth in 1..=segments.len() {
            folders.insert(segments[..depth].join("/"));
        }
        Ok(FolderHandle::from_segments(segments.to_vec()))
    }

    async fn upload(
        &self,
        bytes: Vec<u8>,
        name: &str,
        folder: &FolderHandle,
        category: ArtifactCategory,
    ) -> Result<ArtifactRef, StorageError> {
        validate_segment(name)?;
        self.upload_attempts.write().push(name.to_string());

        if self
            .failing_names
            .read()
            .iter()
            .any(|fragment| name.contains(fragment.as_str()))
        {
            return Err(StorageError::Backend(ProviderError::http(
                503,
                format!("injected upload failure for {name}"),
            )));
        }

        let path = folder.path_of(name);
        let size = bytes.len() as u64;
        let checksum = content_checksum(&bytes);
        self.files.write().insert(path.clone(), bytes);

        Ok(ArtifactRef::new(path.clone(), name, Self::link_for(&path), category, size)
            .with_checksum(checksum))
    }

    async fn shareable_link(&self, artifact: &ArtifactRef) -> Result<String, StorageError> {
        if self.files.read().contains_key(&artifact.id) {
            Ok(Self::link_for(&artifact.id))
        } else {
            Err(StorageError::NotFound(artifact.id.clone()))
        }
    }

    async fn list(&self, folder: &FolderHandle) -> Result<Vec<BlobEntry>, StorageError> {
        let prefix = if folder.id.is_empty() {
            String::new()
        } else {
            format!("{}/", folder.id)
        };

        let mut entries: BTreeMap<String, bool> = BTreeMap::new();
        let files = self.files.read();
        let folders = self.folders.read();
        let paths = files
            .keys()
            .map(|p| (p, false))
            .chain(folders.iter().map(|p| (p, true)));

        for (path, is_folder_path) in paths {
            let Some(rest) = path.strip_prefix(&prefix) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            match rest.split_once('/') {
                Some((child, _)) => {
                    entries.insert(child.to_string(), true);
                }
                None => {
                    entries.entry(rest.to_string()).or_insert(is_folder_path);
                }
            }
        }

        Ok(entries
            .into_iter()
            .map(|(name, is_folder)| BlobEntry { name, is_folder })
            .collect())
    }

    async fn download(&self, folder: &FolderHandle, name: &str) -> Result<Vec<u8>, StorageError> {
        let path = folder.path_of(name);
        self.files
            .read()
            .get(&path)
            .cloned()
            .ok_or(StorageError::NotFound(path))
    }

    async fn delete(&self, folder: &FolderHandle, name: &str) -> Result<(), StorageError> {
        let path = folder.path_of(name);
        self.files
            .write()
            .remove(&path)
            .map(|_| ())
            .ok_or(StorageError::NotFound(path))
    }
}
