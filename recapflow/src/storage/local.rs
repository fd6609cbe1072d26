//! Filesystem-backed blob store.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use super::blob::{content_checksum, validate_segment, BlobEntry, BlobStore, FolderHandle};
use crate::core::{ArtifactCategory, ArtifactRef};
use crate::errors::StorageError;

/// A blob store rooted at a local directory. Links are `file://` URLs.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    /// Creates a store rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn folder_path(&self, folder: &FolderHandle) -> PathBuf {
        folder
            .segments
            .iter()
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    fn file_path(&self, folder: &FolderHandle, name: &str) -> Result<PathBuf, StorageError> {
        validate_segment(name)?;
        Ok(self.folder_path(folder).join(name))
    }

    fn link_for(path: &Path) -> String {
        format!("file://{}", path.display())
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn ensure_path(&self, segments: &[String]) -> Result<FolderHandle, StorageError> {
        for segment in segments {
            validate_segment(segment)?;
        }
        let handle = FolderHandle::from_segments(segments.to_vec());
        fs::create_dir_all(self.folder_path(&handle)).await?;
        Ok(handle)
    }

    async fn upload(
        &self,
        bytes: Vec<u8>,
        name: &str,
        folder: &FolderHandle,
        category: ArtifactCategory,
    ) -> Result<ArtifactRef, StorageError> {
        let path = self.file_path(folder, name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write then rename so a crash never leaves a half-written document.
        let staging = path.with_file_name(format!("{name}.partial"));
        fs::write(&staging, &bytes).await?;
        fs::rename(&staging, &path).await?;

        debug!(path = %path.display(), size = bytes.len(), "Stored blob");

        Ok(ArtifactRef::new(
            folder.path_of(name),
            name,
            Self::link_for(&path),
            category,
            bytes.len() as u64,
        )
        .with_checksum(content_checksum(&bytes)))
    }

    async fn shareable_link(&self, artifact: &ArtifactRef) -> Result<String, StorageError> {
        let path = artifact
            .id
            .split('/')
            .fold(self.root.clone(), |path, segment| path.join(segment));
        if fs::try_exists(&path).await? {
            Ok(Self::link_for(&path))
        } else {
            Err(StorageError::NotFound(artifact.id.clone()))
        }
    }

    async fn list(&self, folder: &FolderHandle) -> Result<Vec<BlobEntry>, StorageError> {
        let dir = self.folder_path(folder);
        if !fs::try_exists(&dir).await? {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        let mut reader = fs::read_dir(&dir).await?;
        while let Some(entry) = reader.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".partial") {
                continue;
            }
            let is_folder = entry.file_type().await?.is_dir();
            entries.push(BlobEntry { name, is_folder });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn download(&self, folder: &FolderHandle, name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.file_path(folder, name)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(folder.path_of(name)))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn delete(&self, folder: &FolderHandle, name: &str) -> Result<(), StorageError> {
        let path = self.file_path(folder, name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(folder.path_of(name)))
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segs(parts: &[&str]) -> Vec<String> {
        parts.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn test_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        let folder = store.ensure_path(&segs(&["logs", "2026", "03"])).await.unwrap();
        let artifact = store
            .upload(b"{\"a\":1}".to_vec(), "run.json", &folder, ArtifactCategory::ExecutionLog)
            .await
            .unwrap();

        assert_eq!(artifact.id, "logs/2026/03/run.json");
        assert!(artifact.link.starts_with("file://"));
        assert!(dir.path().join("logs/2026/03/run.json").exists());
        assert_eq!(store.download(&folder, "run.json").await.unwrap(), b"{\"a\":1}");
        assert_eq!(
            store.shareable_link(&artifact).await.unwrap(),
            artifact.link
        );
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        let root = store.ensure_path(&segs(&["r"])).await.unwrap();
        let child = store.ensure_path(&segs(&["r", "2026"])).await.unwrap();
        store
            .upload(b"x".to_vec(), "b.json", &root, ArtifactCategory::Summary)
            .await
            .unwrap();

        let entries = store.list(&root).await.unwrap();
        assert_eq!(entries, vec![BlobEntry::folder("2026"), BlobEntry::file("b.json")]);
        assert!(store.list(&child).await.unwrap().is_empty());

        store.delete(&root, "b.json").await.unwrap();
        assert!(matches!(
            store.download(&root, "b.json").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_escaping_segments() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        assert!(matches!(
            store.ensure_path(&segs(&["..", "etc"])).await,
            Err(StorageError::InvalidPath(_))
        ));
    }
}
