//! The blob store trait.

use async_trait::async_trait;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::core::{ArtifactCategory, ArtifactRef};
use crate::errors::StorageError;

/// A resolved folder in a blob store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderHandle {
    /// Store-specific folder identity.
    pub id: String,
    /// Path segments from the store root.
    pub segments: Vec<String>,
}

impl FolderHandle {
    /// Creates a handle whose id is the joined path.
    #[must_use]
    pub fn from_segments(segments: Vec<String>) -> Self {
        Self {
            id: segments.join("/"),
            segments,
        }
    }

    /// Returns a handle for a child folder.
    #[must_use]
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.into());
        Self::from_segments(segments)
    }

    /// Joins the folder path and a file name.
    #[must_use]
    pub fn path_of(&self, name: &str) -> String {
        if self.id.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.id, name)
        }
    }
}

/// One entry in a folder listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobEntry {
    /// Entry name (no path).
    pub name: String,
    /// True for sub-folders.
    pub is_folder: bool,
}

impl BlobEntry {
    /// A file entry.
    #[must_use]
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_folder: false,
        }
    }

    /// A folder entry.
    #[must_use]
    pub fn folder(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_folder: true,
        }
    }
}

/// Folder/file primitives of a remote blob store.
///
/// Uploading a name that already exists in a folder replaces it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Resolves (creating as needed) the folder at `segments`.
    async fn ensure_path(&self, segments: &[String]) -> Result<FolderHandle, StorageError>;

    /// Writes `bytes` as `name` inside `folder`.
    async fn upload(
        &self,
        bytes: Vec<u8>,
        name: &str,
        folder: &FolderHandle,
        category: ArtifactCategory,
    ) -> Result<ArtifactRef, StorageError>;

    /// Returns a human-viewable link for a stored artifact.
    async fn shareable_link(&self, artifact: &ArtifactRef) -> Result<String, StorageError>;

    /// Lists the direct children of `folder`, sorted by name.
    async fn list(&self, folder: &FolderHandle) -> Result<Vec<BlobEntry>, StorageError>;

    /// Reads a stored file.
    async fn download(&self, folder: &FolderHandle, name: &str) -> Result<Vec<u8>, StorageError>;

    /// Removes a stored file.
    async fn delete(&self, folder: &FolderHandle, name: &str) -> Result<(), StorageError>;
}

/// Hex md5 of stored content.
#[must_use]
pub fn content_checksum(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}

/// Rejects empty or path-escaping segments.
pub(crate) fn validate_segment(segment: &str) -> Result<(), StorageError> {
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains('/')
        || segment.contains('\\')
    {
        return Err(StorageError::InvalidPath(segment.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_handle_paths() {
        let root = FolderHandle::from_segments(vec!["recordings".to_string()]);
        let child = root.child("2026");
        assert_eq!(child.id, "recordings/2026");
        assert_eq!(child.path_of("a.json"), "recordings/2026/a.json");
        assert_eq!(FolderHandle::from_segments(Vec::new()).path_of("x"), "x");
    }

    #[test]
    fn test_checksum_is_md5_hex() {
        assert_eq!(content_checksum(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_validate_segment() {
        assert!(validate_segment("2026-03-04 Weekly").is_ok());
        assert!(validate_segment("..").is_err());
        assert!(validate_segment("a/b").is_err());
        assert!(validate_segment("").is_err());
    }
}
