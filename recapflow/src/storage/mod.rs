//! Blob store abstraction and implementations.
//!
//! Artifacts, audit documents and recovery records all land in a blob store
//! addressed by folder path segments.

mod blob;
pub mod layout;
mod local;
mod memory;

pub use blob::{content_checksum, BlobEntry, BlobStore, FolderHandle};
#[cfg(test)]
pub use blob::MockBlobStore;
pub use local::LocalBlobStore;
pub use memory::InMemoryBlobStore;
