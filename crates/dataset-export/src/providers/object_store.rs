//! Object store provider trait for referenced files and produced archives

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

use crate::error::Result;

/// Body of a streamed upload.
///
/// An `Err` item means the producer failed: the upload must be abandoned and
/// nothing may become visible at the destination path.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + Sync>>;

/// Metadata about a stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObjectInfo {
    /// Object path within the store
    pub path: String,
    /// Storage URI (file path or cloud URI)
    pub uri: String,
    /// Size in bytes
    pub size: u64,
}

/// Trait for object storage
///
/// Implementations:
/// - `LocalObjectStore`: Local filesystem
/// - `MemoryObjectStore`: In-process map (tests)
/// - `GcsObjectStore`: Google Cloud Storage
#[async_trait]
pub trait ObjectStoreProvider: Send + Sync {
    /// Download an object's full contents.
    ///
    /// Returns `Error::ObjectNotFound` when the path does not exist.
    async fn download(&self, path: &str) -> Result<Bytes>;

    /// Write an object from a stream of chunks.
    ///
    /// Completes only after the store has durably accepted every byte.
    async fn upload_stream(
        &self,
        path: &str,
        content_type: &str,
        body: ByteStream,
    ) -> Result<StoredObjectInfo>;

    /// Publish `from` at `to`, replacing any existing object, and remove `from`
    async fn move_object(&self, from: &str, to: &str) -> Result<StoredObjectInfo>;

    /// Delete an object. No-op if absent.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Check if an object exists
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Check if the provider is healthy
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
