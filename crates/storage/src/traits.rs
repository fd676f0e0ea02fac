//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;

/// Keyed store of whole binary blobs.
///
/// Blobs are addressed by an opaque id and are never patched in place: content
/// is written once through a [`BlobWriter`] or swapped wholesale with
/// [`BlobStore::replace`]. There is no append primitive.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Allocate a new blob under `id` and return a writer for its content.
    ///
    /// The blob becomes visible when the writer is closed. Fails with
    /// `AlreadyExists` if a blob is already bound to `id`, either now or at
    /// close time.
    async fn create(&self, id: &str) -> StorageResult<Box<dyn BlobWriter>>;

    /// Open an existing blob for reading. Fails with `NotFound` if absent.
    async fn open(&self, id: &str) -> StorageResult<Box<dyn BlobReader>>;

    /// Atomically replace the full content of an existing blob.
    ///
    /// Readers observe either the old or the new content, never a missing
    /// blob. Fails with `NotFound` if no blob is bound to `id`.
    async fn replace(&self, id: &str, data: Bytes) -> StorageResult<()>;

    /// Delete a blob. Fails with `NotFound` if absent.
    async fn remove(&self, id: &str) -> StorageResult<()>;

    /// Check if a blob exists.
    async fn exists(&self, id: &str) -> StorageResult<bool>;

    /// List the ids of every stored blob.
    ///
    /// Used by reconciliation sweeps; the order is backend-defined.
    async fn list(&self) -> StorageResult<Vec<String>>;

    /// Get the name of this storage backend, for logging.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// The default implementation returns Ok(()), suitable for backends that
    /// don't require connectivity verification.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Write-once handle for a blob being created.
#[async_trait]
pub trait BlobWriter: Send {
    /// Append data to the pending content.
    async fn write(&mut self, data: Bytes) -> StorageResult<()>;

    /// Publish the blob and return the total bytes written.
    async fn close(self: Box<Self>) -> StorageResult<u64>;

    /// Discard the pending blob.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}

/// Read handle for an existing blob.
#[async_trait]
pub trait BlobReader: Send {
    /// Current byte length of the blob.
    fn size(&self) -> u64;

    /// Read the full content. Returns empty bytes when the size is 0.
    async fn read_all(self: Box<Self>) -> StorageResult<Bytes>;
}
