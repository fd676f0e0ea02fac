//! Blob storage abstraction and backends for tusvault.
//!
//! This crate provides:
//! - The [`BlobStore`] contract: create, open, replace and remove whole blobs by id
//! - Write-once blob writers and whole-content blob readers
//! - A local filesystem backend with atomic temp-file-then-rename writes

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use error::{StorageError, StorageResult};
pub use traits::{BlobReader, BlobStore, BlobWriter};

use std::sync::Arc;
use tusvault_core::config::StorageConfig;

/// Create a blob store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn BlobStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
    }
}
