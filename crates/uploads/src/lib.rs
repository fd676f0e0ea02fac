//! Resumable upload sessions over a record store and a blob store.
//!
//! This crate provides:
//! - [`UploadManager`]: create, write, inspect, read and terminate uploads
//! - Per-upload locking so concurrent writers to one upload are serialised
//! - A reconciliation sweep that removes records and blobs left orphaned by
//!   partial failures

pub mod error;
pub mod locks;
pub mod manager;
pub mod sweep;

pub use error::{UploadError, UploadResult};
pub use locks::{UploadGuard, UploadLocks};
pub use manager::UploadManager;
pub use sweep::SweepReport;

pub use tusvault_metadata as metadata;
pub use tusvault_storage as storage;

use tusvault_core::config::AppConfig;

/// Build an upload manager and its stores from configuration.
pub async fn from_config(config: &AppConfig) -> UploadResult<UploadManager> {
    config.validate()?;

    let blobs = tusvault_storage::from_config(&config.storage).await?;
    let records = tusvault_metadata::from_config(&config.metadata).await?;

    tracing::info!(
        storage = blobs.backend_name(),
        max_chunk_size = config.uploads.max_chunk_size,
        "Upload manager ready"
    );

    Ok(UploadManager::new(records, blobs, config.uploads.clone()))
}
