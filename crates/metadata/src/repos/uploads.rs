//! Upload record repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use tusvault_core::{UploadId, UploadInfo};

/// Partial field update applied by [`UploadRepo::update_fields`].
///
/// Only the fields set to `Some` are replaced; everything else in the record
/// is left untouched. `updated_at` is refreshed unless the update is empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordUpdate {
    pub offset: Option<u64>,
    pub size: Option<u64>,
    pub size_is_deferred: Option<bool>,
}

impl RecordUpdate {
    /// Update only the persisted offset.
    pub fn offset(offset: u64) -> Self {
        Self {
            offset: Some(offset),
            ..Self::default()
        }
    }

    /// Declare the final size of a deferred upload.
    pub fn declare_size(size: u64) -> Self {
        Self {
            size: Some(size),
            size_is_deferred: Some(false),
            ..Self::default()
        }
    }

    /// Whether the update changes no field.
    pub fn is_empty(&self) -> bool {
        self.offset.is_none() && self.size.is_none() && self.size_is_deferred.is_none()
    }
}

/// Repository for upload records.
#[async_trait]
pub trait UploadRepo: Send + Sync {
    /// Insert a new record. Fails with `AlreadyExists` if the id is present.
    async fn insert(&self, record: &UploadInfo) -> MetadataResult<()>;

    /// Get a record by id. Fails with `NotFound`.
    async fn find_by_id(&self, upload_id: UploadId) -> MetadataResult<UploadInfo>;

    /// Apply a partial field update. Fails with `NotFound`.
    async fn update_fields(&self, upload_id: UploadId, update: &RecordUpdate)
    -> MetadataResult<()>;

    /// Delete a record. Fails with `NotFound`.
    async fn remove_by_id(&self, upload_id: UploadId) -> MetadataResult<()>;

    /// List every record id, oldest first.
    async fn list_ids(&self) -> MetadataResult<Vec<UploadId>>;
}
