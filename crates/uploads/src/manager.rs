//! Upload session manager.
//!
//! Composes a record store and a blob store into the upload lifecycle. The
//! record is the authority on whether an upload exists; the blob under the
//! same id holds exactly `offset` bytes.

use crate::error::{UploadError, UploadResult};
use crate::locks::UploadLocks;
use crate::sweep::SweepReport;
use bytes::{Bytes, BytesMut};
use std::collections::BTreeSet;
use std::io::Cursor;
use std::sync::Arc;
use tracing::instrument;
use tusvault_core::config::{SweepConfig, UploadsConfig};
use tusvault_core::{NewUpload, UploadId, UploadInfo};
use tusvault_metadata::{RecordStore, RecordUpdate};
use tusvault_storage::BlobStore;

/// Blob key for an upload.
fn blob_key(id: UploadId) -> String {
    id.to_string()
}

/// Coordinates the record and blob of every upload.
///
/// Mutating operations hold the upload's lock for their whole duration, so
/// writes, length declarations and terminations of one upload never
/// interleave. Reads take no lock.
pub struct UploadManager {
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    config: UploadsConfig,
    locks: UploadLocks,
}

impl UploadManager {
    /// Create a manager over the given stores.
    pub fn new(
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        config: UploadsConfig,
    ) -> Self {
        Self {
            records,
            blobs,
            config,
            locks: UploadLocks::new(),
        }
    }

    /// Get the upload configuration.
    pub fn config(&self) -> &UploadsConfig {
        &self.config
    }

    /// Create a new upload with an empty blob and return its id.
    ///
    /// If the blob cannot be created the record is removed again, so a failed
    /// creation leaves nothing behind.
    #[instrument(skip(self, declared), fields(upload_id, size = ?declared.size))]
    pub async fn create_upload(&self, declared: NewUpload) -> UploadResult<UploadId> {
        declared.validate()?;

        let id = UploadId::new();
        tracing::Span::current().record("upload_id", id.to_string().as_str());
        let _guard = self.locks.acquire(id).await;

        let info = UploadInfo::new(id, declared);
        self.records.insert(&info).await?;

        if let Err(e) = self.create_empty_blob(id).await {
            match self.records.remove_by_id(id).await {
                Ok(()) => tracing::warn!(
                    upload_id = %id,
                    error = %e,
                    "Blob creation failed, removed upload record"
                ),
                Err(rollback) => tracing::error!(
                    upload_id = %id,
                    error = %e,
                    rollback_error = %rollback,
                    "Blob creation failed and the upload record could not be removed; \
                     the record is orphaned until the next sweep"
                ),
            }
            return Err(e);
        }

        tracing::info!(
            upload_id = %id,
            size = ?info.size,
            metadata_keys = info.metadata.len(),
            "Created upload"
        );
        Ok(id)
    }

    async fn create_empty_blob(&self, id: UploadId) -> UploadResult<()> {
        let writer = self.blobs.create(&blob_key(id)).await?;
        writer.close().await?;
        Ok(())
    }

    /// Append `data` at `offset` and return the number of bytes written.
    ///
    /// `offset` must equal the upload's current offset. The blob is replaced
    /// atomically with `existing ++ data` before the record's offset advances.
    #[instrument(skip(self, data), fields(upload_id = %id, bytes = data.len()))]
    pub async fn write_chunk(&self, id: UploadId, offset: u64, data: Bytes) -> UploadResult<u64> {
        let _guard = self.locks.acquire(id).await;

        let info = self.records.find_by_id(id).await?;

        if offset != info.offset {
            return Err(UploadError::OffsetMismatch {
                claimed: offset,
                actual: info.offset,
            });
        }

        let len = data.len() as u64;
        let new_offset = offset.saturating_add(len);

        if let Some(size) = info.size
            && new_offset > size
        {
            return Err(UploadError::SizeExceeded {
                size,
                attempted: new_offset,
            });
        }

        if let Some(limit) = self.config.chunk_limit()
            && len > limit
        {
            return Err(UploadError::ChunkTooLarge { len, limit });
        }

        let key = blob_key(id);
        let reader = match self.blobs.open(&key).await {
            Ok(reader) => reader,
            Err(e) if e.is_not_found() => {
                return Err(UploadError::InconsistentState(format!(
                    "upload {id} has a record but no blob"
                )));
            }
            Err(e) => return Err(e.into()),
        };

        if reader.size() != info.offset {
            return Err(UploadError::InconsistentState(format!(
                "blob for upload {id} holds {} bytes but the record offset is {}",
                reader.size(),
                info.offset
            )));
        }

        let existing = reader.read_all().await?;
        let mut combined = BytesMut::with_capacity(existing.len() + data.len());
        combined.extend_from_slice(&existing);
        combined.extend_from_slice(&data);

        self.blobs.replace(&key, combined.freeze()).await?;

        if let Err(e) = self
            .records
            .update_fields(id, &RecordUpdate::offset(new_offset))
            .await
        {
            // Put the old content back so the blob length matches the offset.
            if let Err(restore) = self.blobs.replace(&key, existing).await {
                tracing::error!(
                    upload_id = %id,
                    error = %e,
                    restore_error = %restore,
                    "Offset update failed and the blob could not be restored"
                );
            }
            return Err(e.into());
        }

        tracing::debug!(
            upload_id = %id,
            offset = new_offset,
            bytes = len,
            complete = info.size == Some(new_offset),
            "Wrote chunk"
        );
        Ok(len)
    }

    /// Get the current record of an upload.
    pub async fn get_info(&self, id: UploadId) -> UploadResult<UploadInfo> {
        Ok(self.records.find_by_id(id).await?)
    }

    /// Read the upload's bytes written so far.
    ///
    /// The reader is an independent in-memory snapshot; later writes do not
    /// affect it.
    #[instrument(skip(self), fields(upload_id = %id))]
    pub async fn get_reader(&self, id: UploadId) -> UploadResult<Cursor<Bytes>> {
        let reader = self.blobs.open(&blob_key(id)).await?;
        let data = reader.read_all().await?;
        Ok(Cursor::new(data))
    }

    /// Delete the upload's record and then its blob.
    ///
    /// Terminating an unknown or already terminated upload fails with
    /// `NotFound`.
    #[instrument(skip(self), fields(upload_id = %id))]
    pub async fn terminate(&self, id: UploadId) -> UploadResult<()> {
        let _guard = self.locks.acquire(id).await;

        self.records.remove_by_id(id).await?;

        match self.blobs.remove(&blob_key(id)).await {
            Ok(()) => {
                tracing::info!(upload_id = %id, "Terminated upload");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                tracing::warn!(
                    upload_id = %id,
                    "Upload record removed but its blob was already missing"
                );
                Err(e.into())
            }
            Err(e) => {
                tracing::error!(
                    upload_id = %id,
                    error = %e,
                    "Upload record removed but its blob could not be deleted; \
                     the blob is orphaned until the next sweep"
                );
                Err(e.into())
            }
        }
    }

    /// Declare the total size of an upload created with a deferred size.
    #[instrument(skip(self), fields(upload_id = %id))]
    pub async fn declare_length(&self, id: UploadId, size: u64) -> UploadResult<()> {
        if size > i64::MAX as u64 {
            return Err(tusvault_core::Error::InvalidUpload(format!(
                "size {} exceeds maximum supported size {}",
                size,
                i64::MAX
            ))
            .into());
        }

        let _guard = self.locks.acquire(id).await;

        let info = self.records.find_by_id(id).await?;
        if let Some(existing) = info.size {
            return Err(UploadError::SizeAlreadyDeclared(existing));
        }
        if size < info.offset {
            return Err(UploadError::SizeExceeded {
                size,
                attempted: info.offset,
            });
        }

        self.records
            .update_fields(id, &RecordUpdate::declare_size(size))
            .await?;

        tracing::info!(upload_id = %id, size, "Declared upload length");
        Ok(())
    }

    /// Find and remove records without blobs and blobs without records.
    ///
    /// Each candidate is re-checked under its upload lock before anything is
    /// deleted. Per-item failures are counted in the report and do not stop
    /// the sweep.
    #[instrument(skip(self, config), fields(dry_run = config.dry_run))]
    pub async fn reconcile(&self, config: &SweepConfig) -> UploadResult<SweepReport> {
        let mut report = SweepReport {
            dry_run: config.dry_run,
            ..SweepReport::default()
        };

        if config.dry_run {
            tracing::warn!("DRY-RUN MODE: Will report orphans without deleting them");
        }

        let record_ids: BTreeSet<UploadId> = self.records.list_ids().await?.into_iter().collect();
        let blob_keys = self.blobs.list().await?;
        report.records_scanned = record_ids.len() as u64;
        report.blobs_scanned = blob_keys.len() as u64;

        // Only the canonical spelling of an id is that upload's blob.
        let mut blob_ids: BTreeSet<UploadId> = BTreeSet::new();
        for key in blob_keys {
            match UploadId::parse(&key) {
                Ok(id) if blob_key(id) == key => {
                    blob_ids.insert(id);
                }
                _ => {
                    // No record can ever reference this blob.
                    report.orphan_blobs += 1;
                    self.remove_orphan_blob(&key, config.dry_run, &mut report)
                        .await;
                }
            }
        }

        for id in record_ids.difference(&blob_ids) {
            self.sweep_record(*id, config.dry_run, &mut report).await;
        }

        for id in blob_ids.difference(&record_ids) {
            self.sweep_blob(*id, config.dry_run, &mut report).await;
        }

        tracing::info!(
            records_scanned = report.records_scanned,
            blobs_scanned = report.blobs_scanned,
            orphan_records = report.orphan_records,
            orphan_blobs = report.orphan_blobs,
            items_deleted = report.items_deleted,
            errors = report.errors,
            dry_run = report.dry_run,
            "Reconciliation sweep finished"
        );
        Ok(report)
    }

    async fn sweep_record(&self, id: UploadId, dry_run: bool, report: &mut SweepReport) {
        let _guard = self.locks.acquire(id).await;

        match self.records.find_by_id(id).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => return,
            Err(e) => {
                tracing::warn!(upload_id = %id, error = %e, "Failed to re-check upload record");
                report.errors += 1;
                return;
            }
        }

        match self.blobs.exists(&blob_key(id)).await {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(upload_id = %id, error = %e, "Failed to check upload blob");
                report.errors += 1;
                return;
            }
        }

        report.orphan_records += 1;
        if dry_run {
            tracing::info!(upload_id = %id, "Would remove upload record with no blob");
            return;
        }

        match self.records.remove_by_id(id).await {
            Ok(()) => {
                tracing::info!(upload_id = %id, "Removed upload record with no blob");
                report.items_deleted += 1;
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                tracing::warn!(upload_id = %id, error = %e, "Failed to remove orphaned record");
                report.errors += 1;
            }
        }
    }

    async fn sweep_blob(&self, id: UploadId, dry_run: bool, report: &mut SweepReport) {
        let _guard = self.locks.acquire(id).await;
        let key = blob_key(id);

        match self.records.find_by_id(id).await {
            Ok(_) => return,
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                tracing::warn!(upload_id = %id, error = %e, "Failed to re-check upload record");
                report.errors += 1;
                return;
            }
        }

        match self.blobs.exists(&key).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                tracing::warn!(upload_id = %id, error = %e, "Failed to check upload blob");
                report.errors += 1;
                return;
            }
        }

        report.orphan_blobs += 1;
        self.remove_orphan_blob(&key, dry_run, report).await;
    }

    async fn remove_orphan_blob(&self, key: &str, dry_run: bool, report: &mut SweepReport) {
        if dry_run {
            tracing::info!(key, "Would remove blob with no upload record");
            return;
        }

        match self.blobs.remove(key).await {
            Ok(()) => {
                tracing::info!(key, "Removed blob with no upload record");
                report.items_deleted += 1;
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to remove orphaned blob");
                report.errors += 1;
            }
        }
    }

    /// Check connectivity of both stores.
    pub async fn health_check(&self) -> UploadResult<()> {
        self.records.health_check().await?;
        self.blobs.health_check().await?;
        Ok(())
    }
}
