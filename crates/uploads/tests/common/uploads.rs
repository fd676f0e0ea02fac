//! Upload manager test harness.

use super::faults::{FailingBlobStore, FailingRecordStore};
use bytes::Bytes;
use std::io::Read;
use std::sync::Arc;
use tempfile::TempDir;
use tusvault_core::UploadId;
use tusvault_core::config::UploadsConfig;
use tusvault_metadata::{RecordStore, SqliteStore};
use tusvault_storage::{BlobStore, FilesystemBackend};
use tusvault_uploads::UploadManager;

/// A manager over throwaway stores, cleaned up on drop.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestUploads {
    pub manager: Arc<UploadManager>,
    pub records: Arc<dyn RecordStore>,
    pub blobs: Arc<dyn BlobStore>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestUploads {
    /// SQLite records and filesystem blobs in a temp directory.
    pub async fn new() -> Self {
        Self::wrapped(|records| records, |blobs| blobs).await
    }

    /// Same as [`TestUploads::new`] with the blob store wrapped by `wrap`.
    pub async fn with_blobs<F>(wrap: F) -> Self
    where
        F: FnOnce(Arc<dyn BlobStore>) -> Arc<dyn BlobStore>,
    {
        Self::wrapped(|records| records, wrap).await
    }

    /// A harness whose blob store fails operations on demand.
    pub async fn with_failing_blobs() -> (Self, Arc<FailingBlobStore>) {
        let (uploads, _, blobs) = Self::with_failing_stores().await;
        (uploads, blobs)
    }

    /// A harness whose record and blob stores both fail operations on demand.
    pub async fn with_failing_stores() -> (Self, Arc<FailingRecordStore>, Arc<FailingBlobStore>) {
        let mut record_handle = None;
        let mut blob_handle = None;
        let uploads = Self::wrapped(
            |inner| {
                let failing = Arc::new(FailingRecordStore::new(inner));
                record_handle = Some(failing.clone());
                failing as Arc<dyn RecordStore>
            },
            |inner| {
                let failing = Arc::new(FailingBlobStore::new(inner));
                blob_handle = Some(failing.clone());
                failing as Arc<dyn BlobStore>
            },
        )
        .await;
        (
            uploads,
            record_handle.expect("record wrapper not called"),
            blob_handle.expect("blob wrapper not called"),
        )
    }

    async fn wrapped<R, B>(wrap_records: R, wrap_blobs: B) -> Self
    where
        R: FnOnce(Arc<dyn RecordStore>) -> Arc<dyn RecordStore>,
        B: FnOnce(Arc<dyn BlobStore>) -> Arc<dyn BlobStore>,
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let blobs = FilesystemBackend::new(temp_dir.path().join("blobs"))
            .await
            .expect("Failed to create blob store");
        let records = SqliteStore::new(temp_dir.path().join("uploads.db"), 5)
            .await
            .expect("Failed to create record store");

        let records = wrap_records(Arc::new(records));
        let blobs = wrap_blobs(Arc::new(blobs));
        let manager = UploadManager::new(records.clone(), blobs.clone(), UploadsConfig::default());

        Self {
            manager: Arc::new(manager),
            records,
            blobs,
            _temp_dir: temp_dir,
        }
    }

    /// Read the whole upload through the manager.
    pub async fn read(&self, id: UploadId) -> Bytes {
        let mut reader = self.manager.get_reader(id).await.expect("get_reader failed");
        let mut out = Vec::new();
        reader.read_to_end(&mut out).expect("read failed");
        Bytes::from(out)
    }

    /// Whether a blob is stored for `id`.
    pub async fn blob_exists(&self, id: UploadId) -> bool {
        self.blobs
            .exists(&id.to_string())
            .await
            .expect("exists failed")
    }
}
