//! Fault-injecting record and blob stores.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tusvault_core::{UploadId, UploadInfo};
use tusvault_metadata::{MetadataError, MetadataResult, RecordStore, RecordUpdate, UploadRepo};
use tusvault_storage::{BlobReader, BlobStore, BlobWriter, StorageError, StorageResult};

/// Wraps a real blob store and fails selected operations on demand.
#[allow(dead_code)]
pub struct FailingBlobStore {
    inner: Arc<dyn BlobStore>,
    pub fail_create: AtomicBool,
    pub fail_replace: AtomicBool,
    pub fail_remove: AtomicBool,
    /// Replaces left before every further replace fails.
    replace_budget: AtomicUsize,
}

#[allow(dead_code)]
impl FailingBlobStore {
    pub fn new(inner: Arc<dyn BlobStore>) -> Self {
        Self {
            inner,
            fail_create: AtomicBool::new(false),
            fail_replace: AtomicBool::new(false),
            fail_remove: AtomicBool::new(false),
            replace_budget: AtomicUsize::new(usize::MAX),
        }
    }

    /// Let `n` more replaces through, then fail the rest.
    pub fn fail_replace_after(&self, n: usize) {
        self.replace_budget.store(n, Ordering::SeqCst);
    }

    fn injected(op: &str) -> StorageError {
        StorageError::Io(std::io::Error::other(format!("injected {op} failure")))
    }
}

#[async_trait]
impl BlobStore for FailingBlobStore {
    async fn create(&self, id: &str) -> StorageResult<Box<dyn BlobWriter>> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Self::injected("create"));
        }
        self.inner.create(id).await
    }

    async fn open(&self, id: &str) -> StorageResult<Box<dyn BlobReader>> {
        self.inner.open(id).await
    }

    async fn replace(&self, id: &str, data: Bytes) -> StorageResult<()> {
        let spent = self
            .replace_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                usize::MAX => Some(left),
                _ => left.checked_sub(1),
            })
            .is_err();
        if spent || self.fail_replace.load(Ordering::SeqCst) {
            return Err(Self::injected("replace"));
        }
        self.inner.replace(id, data).await
    }

    async fn remove(&self, id: &str) -> StorageResult<()> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(Self::injected("remove"));
        }
        self.inner.remove(id).await
    }

    async fn exists(&self, id: &str) -> StorageResult<bool> {
        self.inner.exists(id).await
    }

    async fn list(&self) -> StorageResult<Vec<String>> {
        self.inner.list().await
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}

/// Wraps a real record store and fails selected operations on demand.
#[allow(dead_code)]
pub struct FailingRecordStore {
    inner: Arc<dyn RecordStore>,
    pub fail_update: AtomicBool,
}

#[allow(dead_code)]
impl FailingRecordStore {
    pub fn new(inner: Arc<dyn RecordStore>) -> Self {
        Self {
            inner,
            fail_update: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl UploadRepo for FailingRecordStore {
    async fn insert(&self, record: &UploadInfo) -> MetadataResult<()> {
        self.inner.insert(record).await
    }

    async fn find_by_id(&self, upload_id: UploadId) -> MetadataResult<UploadInfo> {
        self.inner.find_by_id(upload_id).await
    }

    async fn update_fields(
        &self,
        upload_id: UploadId,
        update: &RecordUpdate,
    ) -> MetadataResult<()> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(MetadataError::Config("injected update failure".to_string()));
        }
        self.inner.update_fields(upload_id, update).await
    }

    async fn remove_by_id(&self, upload_id: UploadId) -> MetadataResult<()> {
        self.inner.remove_by_id(upload_id).await
    }

    async fn list_ids(&self) -> MetadataResult<Vec<UploadId>> {
        self.inner.list_ids().await
    }
}

#[async_trait]
impl RecordStore for FailingRecordStore {
    async fn migrate(&self) -> MetadataResult<()> {
        self.inner.migrate().await
    }

    async fn health_check(&self) -> MetadataResult<()> {
        self.inner.health_check().await
    }
}
