//! Per-upload mutual exclusion.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tusvault_core::UploadId;

/// Table of per-upload locks.
///
/// Mutations of one upload are serialised; different uploads proceed in
/// parallel. Entries are created on demand and pruned once no guard or waiter
/// holds them.
#[derive(Clone, Default)]
pub struct UploadLocks {
    inner: Arc<DashMap<UploadId, Arc<Mutex<()>>>>,
}

impl UploadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`.
    pub async fn acquire(&self, id: UploadId) -> UploadGuard {
        // Declared before the wait so that a cancelled acquire still prunes
        // the entry once the pending lock future has been dropped.
        let mut guard = UploadGuard {
            id,
            locks: self.inner.clone(),
            guard: None,
        };

        let mutex = self
            .inner
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        guard.guard = Some(mutex.lock_owned().await);
        guard
    }

    /// Number of ids with a live lock entry.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Exclusive access to one upload, released on drop.
pub struct UploadGuard {
    id: UploadId,
    locks: Arc<DashMap<UploadId, Arc<Mutex<()>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        // Release the mutex first so the strong count below only sees the
        // table entry plus any waiters.
        drop(self.guard.take());
        self.locks
            .remove_if(&self.id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
