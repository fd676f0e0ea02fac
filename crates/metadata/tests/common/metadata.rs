//! Record store test utilities.

use sqlx::{Pool, Sqlite};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tusvault_metadata::{MetadataResult, RecordStore, SqliteStore};

/// A test record store wrapper that cleans up on drop.
#[allow(dead_code)]
pub struct TestMetadata {
    pub store: Arc<dyn RecordStore>,
    pub(crate) sqlite_store: Arc<SqliteStore>,
    db_path: PathBuf,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestMetadata {
    /// Create a new test record store backed by a file in a temp directory.
    pub async fn new() -> MetadataResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");
        let store = Arc::new(SqliteStore::new(&db_path, 5).await?);

        Ok(Self {
            store: store.clone(),
            sqlite_store: store,
            db_path,
            _temp_dir: temp_dir,
        })
    }

    /// Get a reference to the record store.
    pub fn store(&self) -> Arc<dyn RecordStore> {
        self.store.clone()
    }

    /// Get a reference to the SQLite connection pool for raw queries.
    pub fn pool(&self) -> &Pool<Sqlite> {
        self.sqlite_store.pool()
    }

    /// Open a second store on the same database file.
    pub async fn reopen(&self) -> MetadataResult<SqliteStore> {
        SqliteStore::new(&self.db_path, 5).await
    }
}
