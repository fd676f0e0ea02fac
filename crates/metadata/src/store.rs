//! Record store trait and implementations.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{UploadRow, to_i64};
use crate::repos::{RecordUpdate, UploadRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;
use tusvault_core::{UploadId, UploadInfo};
use uuid::Uuid;

/// Combined record store trait.
#[async_trait]
pub trait RecordStore: UploadRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based record store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store and apply the schema.
    ///
    /// `":memory:"` opens a private in-memory database that lives as long as
    /// the store.
    pub async fn new(path: impl AsRef<Path>, busy_timeout_secs: u64) -> MetadataResult<Self> {
        let path = path.as_ref();
        let in_memory = path.as_os_str() == ":memory:";

        let opts = if in_memory {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            // Ensure parent directory exists
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
            }
            SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        }
        // Prevent transient "database is locked" errors under concurrent access.
        .busy_timeout(Duration::from_secs(busy_timeout_secs));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single long-lived
            // connection also keeps an in-memory database alive.
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::debug!(path = %path.display(), "SQLite record store ready");
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl UploadRepo for SqliteStore {
    async fn insert(&self, record: &UploadInfo) -> MetadataResult<()> {
        let row = UploadRow::from_info(record)?;

        let result = sqlx::query(
            r#"
            INSERT INTO uploads (
                upload_id, upload_size, size_is_deferred, upload_offset, metadata,
                is_partial, is_final, partial_uploads, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.upload_id)
        .bind(row.upload_size)
        .bind(row.size_is_deferred)
        .bind(row.upload_offset)
        .bind(&row.metadata)
        .bind(row.is_partial)
        .bind(row.is_final)
        .bind(&row.partial_uploads)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            // SQLite error: "UNIQUE constraint failed: uploads.upload_id"
            Err(sqlx::Error::Database(ref db_err))
                if db_err.message().contains("UNIQUE constraint") =>
            {
                Err(MetadataError::AlreadyExists(record.id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_id(&self, upload_id: UploadId) -> MetadataResult<UploadInfo> {
        let row = sqlx::query_as::<_, UploadRow>("SELECT * FROM uploads WHERE upload_id = ?")
            .bind(upload_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row.into_info(),
            None => Err(MetadataError::NotFound(upload_id.to_string())),
        }
    }

    async fn update_fields(
        &self,
        upload_id: UploadId,
        update: &RecordUpdate,
    ) -> MetadataResult<()> {
        if update.is_empty() {
            let exists: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM uploads WHERE upload_id = ?")
                .bind(upload_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
            return match exists {
                Some(_) => Ok(()),
                None => Err(MetadataError::NotFound(upload_id.to_string())),
            };
        }

        let offset = update
            .offset
            .map(|o| to_i64(upload_id, "offset", o))
            .transpose()?;
        let size = update
            .size
            .map(|s| to_i64(upload_id, "size", s))
            .transpose()?;

        // NULL binds leave the column unchanged ($set semantics)
        let result = sqlx::query(
            r#"
            UPDATE uploads SET
                upload_offset = COALESCE(?, upload_offset),
                upload_size = COALESCE(?, upload_size),
                size_is_deferred = COALESCE(?, size_is_deferred),
                updated_at = ?
            WHERE upload_id = ?
            "#,
        )
        .bind(offset)
        .bind(size)
        .bind(update.size_is_deferred)
        .bind(OffsetDateTime::now_utc())
        .bind(upload_id.as_uuid())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(MetadataError::NotFound(upload_id.to_string()));
        }
        Ok(())
    }

    async fn remove_by_id(&self, upload_id: UploadId) -> MetadataResult<()> {
        let result = sqlx::query("DELETE FROM uploads WHERE upload_id = ?")
            .bind(upload_id.as_uuid())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(MetadataError::NotFound(upload_id.to_string()));
        }
        Ok(())
    }

    async fn list_ids(&self) -> MetadataResult<Vec<UploadId>> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT upload_id FROM uploads ORDER BY created_at, upload_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(ids.into_iter().map(UploadId::from_uuid).collect())
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS uploads (
    upload_id BLOB PRIMARY KEY,
    upload_size INTEGER,
    size_is_deferred INTEGER NOT NULL DEFAULT 0,
    upload_offset INTEGER NOT NULL DEFAULT 0 CHECK (upload_offset >= 0),
    metadata TEXT NOT NULL DEFAULT '{}',
    is_partial INTEGER NOT NULL DEFAULT 0,
    is_final INTEGER NOT NULL DEFAULT 0,
    partial_uploads TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_uploads_created_at ON uploads(created_at);
"#;
