//! Record store abstraction and implementations for tusvault.
//!
//! Each upload has exactly one record holding its declared size, persisted
//! offset and caller metadata. The record store is the authority on whether an
//! upload exists.

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use repos::{RecordUpdate, UploadRepo};
pub use store::{RecordStore, SqliteStore};

use std::sync::Arc;
use tusvault_core::config::MetadataConfig;

/// Create a record store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn RecordStore>> {
    config.validate().map_err(MetadataError::Config)?;

    match config {
        MetadataConfig::Sqlite {
            path,
            busy_timeout_secs,
        } => {
            let store = SqliteStore::new(path, *busy_timeout_secs).await?;
            tracing::info!(path = %path.display(), "Opened SQLite record store");
            Ok(Arc::new(store) as Arc<dyn RecordStore>)
        }
    }
}
