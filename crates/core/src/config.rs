//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Blob store backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for blobs.
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/blobs"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::Filesystem { path } if path.as_os_str().is_empty() => {
                Err("filesystem storage requires a non-empty 'path'".to_string())
            }
            StorageConfig::Filesystem { .. } => Ok(()),
        }
    }
}

/// Record store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path (":memory:" for a throwaway store).
        path: PathBuf,
        /// How long a writer waits on a locked database, in seconds.
        #[serde(default = "default_busy_timeout_secs")]
        busy_timeout_secs: u64,
    },
}

fn default_busy_timeout_secs() -> u64 {
    5
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/uploads.db"),
            busy_timeout_secs: default_busy_timeout_secs(),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { path, .. } if path.as_os_str().is_empty() => {
                Err("sqlite metadata requires a non-empty 'path'".to_string())
            }
            MetadataConfig::Sqlite { .. } => Ok(()),
        }
    }
}

/// Upload manager behaviour.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadsConfig {
    /// Largest chunk accepted by a single write, in bytes. 0 disables the limit.
    ///
    /// Every write holds the whole blob plus the chunk in memory, so this
    /// bounds the per-request allocation on top of the blob size.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: u64,
}

fn default_max_chunk_size() -> u64 {
    64 * 1024 * 1024 // 64 MiB
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
        }
    }
}

impl UploadsConfig {
    /// The chunk limit, or `None` when unlimited.
    pub fn chunk_limit(&self) -> Option<u64> {
        (self.max_chunk_size > 0).then_some(self.max_chunk_size)
    }
}

/// Reconciliation sweep configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Report orphans without deleting anything.
    #[serde(default)]
    pub dry_run: bool,
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Blob store configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Record store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Upload manager configuration.
    #[serde(default)]
    pub uploads: UploadsConfig,
    /// Reconciliation sweep configuration.
    #[serde(default)]
    pub sweep: SweepConfig,
}

impl AppConfig {
    /// Validate every section.
    pub fn validate(&self) -> crate::Result<()> {
        self.storage.validate().map_err(crate::Error::Config)?;
        self.metadata.validate().map_err(crate::Error::Config)?;
        Ok(())
    }
}
