//! Upload manager error types.

use tusvault_metadata::MetadataError;
use tusvault_storage::StorageError;

/// Errors surfaced by [`UploadManager`](crate::UploadManager) operations.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("upload not found: {0}")]
    NotFound(String),

    #[error("upload already exists: {0}")]
    AlreadyExists(String),

    #[error("offset mismatch: claimed {claimed}, upload is at {actual}")]
    OffsetMismatch { claimed: u64, actual: u64 },

    #[error("upload size exceeded: declared {size}, write would reach {attempted}")]
    SizeExceeded { size: u64, attempted: u64 },

    #[error("chunk of {len} bytes exceeds limit of {limit} bytes")]
    ChunkTooLarge { len: u64, limit: u64 },

    #[error("upload size already declared: {0}")]
    SizeAlreadyDeclared(u64),

    #[error("inconsistent upload state: {0}")]
    InconsistentState(String),

    #[error(transparent)]
    Core(#[from] tusvault_core::Error),

    #[error("storage error: {0}")]
    Storage(StorageError),

    #[error("metadata error: {0}")]
    Metadata(MetadataError),
}

impl UploadError {
    /// Get the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::OffsetMismatch { .. } => "offset_mismatch",
            Self::SizeExceeded { .. } => "size_exceeded",
            Self::ChunkTooLarge { .. } => "chunk_too_large",
            Self::SizeAlreadyDeclared(_) => "size_already_declared",
            Self::InconsistentState(_) => "inconsistent_state",
            Self::Core(tusvault_core::Error::Config(_)) => "config_error",
            Self::Core(_) => "invalid_upload",
            Self::Storage(_) => "storage_error",
            Self::Metadata(_) => "metadata_error",
        }
    }

    /// Whether this error reports an absent upload.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<StorageError> for UploadError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(id) => Self::NotFound(id),
            StorageError::AlreadyExists(id) => Self::AlreadyExists(id),
            other => Self::Storage(other),
        }
    }
}

impl From<MetadataError> for UploadError {
    fn from(e: MetadataError) -> Self {
        match e {
            MetadataError::NotFound(id) => Self::NotFound(id),
            MetadataError::AlreadyExists(id) => Self::AlreadyExists(id),
            other => Self::Metadata(other),
        }
    }
}

/// Result type for upload manager operations.
pub type UploadResult<T> = std::result::Result<T, UploadError>;
