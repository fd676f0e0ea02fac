//! Upload record types and lifecycle.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Unique identifier for an upload.
///
/// The same id keys the upload's record and its blob.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UploadId(Uuid);

impl UploadId {
    /// Generate a new random upload ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidUploadId(format!("{s:?}: {e}")))
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UploadId({})", self.0)
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Upload parameters declared by the caller at creation time.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NewUpload {
    /// Total size in bytes, or `None` when the size is deferred.
    pub size: Option<u64>,
    /// Opaque caller-supplied key/value pairs.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// This upload is one fragment of a future concatenation.
    #[serde(default)]
    pub is_partial: bool,
    /// This upload is the result of concatenating partial uploads.
    #[serde(default)]
    pub is_final: bool,
    /// Ids of the partial uploads composing a final upload, in order.
    #[serde(default)]
    pub partial_uploads: Vec<UploadId>,
}

impl NewUpload {
    /// An upload with a known size and no metadata.
    pub fn with_size(size: u64) -> Self {
        Self {
            size: Some(size),
            ..Self::default()
        }
    }

    /// An upload whose size will be declared later.
    pub fn deferred() -> Self {
        Self::default()
    }

    /// Attach a metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Check the declared parameters are self-consistent.
    pub fn validate(&self) -> crate::Result<()> {
        // Sizes and offsets are persisted as signed 64-bit integers.
        if let Some(size) = self.size
            && size > i64::MAX as u64
        {
            return Err(crate::Error::InvalidUpload(format!(
                "size {} exceeds maximum supported size {}",
                size,
                i64::MAX
            )));
        }

        if self.is_partial && self.is_final {
            return Err(crate::Error::InvalidUpload(
                "an upload cannot be both partial and final".to_string(),
            ));
        }

        if !self.is_final && !self.partial_uploads.is_empty() {
            return Err(crate::Error::InvalidUpload(
                "partial_uploads is only meaningful for a final upload".to_string(),
            ));
        }

        Ok(())
    }
}

/// The persisted record of one upload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadInfo {
    /// Unique upload identifier.
    pub id: UploadId,
    /// Declared total size, `None` while deferred.
    pub size: Option<u64>,
    /// True until a size is declared.
    pub size_is_deferred: bool,
    /// Bytes persisted so far.
    pub offset: u64,
    /// Caller-supplied key/value pairs, returned unchanged.
    pub metadata: BTreeMap<String, String>,
    /// Fragment of a future concatenation.
    pub is_partial: bool,
    /// Result of concatenating partial uploads.
    pub is_final: bool,
    /// Partial uploads composing this final upload.
    pub partial_uploads: Vec<UploadId>,
    /// When the upload was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the record was last updated.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl UploadInfo {
    /// Build the initial record for a new upload (offset 0).
    pub fn new(id: UploadId, declared: NewUpload) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id,
            size: declared.size,
            size_is_deferred: declared.size.is_none(),
            offset: 0,
            metadata: declared.metadata,
            is_partial: declared.is_partial,
            is_final: declared.is_final,
            partial_uploads: declared.partial_uploads,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether every declared byte has been persisted.
    ///
    /// Always false while the size is deferred.
    pub fn is_complete(&self) -> bool {
        self.size.is_some_and(|size| self.offset == size)
    }

    /// Bytes still expected, if the size is known.
    pub fn remaining(&self) -> Option<u64> {
        self.size.map(|size| size.saturating_sub(self.offset))
    }
}
