//! Database models mapping to the metadata schema.

use crate::error::{MetadataError, MetadataResult};
use sqlx::FromRow;
use std::collections::BTreeMap;
use time::OffsetDateTime;
use tusvault_core::{UploadId, UploadInfo};
use uuid::Uuid;

/// Upload record row.
///
/// `metadata` and `partial_uploads` are stored as JSON text.
#[derive(Debug, Clone, FromRow)]
pub struct UploadRow {
    pub upload_id: Uuid,
    pub upload_size: Option<i64>,
    pub size_is_deferred: bool,
    pub upload_offset: i64,
    pub metadata: String,
    pub is_partial: bool,
    pub is_final: bool,
    pub partial_uploads: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl UploadRow {
    /// Build a row from a domain record.
    pub fn from_info(info: &UploadInfo) -> MetadataResult<Self> {
        let partial_uploads: Vec<String> =
            info.partial_uploads.iter().map(|id| id.to_string()).collect();

        Ok(Self {
            upload_id: *info.id.as_uuid(),
            upload_size: info.size.map(|s| to_i64(info.id, "size", s)).transpose()?,
            size_is_deferred: info.size_is_deferred,
            upload_offset: to_i64(info.id, "offset", info.offset)?,
            metadata: serde_json::to_string(&info.metadata)?,
            is_partial: info.is_partial,
            is_final: info.is_final,
            partial_uploads: serde_json::to_string(&partial_uploads)?,
            created_at: info.created_at,
            updated_at: info.updated_at,
        })
    }

    /// Convert back into a domain record.
    pub fn into_info(self) -> MetadataResult<UploadInfo> {
        let id = UploadId::from_uuid(self.upload_id);
        let metadata: BTreeMap<String, String> = serde_json::from_str(&self.metadata)?;
        let partial_uploads = serde_json::from_str::<Vec<String>>(&self.partial_uploads)?
            .iter()
            .map(|s| {
                UploadId::parse(s).map_err(|e| MetadataError::Corrupt {
                    upload_id: id.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect::<MetadataResult<Vec<_>>>()?;

        Ok(UploadInfo {
            id,
            size: self
                .upload_size
                .map(|s| to_u64(id, "size", s))
                .transpose()?,
            size_is_deferred: self.size_is_deferred,
            offset: to_u64(id, "offset", self.upload_offset)?,
            metadata,
            is_partial: self.is_partial,
            is_final: self.is_final,
            partial_uploads,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Convert an unsigned domain value to the signed column type.
pub(crate) fn to_i64(id: UploadId, field: &str, value: u64) -> MetadataResult<i64> {
    i64::try_from(value).map_err(|_| MetadataError::Corrupt {
        upload_id: id.to_string(),
        reason: format!("{field} {value} exceeds {}", i64::MAX),
    })
}

fn to_u64(id: UploadId, field: &str, value: i64) -> MetadataResult<u64> {
    u64::try_from(value).map_err(|_| MetadataError::Corrupt {
        upload_id: id.to_string(),
        reason: format!("negative {field} {value}"),
    })
}
