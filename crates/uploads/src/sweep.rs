//! Reconciliation sweep results.

use serde::{Deserialize, Serialize};

/// Outcome of one reconciliation sweep across the record and blob stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Number of records listed.
    pub records_scanned: u64,
    /// Number of blobs listed.
    pub blobs_scanned: u64,
    /// Records whose blob is missing.
    pub orphan_records: u64,
    /// Blobs with no record.
    pub orphan_blobs: u64,
    /// Orphans actually deleted (always 0 in dry-run mode).
    pub items_deleted: u64,
    /// Errors encountered; the sweep continues past them.
    pub errors: u64,
    /// Whether deletions were suppressed.
    pub dry_run: bool,
}

impl SweepReport {
    /// Total orphans found, whether or not they were deleted.
    pub fn orphans(&self) -> u64 {
        self.orphan_records + self.orphan_blobs
    }

    /// True when both stores agree and nothing failed.
    pub fn is_clean(&self) -> bool {
        self.orphans() == 0 && self.errors == 0
    }
}
