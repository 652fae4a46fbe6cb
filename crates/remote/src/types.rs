use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Opaque handle identifying a file in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    /// Wrap a backend-specific identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle identifying a folder (container) in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FolderId(String);

impl FolderId {
    /// Wrap a backend-specific identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sort order requested from a listing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderBy {
    /// Oldest first by creation time
    #[default]
    CreatedAsc,
    /// Newest first by creation time
    CreatedDesc,
    /// Most recently modified first
    ModifiedDesc,
}

/// Metadata for a single remote file, as returned by a listing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Backend handle
    pub id: FileId,
    /// File name (no folder component)
    pub name: String,
    /// Size in bytes (0 when the store does not report one)
    pub size: u64,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub modified_at: DateTime<Utc>,
}

/// Storage quota as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    /// Bytes currently used
    pub used_bytes: u64,
    /// Total bytes allowed
    pub limit_bytes: u64,
}

impl Quota {
    /// Used space in GiB.
    pub fn used_gb(&self) -> f64 {
        self.used_bytes as f64 / BYTES_PER_GB
    }

    /// Quota limit in GiB.
    pub fn limit_gb(&self) -> f64 {
        self.limit_bytes as f64 / BYTES_PER_GB
    }

    /// Used space as a percentage of the limit (0 when the limit is unknown).
    pub fn usage_percent(&self) -> f64 {
        if self.limit_bytes == 0 {
            return 0.0;
        }
        self.used_bytes as f64 / self.limit_bytes as f64 * 100.0
    }
}

/// Result of a bulk operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkResult {
    /// Number of files successfully processed
    pub succeeded: usize,
    /// Number of files that failed
    pub failed: usize,
    /// Total bytes affected
    pub bytes: u64,
    /// File names that failed with error messages
    pub errors: Vec<(String, String)>,
}

impl BulkResult {
    /// Add a success
    pub fn add_success(&mut self, bytes: u64) {
        self.succeeded += 1;
        self.bytes += bytes;
    }

    /// Add a failure
    pub fn add_failure(&mut self, name: String, error: String) {
        self.failed += 1;
        self.errors.push((name, error));
    }

    /// Check if all operations succeeded
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total files processed
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_conversions() {
        let quota = Quota {
            used_bytes: 3 * 1024 * 1024 * 1024,
            limit_bytes: 15 * 1024 * 1024 * 1024,
        };
        assert!((quota.used_gb() - 3.0).abs() < f64::EPSILON);
        assert!((quota.limit_gb() - 15.0).abs() < f64::EPSILON);
        assert!((quota.usage_percent() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_quota_unknown_limit() {
        let quota = Quota {
            used_bytes: 10,
            limit_bytes: 0,
        };
        assert_eq!(quota.usage_percent(), 0.0);
    }

    #[test]
    fn test_bulk_result_tracking() {
        let mut result = BulkResult::default();
        result.add_success(100);
        result.add_success(50);
        result.add_failure("a.csv".into(), "denied".into());

        assert_eq!(result.total(), 3);
        assert_eq!(result.bytes, 150);
        assert!(!result.is_success());
    }
}
