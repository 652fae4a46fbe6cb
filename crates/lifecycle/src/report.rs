//! Storage usage reports.
//!
//! A report is a pure aggregation over an inventory snapshot and the quota.
//! Persisted reports are append-only: a new report never replaces an old one.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use remote::{Client, FileId, FolderId, Quota};
use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::config::RetentionConfig;
use crate::error::Result;
use crate::inventory::{FileRecord, Snapshot};
use crate::naming::{self, REPORT_MIME};
use crate::retention;

/// Usage percentage above which cleanup is recommended.
pub const USAGE_ALERT_PERCENT: f64 = 80.0;

/// Raw file count above which compaction is recommended.
pub const RAW_FILE_LIMIT: usize = 100;

/// Model file count above which pruning is recommended.
pub const MODEL_FILE_LIMIT: usize = 10;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Size and count for one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStats {
    #[serde(rename = "sizeMB")]
    pub size_mb: f64,
    pub file_count: usize,
    pub expired_count: usize,
}

/// Point-in-time storage report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageReport {
    pub timestamp_taken: DateTime<Utc>,
    #[serde(rename = "usedGB")]
    pub used_gb: f64,
    #[serde(rename = "limitGB")]
    pub limit_gb: f64,
    pub usage_percent: f64,
    pub per_category: BTreeMap<Category, CategoryStats>,
    pub recommendations: Vec<String>,
    pub warnings: Vec<String>,
}

impl StorageReport {
    /// Stats for a category (zeroed when absent).
    pub fn stats(&self, category: Category) -> CategoryStats {
        self.per_category.get(&category).copied().unwrap_or_default()
    }
}

/// Builds and persists [`StorageReport`]s.
pub struct StorageReportGenerator<'a> {
    cfg: &'a RetentionConfig,
}

impl<'a> StorageReportGenerator<'a> {
    pub fn new(cfg: &'a RetentionConfig) -> Self {
        Self { cfg }
    }

    /// Aggregate a snapshot into a report.
    pub fn generate(
        &self,
        quota: Quota,
        snapshot: &Snapshot,
        now: DateTime<Utc>,
        warnings: Vec<String>,
    ) -> StorageReport {
        let per_category: BTreeMap<Category, CategoryStats> = Category::ALL
            .into_iter()
            .map(|category| {
                let files = snapshot.files(category);
                let stats = CategoryStats {
                    size_mb: snapshot.bytes(category) as f64 / BYTES_PER_MB,
                    file_count: files.len(),
                    expired_count: retention::count_expired(files, now, self.cfg),
                };
                (category, stats)
            })
            .collect();

        let usage_percent = quota.usage_percent();
        let mut recommendations = Vec::new();

        if usage_percent > USAGE_ALERT_PERCENT {
            recommendations.push(format!(
                "Storage at {usage_percent:.1}% of the limit: run cleanup"
            ));
        }
        let raw = per_category[&Category::Raw].file_count;
        if raw > RAW_FILE_LIMIT {
            recommendations.push(format!("{raw} raw files: compress older data"));
        }
        let models = per_category[&Category::Models].file_count;
        if models > MODEL_FILE_LIMIT {
            recommendations.push(format!("{models} model files: prune model versions"));
        }
        let expired = per_category[&Category::Processed].expired_count;
        if expired > 0 {
            recommendations.push(format!(
                "{expired} processed file(s) older than {} days: review or delete them",
                self.cfg.processed_retention_days
            ));
        }

        StorageReport {
            timestamp_taken: now,
            used_gb: quota.used_gb(),
            limit_gb: quota.limit_gb(),
            usage_percent,
            per_category,
            recommendations,
            warnings,
        }
    }

    /// Upload a report into `logs` and return its name and handle.
    ///
    /// `existing` is the current `logs` listing; when a report with the same
    /// timestamp already exists the name is moved forward a second at a time
    /// so nothing is overwritten.
    pub fn persist(
        &self,
        client: &Client,
        logs: &FolderId,
        report: &StorageReport,
        existing: &[FileRecord],
    ) -> Result<(String, FileId)> {
        let mut at = report.timestamp_taken;
        let mut name = naming::report_name(at);
        while existing.iter().any(|f| f.name == name) {
            at += Duration::seconds(1);
            name = naming::report_name(at);
        }
        naming::validate(Category::Logs, &name)?;

        let body = serde_json::to_vec_pretty(report)?;
        let id = client.upload(logs, &name, &body, REPORT_MIME)?;
        log::info!("Saved report {}", name);
        Ok((name, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::{FolderLayout, FolderMap};
    use crate::inventory::StorageInventory;
    use chrono::TimeZone;
    use remote::backend::memory::MemoryBackend;
    use remote::{OrderBy, RetryPolicy};
    use std::sync::Arc;

    const GB: u64 = 1024 * 1024 * 1024;

    struct Fixture {
        store: Arc<MemoryBackend>,
        client: Client,
        folders: FolderMap,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryBackend::new());
        let client = Client::with_backend(Box::new(store.clone()))
            .with_retry_policy(RetryPolicy::no_retry());
        let mut folders = FolderMap::default();
        folders.resolve(&client, &FolderLayout::default()).unwrap();
        Fixture {
            store,
            client,
            folders,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn fill(fx: &Fixture, category: Category, count: usize) {
        let folder = fx.folders.get(category).unwrap();
        for i in 0..count {
            fx.store
                .insert_sized(folder, &format!("f{i}.csv"), 1024, now() - Duration::days(1))
                .unwrap();
        }
    }

    fn report(fx: &Fixture, quota: Quota) -> StorageReport {
        let cfg = RetentionConfig::default();
        let snapshot = StorageInventory::new(&fx.client, &fx.folders).snapshot();
        StorageReportGenerator::new(&cfg).generate(quota, &snapshot, now(), Vec::new())
    }

    fn quiet_quota() -> Quota {
        Quota {
            used_bytes: GB,
            limit_bytes: 15 * GB,
        }
    }

    #[test]
    fn test_raw_file_threshold_is_strict() {
        let fx = fixture();
        fill(&fx, Category::Raw, 100);
        assert!(report(&fx, quiet_quota()).recommendations.is_empty());

        fill(&fx, Category::Raw, 1);
        let recs = report(&fx, quiet_quota()).recommendations;
        assert_eq!(recs.len(), 1);
        assert!(recs[0].contains("compress older data"));
    }

    #[test]
    fn test_usage_and_model_recommendations() {
        let fx = fixture();
        fill(&fx, Category::Models, 11);
        let quota = Quota {
            used_bytes: 13 * GB,
            limit_bytes: 15 * GB,
        };

        let report = report(&fx, quota);

        assert_eq!(report.recommendations.len(), 2);
        assert!(report.recommendations[0].contains("run cleanup"));
        assert!(report.recommendations[1].contains("prune model versions"));
        assert_eq!(report.stats(Category::Models).file_count, 11);
    }

    #[test]
    fn test_expired_processed_files_are_counted() {
        let fx = fixture();
        let processed = fx.folders.get(Category::Processed).unwrap();
        fx.store
            .insert_sized(processed, "old.parquet", 10, now() - Duration::days(120))
            .unwrap();

        let report = report(&fx, quiet_quota());

        assert_eq!(report.stats(Category::Processed).expired_count, 1);
        assert!(report.recommendations[0].contains("older than 90 days"));
    }

    #[test]
    fn test_persist_never_overwrites() {
        let fx = fixture();
        let cfg = RetentionConfig::default();
        let generator = StorageReportGenerator::new(&cfg);
        let report = report(&fx, quiet_quota());
        let logs = fx.folders.get(Category::Logs).unwrap();
        let list = || {
            StorageInventory::new(&fx.client, &fx.folders)
                .list_category(Category::Logs, OrderBy::CreatedAsc)
        };

        let (first, _) = generator.persist(&fx.client, logs, &report, &list()).unwrap();
        let (second, id) = generator.persist(&fx.client, logs, &report, &list()).unwrap();

        assert_eq!(first, "storage_report_20240601_000000.json");
        assert_eq!(second, "storage_report_20240601_000001.json");
        assert_eq!(fx.store.file_names(logs).len(), 2);

        let saved: StorageReport = serde_json::from_slice(&fx.store.content(&id).unwrap()).unwrap();
        assert_eq!(saved.per_category.len(), 6);
    }

    #[test]
    fn test_report_json_field_names() {
        let fx = fixture();
        let json = serde_json::to_value(report(&fx, quiet_quota())).unwrap();
        assert!(json.get("usedGB").is_some());
        assert!(json.get("usagePercent").is_some());
        assert!(json["perCategory"]["raw"].get("sizeMB").is_some());
    }
}
