//! Last-resort deletion when usage is still over quota.

use remote::Client;
use serde::Serialize;

use crate::category::Category;
use crate::config::RetentionConfig;
use crate::inventory::FileRecord;

/// Bytes per GB as the store reports quota (binary gigabytes).
pub const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// Only these categories are ever reclaimed.
pub const RECLAIMABLE: [Category; 1] = [Category::Processed];

/// What a reclamation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReclaimOutcome {
    pub target_bytes: u64,
    pub freed_bytes: u64,
    pub deleted: usize,
    pub failures: Vec<(String, String)>,
    /// Candidates ran out before the target was met
    pub shortfall: bool,
}

impl ReclaimOutcome {
    pub fn freed_gb(&self) -> f64 {
        self.freed_bytes as f64 / BYTES_PER_GB as f64
    }
}

/// Bytes that must be freed to get back under quota with 1 GB of headroom.
///
/// Zero when usage is at or below the limit.
pub fn target_bytes(used_bytes: u64, cfg: &RetentionConfig) -> u64 {
    let max_bytes = (cfg.max_storage_gb * BYTES_PER_GB as f64) as u64;
    if used_bytes <= max_bytes {
        return 0;
    }
    used_bytes - max_bytes + BYTES_PER_GB
}

/// Deletes the oldest reclaimable files until a target is met.
pub struct EmergencyReclaimer<'a> {
    client: &'a Client,
}

impl<'a> EmergencyReclaimer<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Free at least `target_bytes(used_bytes)` by deleting candidates oldest
    /// first.
    ///
    /// Files outside the reclaimable categories are ignored whatever the
    /// caller passes in. A failed deletion frees nothing and the pass moves
    /// on to the next candidate.
    pub fn reclaim(
        &self,
        used_bytes: u64,
        candidates: &[FileRecord],
        cfg: &RetentionConfig,
    ) -> ReclaimOutcome {
        let target = target_bytes(used_bytes, cfg);
        let mut outcome = ReclaimOutcome {
            target_bytes: target,
            ..Default::default()
        };
        if target == 0 {
            return outcome;
        }

        let mut ordered: Vec<&FileRecord> = candidates
            .iter()
            .filter(|f| RECLAIMABLE.contains(&f.category))
            .collect();
        ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        log::warn!(
            "Usage over quota, reclaiming {:.2} GB from {} candidate(s)",
            target as f64 / BYTES_PER_GB as f64,
            ordered.len()
        );

        for file in ordered {
            if outcome.freed_bytes >= target {
                break;
            }
            match self.client.delete(&file.id) {
                Ok(()) => {
                    log::debug!("Reclaimed {} ({} bytes)", file.name, file.size_bytes);
                    outcome.deleted += 1;
                    outcome.freed_bytes += file.size_bytes;
                }
                Err(e) => {
                    log::warn!("Failed to reclaim {}: {}", file.name, e);
                    outcome.failures.push((file.name.clone(), e.to_string()));
                }
            }
        }

        outcome.shortfall = outcome.freed_bytes < target;
        if outcome.shortfall {
            log::warn!(
                "Reclaimed {:.2} GB, short of the {:.2} GB target",
                outcome.freed_gb(),
                target as f64 / BYTES_PER_GB as f64
            );
        } else {
            log::info!("Reclaimed {:.2} GB in {} deletion(s)", outcome.freed_gb(), outcome.deleted);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::{FolderLayout, FolderMap};
    use crate::inventory::StorageInventory;
    use chrono::{Duration, TimeZone, Utc};
    use remote::backend::memory::MemoryBackend;
    use remote::{OrderBy, RetryPolicy};
    use std::sync::Arc;

    const GB: u64 = BYTES_PER_GB;

    fn setup(processed_gb: &[u64]) -> (Arc<MemoryBackend>, Client, FolderMap) {
        let store = Arc::new(MemoryBackend::new());
        let client = Client::with_backend(Box::new(store.clone()))
            .with_retry_policy(RetryPolicy::no_retry());
        let mut folders = FolderMap::default();
        folders.resolve(&client, &FolderLayout::default()).unwrap();
        let processed = folders.get(Category::Processed).unwrap();
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for (i, size) in processed_gb.iter().enumerate() {
            let name = format!("features_{i}.parquet");
            store
                .insert_sized(processed, &name, size * GB, t + Duration::days(i as i64))
                .unwrap();
        }
        (store, client, folders)
    }

    fn processed(client: &Client, folders: &FolderMap) -> Vec<FileRecord> {
        StorageInventory::new(client, folders)
            .list_category(Category::Processed, OrderBy::CreatedAsc)
    }

    fn reclaim(client: &Client, used_bytes: u64, files: &[FileRecord]) -> ReclaimOutcome {
        EmergencyReclaimer::new(client).reclaim(used_bytes, files, &RetentionConfig::default())
    }

    #[test]
    fn test_target_includes_headroom() {
        let cfg = RetentionConfig::default();
        assert_eq!(target_bytes(14 * GB, &cfg), 3 * GB);
        assert_eq!(target_bytes(12 * GB, &cfg), 0);
        assert_eq!(target_bytes(GB, &cfg), 0);
    }

    #[test]
    fn test_frees_enough_oldest_first() {
        let (store, client, folders) = setup(&[1, 1, 1, 1, 1]);
        let files = processed(&client, &folders);

        let outcome = reclaim(&client, 14 * GB, &files);

        assert!(outcome.freed_bytes >= 3 * GB);
        assert_eq!(outcome.deleted, 3);
        assert!(!outcome.shortfall);
        assert!(!store.contains(&files[0].id));
        assert!(!store.contains(&files[2].id));
        assert!(store.contains(&files[3].id));
    }

    #[test]
    fn test_reports_shortfall() {
        let (_store, client, folders) = setup(&[1, 1]);
        let files = processed(&client, &folders);

        let outcome = reclaim(&client, 14 * GB, &files);

        assert_eq!(outcome.freed_bytes, 2 * GB);
        assert!(outcome.shortfall);
    }

    #[test]
    fn test_failed_delete_frees_nothing() {
        let (store, client, folders) = setup(&[2, 1, 2]);
        let files = processed(&client, &folders);
        store.fail_delete(&files[0].id);

        let outcome = reclaim(&client, 14 * GB, &files);

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.freed_bytes, 3 * GB);
        assert!(store.contains(&files[0].id));
    }

    #[test]
    fn test_skips_protected_categories() {
        let (_store, client, _folders) = setup(&[]);
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let model = FileRecord {
            id: remote::FileId::new("m"),
            name: "best.h5".into(),
            size_bytes: 5 * GB,
            created_at: at,
            modified_at: at,
            category: Category::Models,
        };

        let outcome = reclaim(&client, 14 * GB, &[model]);

        assert_eq!(outcome.deleted, 0);
        assert!(outcome.shortfall);
    }

    #[test]
    fn test_not_triggered_under_quota() {
        let (_store, client, folders) = setup(&[1]);
        let files = processed(&client, &folders);
        let outcome = reclaim(&client, 11 * GB, &files);
        assert_eq!(outcome, ReclaimOutcome::default());
    }
}
