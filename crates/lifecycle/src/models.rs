//! Ranking and pruning of model artifacts.
//!
//! Artifacts in `models` and `backups` are ranked together by their recorded
//! performance score. The top `modelsToKeep` live in `models`, the next tier
//! in `backups`, and everything below is deleted.

use std::collections::HashMap;

use remote::{Client, FolderId};
use serde::Serialize;

use crate::category::Category;
use crate::config::RetentionConfig;
use crate::error::Result;
use crate::inventory::FileRecord;
use crate::naming::METRICS_MARKER;

/// Recorded performance per artifact name.
pub type Metrics = HashMap<String, f64>;

/// A model artifact with its score.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRecord {
    pub file: FileRecord,
    pub performance_score: f64,
    /// No usable metric was recorded; ranks after every scored artifact
    pub defaulted: bool,
}

/// Parse a metrics file: a JSON object mapping artifact name to score.
///
/// Entries whose value is not a finite number are ignored.
pub fn parse_metrics(bytes: &[u8]) -> Result<Metrics> {
    let value: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(bytes)?;
    Ok(value
        .into_iter()
        .filter_map(|(name, v)| v.as_f64().filter(|s| s.is_finite()).map(|s| (name, s)))
        .collect())
}

/// Load metrics from the newest `model_metrics` file among `logs`.
///
/// A missing or unreadable file is not an error: every model is defaulted.
pub fn load_metrics(client: &Client, logs: &[FileRecord]) -> Metrics {
    let Some(file) = logs
        .iter()
        .filter(|f| f.name.contains(METRICS_MARKER))
        .max_by_key(|f| (f.created_at, f.id.clone()))
    else {
        log::info!("No model metrics recorded; ranking by recency only");
        return Metrics::new();
    };

    let parsed = client
        .download(&file.id)
        .map_err(crate::Error::from)
        .and_then(|bytes| parse_metrics(&bytes));
    match parsed {
        Ok(metrics) => {
            log::debug!("Loaded {} metric(s) from {}", metrics.len(), file.name);
            metrics
        }
        Err(e) => {
            log::warn!("Could not read model metrics from {}: {}", file.name, e);
            Metrics::new()
        }
    }
}

/// Model artifacts eligible for ranking: `models` first, then `backups`.
///
/// Both listings are expected most-recently-modified first, which is the
/// order ties keep after ranking.
pub fn candidates(
    models: Vec<FileRecord>,
    backups: Vec<FileRecord>,
    cfg: &RetentionConfig,
) -> Vec<FileRecord> {
    models
        .into_iter()
        .chain(backups)
        .filter(|f| cfg.is_model_artifact(&f.name))
        .collect()
}

/// Attach scores to artifacts.
pub fn score_models(files: Vec<FileRecord>, metrics: &Metrics) -> Vec<ModelRecord> {
    files
        .into_iter()
        .map(|file| match metrics.get(&file.name) {
            Some(&score) => ModelRecord {
                file,
                performance_score: score,
                defaulted: false,
            },
            None => ModelRecord {
                file,
                performance_score: 0.0,
                defaulted: true,
            },
        })
        .collect()
}

/// Where each artifact ends up.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPlan {
    pub keep_primary: Vec<ModelRecord>,
    pub keep_backup: Vec<ModelRecord>,
    pub to_delete: Vec<ModelRecord>,
}

impl RetentionPlan {
    /// Artifacts that have to change folder.
    pub fn moves(&self) -> usize {
        let restores = self
            .keep_primary
            .iter()
            .filter(|m| m.file.category != Category::Models)
            .count();
        let demotions = self
            .keep_backup
            .iter()
            .filter(|m| m.file.category != Category::Backups)
            .count();
        restores + demotions
    }
}

/// Rank artifacts and split them into primary, backup and delete tiers.
///
/// Scored artifacts sort by score, highest first; defaulted ones follow.
/// The sort is stable, so equal scores keep their input order.
pub fn plan_retention(mut models: Vec<ModelRecord>, cfg: &RetentionConfig) -> RetentionPlan {
    models.sort_by(|a, b| {
        a.defaulted
            .cmp(&b.defaulted)
            .then_with(|| b.performance_score.total_cmp(&a.performance_score))
    });

    let backup_end = cfg.backup_models_to_keep.max(cfg.models_to_keep);
    let to_delete = models.split_off(backup_end.min(models.len()));
    let keep_backup = models.split_off(cfg.models_to_keep.min(models.len()));

    RetentionPlan {
        keep_primary: models,
        keep_backup,
        to_delete,
    }
}

/// What applying a plan did.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelOutcome {
    pub kept: usize,
    /// Moved from `models` to `backups`
    pub demoted: usize,
    /// Moved from `backups` back to `models`
    pub restored: usize,
    pub deleted: usize,
    pub deleted_bytes: u64,
    pub failures: Vec<(String, String)>,
}

impl ModelOutcome {
    pub fn moved(&self) -> usize {
        self.demoted + self.restored
    }
}

/// Applies a [`RetentionPlan`] to the store.
pub struct ModelVersionManager<'a> {
    client: &'a Client,
    models: &'a FolderId,
    backups: &'a FolderId,
}

impl<'a> ModelVersionManager<'a> {
    pub fn new(client: &'a Client, models: &'a FolderId, backups: &'a FolderId) -> Self {
        Self {
            client,
            models,
            backups,
        }
    }

    /// Move artifacts into their tier, then delete the rest.
    ///
    /// A failed move leaves the artifact where it is; it is never deleted
    /// as a fallback.
    pub fn apply(&self, plan: &RetentionPlan) -> ModelOutcome {
        let mut outcome = ModelOutcome::default();

        for model in &plan.keep_primary {
            if model.file.category == Category::Models {
                log::debug!("Keeping {} (score {:.4})", model.file.name, model.performance_score);
                outcome.kept += 1;
            } else if self.relocate(model, self.models, &mut outcome) {
                outcome.restored += 1;
            }
        }

        for model in &plan.keep_backup {
            if model.file.category == Category::Backups {
                outcome.kept += 1;
            } else if self.relocate(model, self.backups, &mut outcome) {
                outcome.demoted += 1;
            }
        }

        for model in &plan.to_delete {
            match self.client.delete(&model.file.id) {
                Ok(()) => {
                    log::debug!("Deleted model {}", model.file.name);
                    outcome.deleted += 1;
                    outcome.deleted_bytes += model.file.size_bytes;
                }
                Err(e) => {
                    log::warn!("Failed to delete model {}: {}", model.file.name, e);
                    outcome
                        .failures
                        .push((model.file.name.clone(), e.to_string()));
                }
            }
        }

        log::info!(
            "Models: {} kept, {} moved, {} deleted",
            outcome.kept,
            outcome.moved(),
            outcome.deleted
        );
        outcome
    }

    fn relocate(&self, model: &ModelRecord, target: &FolderId, outcome: &mut ModelOutcome) -> bool {
        match self.client.move_to_folder(&model.file.id, target) {
            Ok(()) => {
                log::debug!("Moved {} to {}", model.file.name, target);
                true
            }
            Err(e) => {
                log::warn!("Failed to move {}, leaving it in place: {}", model.file.name, e);
                outcome
                    .failures
                    .push((model.file.name.clone(), e.to_string()));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::{FolderLayout, FolderMap};
    use chrono::{Duration, TimeZone, Utc};
    use remote::backend::memory::MemoryBackend;
    use remote::{FileId, RetryPolicy};
    use std::sync::Arc;

    fn record(name: &str, category: Category) -> FileRecord {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        FileRecord {
            id: FileId::new(name),
            name: name.to_string(),
            size_bytes: 100,
            created_at: at,
            modified_at: at,
            category,
        }
    }

    fn names(models: &[ModelRecord]) -> Vec<&str> {
        models.iter().map(|m| m.file.name.as_str()).collect()
    }

    fn tiers(keep: usize, backup: usize) -> RetentionConfig {
        RetentionConfig {
            models_to_keep: keep,
            backup_models_to_keep: backup,
            ..Default::default()
        }
    }

    #[test]
    fn test_ties_keep_listing_order() {
        let metrics = Metrics::from([("A".into(), 0.9), ("B".into(), 0.9), ("C".into(), 0.7)]);
        let files = vec![
            record("A", Category::Models),
            record("B", Category::Models),
            record("C", Category::Models),
        ];

        let plan = plan_retention(score_models(files, &metrics), &tiers(1, 2));

        assert_eq!(names(&plan.keep_primary), ["A"]);
        assert_eq!(names(&plan.keep_backup), ["B"]);
        assert_eq!(names(&plan.to_delete), ["C"]);
    }

    #[test]
    fn test_defaulted_rank_last() {
        let metrics = Metrics::from([("low.h5".into(), -5.0)]);
        let files = vec![
            record("unknown.h5", Category::Models),
            record("low.h5", Category::Models),
        ];

        let plan = plan_retention(score_models(files, &metrics), &tiers(1, 1));

        assert_eq!(names(&plan.keep_primary), ["low.h5"]);
        assert!(plan.to_delete[0].defaulted);
    }

    #[test]
    fn test_small_sets_fill_top_tiers() {
        let files = vec![record("only.h5", Category::Models)];
        let plan = plan_retention(score_models(files, &Metrics::new()), &tiers(3, 5));
        assert_eq!(plan.keep_primary.len(), 1);
        assert!(plan.keep_backup.is_empty());
        assert!(plan.to_delete.is_empty());
    }

    #[test]
    fn test_parse_metrics_ignores_non_numbers() {
        let metrics = parse_metrics(br#"{"a.h5": 0.8, "b.h5": "n/a", "c.h5": 3}"#).unwrap();
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics["c.h5"], 3.0);
        assert!(parse_metrics(b"[1, 2]").is_err());
    }

    #[test]
    fn test_candidates_filter_extensions() {
        let cfg = RetentionConfig::default();
        let all = candidates(
            vec![record("a.h5", Category::Models), record("notes.txt", Category::Models)],
            vec![record("b.h5", Category::Backups)],
            &cfg,
        );
        let names: Vec<&str> = all.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["a.h5", "b.h5"]);
    }

    #[test]
    fn test_load_metrics_uses_newest_file() {
        let store = Arc::new(MemoryBackend::new());
        let client = Client::with_backend(Box::new(store.clone()))
            .with_retry_policy(RetryPolicy::no_retry());
        let mut folders = FolderMap::default();
        folders.resolve(&client, &FolderLayout::default()).unwrap();
        let logs = folders.get(Category::Logs).unwrap();
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let old = store
            .insert_file(logs, "model_metrics_old.json", br#"{"a.h5": 0.1}"#, t)
            .unwrap();
        let new = store
            .insert_file(logs, "model_metrics.json", br#"{"a.h5": 0.9}"#, t + Duration::days(1))
            .unwrap();
        let listed = vec![
            FileRecord {
                id: old,
                name: "model_metrics_old.json".into(),
                ..record("x", Category::Logs)
            },
            FileRecord {
                id: new.clone(),
                name: "model_metrics.json".into(),
                created_at: t + Duration::days(1),
                ..record("y", Category::Logs)
            },
        ];

        assert_eq!(load_metrics(&client, &listed)["a.h5"], 0.9);

        store.fail_download(&new);
        assert!(load_metrics(&client, &listed).is_empty());
    }

    #[test]
    fn test_apply_moves_before_deleting() {
        let store = Arc::new(MemoryBackend::new());
        let client = Client::with_backend(Box::new(store.clone()))
            .with_retry_policy(RetryPolicy::no_retry());
        let mut folders = FolderMap::default();
        folders.resolve(&client, &FolderLayout::default()).unwrap();
        let models = folders.get(Category::Models).unwrap();
        let backups = folders.get(Category::Backups).unwrap();
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let best = store.insert_sized(backups, "best.h5", 10, t).unwrap();
        let mid = store.insert_sized(models, "mid.h5", 10, t).unwrap();
        let stuck = store.insert_sized(models, "stuck.h5", 10, t).unwrap();
        let worst = store.insert_sized(models, "worst.h5", 10, t).unwrap();
        store.fail_move(&stuck);

        let at = |id: &FileId, name: &str, category| FileRecord {
            id: id.clone(),
            name: name.into(),
            ..record(name, category)
        };
        let metrics = Metrics::from([
            ("best.h5".into(), 0.99),
            ("mid.h5".into(), 0.8),
            ("stuck.h5".into(), 0.7),
            ("worst.h5".into(), 0.1),
        ]);
        let files = vec![
            at(&mid, "mid.h5", Category::Models),
            at(&stuck, "stuck.h5", Category::Models),
            at(&worst, "worst.h5", Category::Models),
            at(&best, "best.h5", Category::Backups),
        ];
        let plan = plan_retention(score_models(files, &metrics), &tiers(2, 3));
        assert_eq!(plan.moves(), 2);

        let outcome = ModelVersionManager::new(&client, models, backups).apply(&plan);

        assert_eq!(outcome.restored, 1);
        assert_eq!(outcome.demoted, 0);
        assert_eq!(outcome.deleted, 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(store.parent_of(&best).as_ref(), Some(models));
        assert_eq!(store.parent_of(&stuck).as_ref(), Some(models));
        assert!(!store.contains(&worst));
    }
}
