//! One lifecycle run, start to finish.
//!
//! ```text
//! Idle -> Inventorying -> Archiving -> ModelPruning -> Expiring
//!      -> UsageRecheck -> [EmergencyReclaiming] -> Reporting -> Done
//! ```
//!
//! A failing state is logged, recorded as degraded, and the run moves on.
//! Only an unreadable initial usage aborts a run.

use std::fmt;

use chrono::{DateTime, Utc};
use remote::{Client, OrderBy, Quota, RemoteFile};
use serde::Serialize;

use crate::archive::CompressionArchiver;
use crate::category::{Category, FolderMap};
use crate::config::RetentionConfig;
use crate::error::Result;
use crate::inventory::{FileRecord, StorageInventory};
use crate::legacy;
use crate::models::{self, ModelVersionManager, RetentionPlan};
use crate::reclaim::{self, EmergencyReclaimer, ReclaimOutcome};
use crate::report::{StorageReport, StorageReportGenerator};
use crate::retention::{self, MonthlyGroup};

/// States of a lifecycle run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LifecycleState {
    Idle,
    Inventorying,
    Archiving,
    ModelPruning,
    Expiring,
    UsageRecheck,
    EmergencyReclaiming,
    Reporting,
    Done,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Inventorying => "taking inventory",
            Self::Archiving => "archiving stale raw data",
            Self::ModelPruning => "pruning model versions",
            Self::Expiring => "expiring old archives",
            Self::UsageRecheck => "rechecking usage",
            Self::EmergencyReclaiming => "reclaiming space",
            Self::Reporting => "writing report",
            Self::Done => "done",
        };
        f.write_str(label)
    }
}

/// Callback for state transitions during a run.
pub trait RunObserver {
    /// Called when the run enters a state.
    fn on_state(&self, state: LifecycleState);
}

/// Observer that ignores every transition.
pub struct NoObserver;

impl RunObserver for NoObserver {
    fn on_state(&self, _state: LifecycleState) {}
}

/// Per-run switches that are not retention thresholds.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Adopt root-level files whose name contains this marker
    pub legacy_marker: Option<String>,
    /// Upload the final report into `logs`
    pub persist_report: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            legacy_marker: None,
            persist_report: true,
        }
    }
}

/// Aggregate result of a run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub initial_usage: Quota,
    pub final_usage: Quota,
    pub adopted: usize,
    pub archives_written: usize,
    /// Raw files merged into an archive and removed
    pub files_compressed: usize,
    pub files_deleted: usize,
    pub models_moved: usize,
    pub bytes_freed: u64,
    pub reclaim: Option<ReclaimOutcome>,
    pub degraded: Vec<LifecycleState>,
    pub warnings: Vec<String>,
    pub report: Option<StorageReport>,
    pub report_name: Option<String>,
}

impl RunSummary {
    fn new(started_at: DateTime<Utc>, initial_usage: Quota) -> Self {
        Self {
            started_at,
            initial_usage,
            final_usage: initial_usage,
            adopted: 0,
            archives_written: 0,
            files_compressed: 0,
            files_deleted: 0,
            models_moved: 0,
            bytes_freed: 0,
            reclaim: None,
            degraded: Vec::new(),
            warnings: Vec::new(),
            report: None,
            report_name: None,
        }
    }

    fn degrade(&mut self, state: LifecycleState, warning: String) {
        log::warn!("{}", warning);
        self.warnings.push(warning);
        if !self.degraded.contains(&state) {
            self.degraded.push(state);
        }
    }

    fn absorb(&mut self, state: LifecycleState, inventory: &mut StorageInventory<'_>) {
        let warnings = inventory.take_warnings();
        if warnings.is_empty() {
            return;
        }
        self.warnings.extend(warnings);
        if !self.degraded.contains(&state) {
            self.degraded.push(state);
        }
    }

    /// Final usage as a percentage of the store limit.
    pub fn final_usage_percent(&self) -> f64 {
        self.final_usage.usage_percent()
    }

    /// Emergency reclamation ran out of candidates.
    pub fn reclaim_shortfall(&self) -> bool {
        self.reclaim.as_ref().is_some_and(|r| r.shortfall)
    }

    /// Whether the run ended over `threshold_percent` or short of its
    /// reclaim target.
    pub fn needs_attention(&self, threshold_percent: f64) -> bool {
        self.final_usage_percent() > threshold_percent || self.reclaim_shortfall()
    }
}

/// What a run would do, computed without touching the store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunPlan {
    pub usage: Option<Quota>,
    pub legacy: Vec<(String, Option<Category>)>,
    pub monthly_groups: Vec<MonthlyGroup>,
    pub models: RetentionPlan,
    pub expired_archives: Vec<FileRecord>,
    /// Bytes emergency reclamation would target at current usage
    pub reclaim_target_bytes: u64,
    pub warnings: Vec<String>,
}

/// Sequences every component into one run.
pub struct LifecycleOrchestrator<'a> {
    client: &'a Client,
    folders: &'a FolderMap,
    cfg: &'a RetentionConfig,
    options: RunOptions,
    observer: &'a dyn RunObserver,
}

impl<'a> LifecycleOrchestrator<'a> {
    /// Create an orchestrator, rejecting an invalid config up front.
    pub fn new(
        client: &'a Client,
        folders: &'a FolderMap,
        cfg: &'a RetentionConfig,
    ) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            client,
            folders,
            cfg,
            options: RunOptions::default(),
            observer: &NoObserver,
        })
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_observer(mut self, observer: &'a dyn RunObserver) -> Self {
        self.observer = observer;
        self
    }

    fn enter(&self, state: LifecycleState) {
        log::info!("Lifecycle: {}", state);
        self.observer.on_state(state);
    }

    fn inventory(&self) -> StorageInventory<'a> {
        StorageInventory::new(self.client, self.folders)
    }

    /// Run the whole lifecycle as of `now`.
    pub fn run(&self, now: DateTime<Utc>) -> Result<RunSummary> {
        self.enter(LifecycleState::Inventorying);
        let initial = self.inventory().usage()?;
        log::info!(
            "Initial usage {:.2} GB of {:.2} GB",
            initial.used_gb(),
            initial.limit_gb()
        );
        let mut summary = RunSummary::new(now, initial);
        self.adopt_legacy(&mut summary);

        self.enter(LifecycleState::Archiving);
        self.archive(now, &mut summary);

        self.enter(LifecycleState::ModelPruning);
        self.prune_models(&mut summary);

        self.enter(LifecycleState::Expiring);
        self.expire_archives(now, &mut summary);

        self.enter(LifecycleState::UsageRecheck);
        match self.inventory().usage() {
            Ok(usage) => {
                summary.final_usage = usage;
                if reclaim::target_bytes(usage.used_bytes, self.cfg) > 0 {
                    self.enter(LifecycleState::EmergencyReclaiming);
                    self.reclaim(usage, &mut summary);
                }
            }
            Err(e) => summary.degrade(
                LifecycleState::UsageRecheck,
                format!("Could not recheck usage: {e}"),
            ),
        }

        self.enter(LifecycleState::Reporting);
        self.report(now, &mut summary);

        self.enter(LifecycleState::Done);
        log::info!(
            "Run finished: {} archive(s), {} deletion(s), {} move(s), {} degraded state(s)",
            summary.archives_written,
            summary.files_deleted,
            summary.models_moved,
            summary.degraded.len()
        );
        Ok(summary)
    }

    fn adopt_legacy(&self, summary: &mut RunSummary) {
        let Some(marker) = self.options.legacy_marker.as_deref() else {
            return;
        };
        match legacy::adopt_unfiled(self.client, self.folders, marker) {
            Ok(outcome) => {
                summary.adopted = outcome.adopted;
                for (name, error) in outcome.failures {
                    summary.degrade(
                        LifecycleState::Inventorying,
                        format!("Could not adopt {name}: {error}"),
                    );
                }
            }
            Err(e) => summary.degrade(
                LifecycleState::Inventorying,
                format!("Legacy adoption failed: {e}"),
            ),
        }
    }

    fn archive(&self, now: DateTime<Utc>, summary: &mut RunSummary) {
        let state = LifecycleState::Archiving;
        let mut inventory = self.inventory();
        let raw = inventory.list_category(Category::Raw, OrderBy::CreatedAsc);
        let existing = inventory.list_category(Category::Compressed, OrderBy::CreatedAsc);
        summary.absorb(state, &mut inventory);

        let cutoff = retention::archive_cutoff(now, self.cfg);
        let groups = retention::classify_for_archive(&raw, cutoff);
        if groups.is_empty() {
            log::info!("No stale raw data to archive");
            return;
        }

        let target = match self.folders.get(Category::Compressed) {
            Ok(target) => target,
            Err(e) => return summary.degrade(state, e.to_string()),
        };
        let archiver = CompressionArchiver::new(self.client, target);

        for group in groups.values() {
            match archiver.archive_month(group, &existing) {
                Ok(outcome) => {
                    summary.archives_written += outcome.archives.len();
                    summary.files_compressed += outcome.deleted;
                    summary.files_deleted += outcome.deleted + outcome.superseded;
                    summary.bytes_freed += outcome.bytes_freed();
                    for name in &outcome.skipped {
                        summary
                            .warnings
                            .push(format!("{name} could not be archived and was kept"));
                    }
                    for error in outcome.errors {
                        let message = format!("Archiving {} failed: {error}", group.month);
                        summary.degrade(state, message);
                    }
                    for (name, error) in outcome.failures {
                        let message = format!("Archived {name} but could not delete it: {error}");
                        summary.degrade(state, message);
                    }
                }
                Err(e) => {
                    summary.degrade(state, format!("Archiving {} failed: {e}", group.month));
                }
            }
        }
    }

    fn model_plan(&self, inventory: &mut StorageInventory<'_>) -> RetentionPlan {
        let models = inventory.list_category(Category::Models, OrderBy::ModifiedDesc);
        let backups = inventory.list_category(Category::Backups, OrderBy::ModifiedDesc);
        let logs = inventory.list_category(Category::Logs, OrderBy::CreatedAsc);

        let metrics = models::load_metrics(self.client, &logs);
        let candidates = models::candidates(models, backups, self.cfg);
        models::plan_retention(models::score_models(candidates, &metrics), self.cfg)
    }

    fn prune_models(&self, summary: &mut RunSummary) {
        let state = LifecycleState::ModelPruning;
        let mut inventory = self.inventory();
        let plan = self.model_plan(&mut inventory);
        summary.absorb(state, &mut inventory);

        let (models, backups) = match (
            self.folders.get(Category::Models),
            self.folders.get(Category::Backups),
        ) {
            (Ok(m), Ok(b)) => (m, b),
            (Err(e), _) | (_, Err(e)) => return summary.degrade(state, e.to_string()),
        };

        let outcome = ModelVersionManager::new(self.client, models, backups).apply(&plan);
        summary.models_moved += outcome.moved();
        summary.files_deleted += outcome.deleted;
        summary.bytes_freed += outcome.deleted_bytes;
        for (name, error) in outcome.failures {
            summary.degrade(state, format!("Model {name} left in place: {error}"));
        }
    }

    fn expire_archives(&self, now: DateTime<Utc>, summary: &mut RunSummary) {
        let state = LifecycleState::Expiring;
        let mut inventory = self.inventory();
        let compressed = inventory.list_category(Category::Compressed, OrderBy::CreatedAsc);
        summary.absorb(state, &mut inventory);

        let expired: Vec<RemoteFile> = retention::expired_archives(&compressed, now, self.cfg)
            .iter()
            .map(FileRecord::to_remote)
            .collect();
        if expired.is_empty() {
            return;
        }

        let result = self.client.delete_bulk(&expired);
        log::info!("Expired {} of {} archive(s)", result.succeeded, result.total());
        summary.files_deleted += result.succeeded;
        summary.bytes_freed += result.bytes;
        for (name, error) in result.errors {
            summary.degrade(state, format!("Could not expire {name}: {error}"));
        }
    }

    fn reclaim(&self, usage: Quota, summary: &mut RunSummary) {
        let state = LifecycleState::EmergencyReclaiming;
        let mut inventory = self.inventory();
        let candidates = inventory.list_category(Category::Processed, OrderBy::CreatedAsc);
        summary.absorb(state, &mut inventory);

        let outcome =
            EmergencyReclaimer::new(self.client).reclaim(usage.used_bytes, &candidates, self.cfg);
        summary.files_deleted += outcome.deleted;
        summary.bytes_freed += outcome.freed_bytes;
        for (name, error) in &outcome.failures {
            summary.degrade(state, format!("Could not reclaim {name}: {error}"));
        }
        if outcome.shortfall {
            summary.warnings.push(format!(
                "Emergency reclamation freed {:.2} GB of the {:.2} GB needed",
                outcome.freed_gb(),
                outcome.target_bytes as f64 / reclaim::BYTES_PER_GB as f64
            ));
        }
        summary.reclaim = Some(outcome);
    }

    fn report(&self, now: DateTime<Utc>, summary: &mut RunSummary) {
        let state = LifecycleState::Reporting;
        let mut inventory = self.inventory();
        match inventory.usage() {
            Ok(usage) => summary.final_usage = usage,
            Err(e) => summary.degrade(state, format!("Could not read final usage: {e}")),
        }
        let snapshot = inventory.snapshot();
        summary.absorb(state, &mut inventory);

        let generator = StorageReportGenerator::new(self.cfg);
        let warnings = summary.warnings.clone();
        let report = generator.generate(summary.final_usage, &snapshot, now, warnings);

        if self.options.persist_report {
            let existing = snapshot.files(Category::Logs);
            let persisted = self
                .folders
                .get(Category::Logs)
                .and_then(|logs| generator.persist(self.client, logs, &report, existing));
            match persisted {
                Ok((name, _)) => summary.report_name = Some(name),
                Err(e) => summary.degrade(state, format!("Could not save report: {e}")),
            }
        }
        summary.report = Some(report);
    }

    /// Generate (and optionally persist) a report without running any
    /// other state.
    pub fn report_only(&self, now: DateTime<Utc>) -> Result<(StorageReport, Option<String>)> {
        let mut inventory = self.inventory();
        let usage = inventory.usage()?;
        let snapshot = inventory.snapshot();
        let warnings = inventory.take_warnings();

        let generator = StorageReportGenerator::new(self.cfg);
        let report = generator.generate(usage, &snapshot, now, warnings);
        let name = if self.options.persist_report {
            let logs = self.folders.get(Category::Logs)?;
            let existing = snapshot.files(Category::Logs);
            let (name, _) = generator.persist(self.client, logs, &report, existing)?;
            Some(name)
        } else {
            None
        };
        Ok((report, name))
    }

    /// Work out what [`run`](Self::run) would do, without mutating anything.
    pub fn plan(&self, now: DateTime<Utc>) -> RunPlan {
        let mut inventory = self.inventory();
        let mut warnings = Vec::new();

        let usage = match inventory.usage() {
            Ok(usage) => Some(usage),
            Err(e) => {
                warnings.push(format!("Could not read usage: {e}"));
                None
            }
        };

        let legacy = match self.options.legacy_marker.as_deref() {
            Some(marker) => match self.client.list_unfiled(marker) {
                Ok(files) => files
                    .into_iter()
                    .map(|f| {
                        let category = legacy::infer_category(&f.name);
                        (f.name, category)
                    })
                    .collect(),
                Err(e) => {
                    warnings.push(format!("Could not list unfiled files: {e}"));
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let raw = inventory.list_category(Category::Raw, OrderBy::CreatedAsc);
        let cutoff = retention::archive_cutoff(now, self.cfg);
        let monthly_groups = retention::classify_for_archive(&raw, cutoff)
            .into_values()
            .collect();
        let models = self.model_plan(&mut inventory);
        let compressed = inventory.list_category(Category::Compressed, OrderBy::CreatedAsc);
        let expired_archives = retention::expired_archives(&compressed, now, self.cfg);
        let reclaim_target_bytes =
            usage.map_or(0, |u| reclaim::target_bytes(u.used_bytes, self.cfg));

        warnings.extend(inventory.take_warnings());
        RunPlan {
            usage,
            legacy,
            monthly_groups,
            models,
            expired_archives,
            reclaim_target_bytes,
            warnings,
        }
    }
}
