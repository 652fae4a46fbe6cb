//! # lifecycle
//!
//! Storage lifecycle engine for a quota-limited remote store holding
//! time-series data and trained models.
//!
//! One [`LifecycleOrchestrator::run`] takes inventory, archives stale raw
//! data by month, ranks and prunes model artifacts, expires old archives,
//! falls back to emergency reclamation while usage is over quota, and ends
//! with a [`StorageReport`].
//!
//! ## Example
//!
//! ```no_run
//! use chrono::Utc;
//! use lifecycle::{FolderLayout, FolderMap, LifecycleOrchestrator, RetentionConfig};
//! use remote::Client;
//! use remote::backend::memory::MemoryBackend;
//!
//! let client = Client::with_backend(Box::new(MemoryBackend::new()));
//! let mut folders = FolderMap::default();
//! folders.resolve(&client, &FolderLayout::default()).expect("Failed to resolve folders");
//!
//! let cfg = RetentionConfig::default();
//! let summary = LifecycleOrchestrator::new(&client, &folders, &cfg)
//!     .expect("Invalid config")
//!     .run(Utc::now())
//!     .expect("Store unreachable");
//! println!("{} file(s) deleted", summary.files_deleted);
//! ```

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod archive;
pub mod category;
pub mod config;
pub mod error;
pub mod inventory;
pub mod legacy;
pub mod models;
pub mod naming;
pub mod orchestrator;
pub mod reclaim;
pub mod report;
pub mod retention;

pub use archive::{ArchiveError, ArchiveOutcome, CompressionArchiver, WrittenArchive};
pub use category::{Category, FolderLayout, FolderMap};
pub use config::RetentionConfig;
pub use error::{Error, Result};
pub use inventory::{FileRecord, Snapshot, StorageInventory};
pub use models::{ModelRecord, ModelVersionManager, RetentionPlan};
pub use orchestrator::{
    LifecycleOrchestrator, LifecycleState, NoObserver, RunObserver, RunOptions, RunPlan, RunSummary,
};
pub use reclaim::{EmergencyReclaimer, ReclaimOutcome};
pub use report::{CategoryStats, StorageReport, StorageReportGenerator};
pub use retention::{Freshness, MonthKey, MonthlyGroup};
