//! Canonical file names.
//!
//! Archive and report names are load-bearing: month keys are parsed back out
//! of archive names and reports are ordered by their timestamp. Every name is
//! checked against its pattern before it is uploaded.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::category::Category;
use crate::error::{Error, Result};
use crate::retention::MonthKey;

/// MIME type of monthly archives.
pub const ARCHIVE_MIME: &str = "application/gzip";

/// MIME type of storage reports.
pub const REPORT_MIME: &str = "application/json";

/// Substring identifying the recorded model metrics file in `logs`.
pub const METRICS_MARKER: &str = "model_metrics";

static ARCHIVE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^data_(\d{4})-(\d{2})_compressed(?:_([2-9]|[1-9]\d+))?\.csv\.gz$")
        .expect("Invalid archive regex")
});

static REPORT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^storage_report_\d{8}_\d{6}\.json$").expect("Invalid report regex")
});

static ARCHIVE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)compressed|archived").expect("Invalid marker regex"));

/// Canonical archive name for a month: `data_<YYYY>-<MM>_compressed.csv.gz`.
pub fn archive_name(month: MonthKey) -> String {
    format!("data_{month}_compressed.csv.gz")
}

/// Name of the `part`-th archive of a month. Part 1 is the canonical name;
/// later parts are `data_<YYYY>-<MM>_compressed_<part>.csv.gz`.
pub fn archive_part_name(month: MonthKey, part: usize) -> String {
    if part <= 1 {
        archive_name(month)
    } else {
        format!("data_{month}_compressed_{part}.csv.gz")
    }
}

/// Month key encoded in an archive name (canonical or numbered part).
pub fn archive_month(name: &str) -> Option<MonthKey> {
    let caps = ARCHIVE_NAME.captures(name)?;
    let year = caps[1].parse().ok()?;
    let month = caps[2].parse().ok()?;
    MonthKey::new(year, month)
}

/// Whether a name already marks the file as compressed or archived.
pub fn has_archive_marker(name: &str) -> bool {
    ARCHIVE_MARKER.is_match(name)
}

/// Report name for a timestamp: `storage_report_<YYYYMMDD_HHMMSS>.json`.
pub fn report_name(taken_at: DateTime<Utc>) -> String {
    format!("storage_report_{}.json", taken_at.format("%Y%m%d_%H%M%S"))
}

/// Check a name before it is uploaded into `category`.
///
/// Only categories with a naming convention are checked; other names pass
/// as long as they are non-empty and contain no path separator.
pub fn validate(category: Category, name: &str) -> Result<()> {
    let ok = match category {
        Category::Compressed => ARCHIVE_NAME.is_match(name) && archive_month(name).is_some(),
        Category::Logs if name.starts_with("storage_report_") => REPORT_NAME.is_match(name),
        _ => !name.is_empty() && !name.contains('/'),
    };

    if ok {
        Ok(())
    } else {
        Err(Error::InvalidName {
            name: name.to_string(),
            category: category.key().to_string(),
        })
    }
}
