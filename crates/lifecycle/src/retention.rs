//! Age-based classification and monthly grouping.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;

use crate::category::Category;
use crate::config::RetentionConfig;
use crate::inventory::FileRecord;
use crate::naming;

/// Calendar month a file was created in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    /// Build a key, rejecting months outside 1..=12.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// Month a timestamp falls in (UTC).
    pub fn of(at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }

    pub const fn year(self) -> i32 {
        self.year
    }

    pub const fn month(self) -> u32 {
        self.month
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for MonthKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Stale raw files created in one calendar month, ordered by `(created_at, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyGroup {
    pub month: MonthKey,
    pub files: Vec<FileRecord>,
}

impl MonthlyGroup {
    /// Total bytes across members.
    pub fn bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }
}

/// Age classification of a file within its category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    /// Inside its retention window
    Fresh,
    /// Eligible for compaction
    Stale,
    /// Past its retention window
    Expired,
}

/// Classify a file by age within its category.
pub fn classify(file: &FileRecord, now: DateTime<Utc>, cfg: &RetentionConfig) -> Freshness {
    let age = now - file.created_at;
    match file.category {
        Category::Raw if age > cfg.raw_window() => Freshness::Stale,
        Category::Processed if age > cfg.processed_window() => Freshness::Expired,
        Category::Compressed if age > cfg.compressed_window() => Freshness::Expired,
        _ => Freshness::Fresh,
    }
}

/// Creation-time cutoff for archiving: files created before it are stale.
pub fn archive_cutoff(now: DateTime<Utc>, cfg: &RetentionConfig) -> DateTime<Utc> {
    now - cfg.raw_window()
}

/// Group stale raw files by the month they were created in.
///
/// Files outside the `raw` category, files created at or after `cutoff`, and
/// files already carrying an archive marker in their name are left out. The
/// result does not depend on the order of `files`.
pub fn classify_for_archive(
    files: &[FileRecord],
    cutoff: DateTime<Utc>,
) -> BTreeMap<MonthKey, MonthlyGroup> {
    let mut groups: BTreeMap<MonthKey, MonthlyGroup> = BTreeMap::new();

    for file in files {
        if file.category != Category::Raw
            || file.created_at >= cutoff
            || naming::has_archive_marker(&file.name)
        {
            continue;
        }
        let month = MonthKey::of(file.created_at);
        groups
            .entry(month)
            .or_insert_with(|| MonthlyGroup {
                month,
                files: Vec::new(),
            })
            .files
            .push(file.clone());
    }

    for group in groups.values_mut() {
        group
            .files
            .sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    }

    groups
}

/// Compressed archives past the compressed retention window.
pub fn expired_archives(
    files: &[FileRecord],
    now: DateTime<Utc>,
    cfg: &RetentionConfig,
) -> Vec<FileRecord> {
    files
        .iter()
        .filter(|f| f.category == Category::Compressed)
        .filter(|f| classify(f, now, cfg) == Freshness::Expired)
        .cloned()
        .collect()
}

/// Number of files in `files` classified as expired.
pub fn count_expired(files: &[FileRecord], now: DateTime<Utc>, cfg: &RetentionConfig) -> usize {
    files
        .iter()
        .filter(|f| classify(f, now, cfg) == Freshness::Expired)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use remote::FileId;

    fn record(id: &str, name: &str, category: Category, created_at: DateTime<Utc>) -> FileRecord {
        FileRecord {
            id: FileId::new(id),
            name: name.to_string(),
            size_bytes: 10,
            created_at,
            modified_at: created_at,
            category,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_month_key_display_and_order() {
        let a = MonthKey::new(2023, 12).unwrap();
        let b = MonthKey::new(2024, 2).unwrap();
        assert_eq!(a.to_string(), "2023-12");
        assert_eq!(b.to_string(), "2024-02");
        assert!(a < b);
        assert!(MonthKey::new(2024, 0).is_none());
    }

    #[test]
    fn test_classify_per_category() {
        let cfg = RetentionConfig::default();
        let old = now() - Duration::days(400);
        let recent = now() - Duration::days(1);

        let check = |category, created_at| {
            classify(&record("f", "file", category, created_at), now(), &cfg)
        };

        assert_eq!(check(Category::Raw, old), Freshness::Stale);
        assert_eq!(check(Category::Raw, recent), Freshness::Fresh);
        assert_eq!(check(Category::Processed, old), Freshness::Expired);
        assert_eq!(check(Category::Compressed, old), Freshness::Expired);
        assert_eq!(check(Category::Models, old), Freshness::Fresh);
        assert_eq!(check(Category::Logs, old), Freshness::Fresh);
    }

    #[test]
    fn test_grouping_uses_creation_month() {
        let cfg = RetentionConfig::default();
        let day = |month, day| Utc.with_ymd_and_hms(2024, month, day, 0, 0, 0).unwrap();
        let files = vec![
            record("a", "eurusd_1.csv", Category::Raw, day(3, 25)),
            record("b", "eurusd_2.csv", Category::Raw, day(4, 15)),
            record("c", "eurusd_3.csv", Category::Raw, now() - Duration::days(2)),
            record("d", "eurusd_compressed.csv", Category::Raw, day(3, 2)),
            record("e", "features.csv", Category::Processed, day(3, 2)),
        ];

        let groups = classify_for_archive(&files, archive_cutoff(now(), &cfg));

        let keys: Vec<String> = groups.keys().map(ToString::to_string).collect();
        assert_eq!(keys, ["2024-03", "2024-04"]);
        assert_eq!(groups[&MonthKey::new(2024, 3).unwrap()].files.len(), 1);
    }

    #[test]
    fn test_grouping_is_order_independent() {
        let t = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let mut files = vec![
            record("b", "x.csv", Category::Raw, t),
            record("a", "y.csv", Category::Raw, t),
            record("c", "z.csv", Category::Raw, t - Duration::days(3)),
            record("d", "w.csv", Category::Raw, t - Duration::days(20)),
        ];
        let forward = classify_for_archive(&files, now());
        files.reverse();
        let backward = classify_for_archive(&files, now());

        assert_eq!(forward, backward);
        let jan: Vec<&str> = forward[&MonthKey::new(2024, 1).unwrap()]
            .files
            .iter()
            .map(|f| f.id.as_str())
            .collect();
        assert_eq!(jan, ["c", "a", "b"]);
    }

    #[test]
    fn test_cutoff_is_exclusive() {
        let cfg = RetentionConfig::default();
        let cutoff = archive_cutoff(now(), &cfg);
        let files = vec![record("a", "edge.csv", Category::Raw, cutoff)];
        assert!(classify_for_archive(&files, cutoff).is_empty());
    }

    #[test]
    fn test_expired_archives() {
        let cfg = RetentionConfig::default();
        let archive = |id, name, age_days| {
            record(id, name, Category::Compressed, now() - Duration::days(age_days))
        };
        let files = vec![
            archive("old", "data_2023-01_compressed.csv.gz", 361),
            archive("new", "data_2024-04_compressed.csv.gz", 30),
        ];
        let expired = expired_archives(&files, now(), &cfg);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id.as_str(), "old");
    }
}
