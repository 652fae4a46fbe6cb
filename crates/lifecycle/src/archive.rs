//! Monthly compaction of stale raw data.
//!
//! A [`MonthlyGroup`] is merged into gzip-compressed CSV archives, one per
//! distinct header. Archives are always uploaded under a name that is not
//! already taken in the target folder; earlier archives of the month are
//! folded in and removed only once the new one is confirmed. Any failure
//! before that point leaves the store untouched.

use std::collections::HashSet;
use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use remote::{Client, FileId, FolderId};
use serde::Serialize;
use thiserror::Error;

use crate::category::Category;
use crate::inventory::FileRecord;
use crate::naming::{self, ARCHIVE_MIME};
use crate::retention::{MonthKey, MonthlyGroup};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Why a month could not be archived. No file has been deleted in any case.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("no file in {month} could be read")]
    NothingReadable { month: MonthKey },

    #[error("failed to compress archive: {0}")]
    Encode(#[from] std::io::Error),

    #[error("failed to upload {name}: {source}")]
    Upload {
        name: String,
        #[source]
        source: remote::Error,
    },

    #[error("refusing to upload archive under invalid name '{0}'")]
    InvalidName(String),
}

/// Why a single file could not be read as a table.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("file is empty")]
    Empty,
    #[error("content is not valid UTF-8")]
    NotText,
    #[error("failed to decompress: {0}")]
    Gzip(#[source] std::io::Error),
}

/// Header record plus data records of a CSV file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    header: String,
    rows: Vec<String>,
}

impl Table {
    /// Parse CSV bytes, decompressing gzip content first.
    ///
    /// The first non-empty record is the header. Records end at a newline
    /// outside double quotes, so quoted fields may span lines. Blank records
    /// are dropped and CRLF endings are normalised.
    pub fn parse(bytes: &[u8]) -> Result<Self, TableError> {
        let text = if bytes.starts_with(&GZIP_MAGIC) {
            let mut text = String::new();
            MultiGzDecoder::new(bytes)
                .read_to_string(&mut text)
                .map_err(|e| match e.kind() {
                    std::io::ErrorKind::InvalidData => TableError::NotText,
                    _ => TableError::Gzip(e),
                })?;
            text
        } else {
            String::from_utf8(bytes.to_vec()).map_err(|_| TableError::NotText)?
        };

        let mut records = records(&text)
            .map(|r| r.trim_end_matches('\r'))
            .filter(|r| !r.trim().is_empty());
        let header = records.next().ok_or(TableError::Empty)?.to_string();
        let rows = records.map(str::to_string).collect();

        Ok(Self { header, rows })
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    /// Render back to CSV text with a trailing newline.
    pub fn to_csv(&self) -> String {
        let mut out = String::with_capacity(self.header.len() + self.rows.len() * 32);
        out.push_str(&self.header);
        out.push('\n');
        for row in &self.rows {
            out.push_str(row);
            out.push('\n');
        }
        out
    }
}

/// Split CSV text into records at newlines outside double quotes.
fn records(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let mut quoted = false;
        for (i, b) in rest.bytes().enumerate() {
            match b {
                b'"' => quoted = !quoted,
                b'\n' if !quoted => {
                    let record = &rest[..i];
                    rest = &rest[i + 1..];
                    return Some(record);
                }
                _ => {}
            }
        }
        let record = rest;
        rest = "";
        Some(record)
    })
}

/// Concatenates tables sharing a header, keeping the first copy of each row.
#[derive(Debug)]
struct Merger {
    header: String,
    seen: HashSet<blake3::Hash>,
    rows: Vec<String>,
    duplicates: usize,
}

impl Merger {
    fn new(header: String) -> Self {
        Self {
            header,
            seen: HashSet::new(),
            rows: Vec::new(),
            duplicates: 0,
        }
    }

    fn add(&mut self, table: &Table) {
        for row in &table.rows {
            if self.seen.insert(blake3::hash(row.as_bytes())) {
                self.rows.push(row.clone());
            } else {
                self.duplicates += 1;
            }
        }
    }

    fn finish(self) -> Table {
        Table {
            header: self.header,
            rows: self.rows,
        }
    }
}

/// Readable files of one month that share a header.
struct Batch<'f> {
    header: String,
    /// Earlier archives, folded in first
    previous: Vec<(&'f FileRecord, Table)>,
    members: Vec<(&'f FileRecord, Table)>,
}

/// One archive uploaded for a month.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WrittenArchive {
    pub name: String,
    pub id: FileId,
    pub bytes: u64,
    pub rows: usize,
}

/// What archiving one month did.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveOutcome {
    /// One archive per distinct header
    pub archives: Vec<WrittenArchive>,
    pub duplicates_removed: usize,
    /// Members merged into an archive
    pub merged: usize,
    /// Members left in place because they could not be read or archived
    pub skipped: Vec<String>,
    /// Originals deleted after the upload
    pub deleted: usize,
    pub deleted_bytes: u64,
    /// Earlier archives for the same month folded in and removed
    pub superseded: usize,
    /// Deletions that failed after the upload; retried next run
    pub failures: Vec<(String, String)>,
    /// Archives that could not be written; their members are in `skipped`
    pub errors: Vec<String>,
}

impl ArchiveOutcome {
    pub fn rows_written(&self) -> usize {
        self.archives.iter().map(|a| a.rows).sum()
    }

    /// Net bytes released by this month's archives.
    pub fn bytes_freed(&self) -> u64 {
        let written: u64 = self.archives.iter().map(|a| a.bytes).sum();
        self.deleted_bytes.saturating_sub(written)
    }
}

/// Writes monthly archives into the `compressed` folder.
pub struct CompressionArchiver<'a> {
    client: &'a Client,
    target: &'a FolderId,
}

impl<'a> CompressionArchiver<'a> {
    pub fn new(client: &'a Client, target: &'a FolderId) -> Self {
        Self { client, target }
    }

    /// Merge, deduplicate and compress one month of raw data.
    ///
    /// `existing` is the current content of the `compressed` folder. Readable
    /// archives in it for the same month and header are folded into the new
    /// one and removed once it is uploaded; unreadable ones are left alone.
    /// Raw files whose header differs from the rest get their own archive.
    pub fn archive_month(
        &self,
        group: &MonthlyGroup,
        existing: &[FileRecord],
    ) -> Result<ArchiveOutcome, ArchiveError> {
        let mut outcome = ArchiveOutcome::default();

        let mut batches: Vec<Batch<'_>> = Vec::new();
        for file in &group.files {
            let Some(table) = self.read_table(file) else {
                outcome.skipped.push(file.name.clone());
                continue;
            };
            let header = table.header.trim().to_string();
            match batches.iter_mut().find(|b| b.header == header) {
                Some(batch) => batch.members.push((file, table)),
                None => batches.push(Batch {
                    header,
                    previous: Vec::new(),
                    members: vec![(file, table)],
                }),
            }
        }
        if batches.is_empty() {
            return Err(ArchiveError::NothingReadable { month: group.month });
        }

        let mut previous: Vec<&FileRecord> = existing
            .iter()
            .filter(|f| naming::archive_month(&f.name) == Some(group.month))
            .collect();
        previous.sort_by_key(|f| (f.created_at, f.id.clone()));
        for archive in previous {
            let Some(table) = self.read_table(archive) else {
                log::warn!("Keeping unreadable archive {}", archive.name);
                continue;
            };
            match batches.iter_mut().find(|b| b.header == table.header.trim()) {
                Some(batch) => batch.previous.push((archive, table)),
                None => log::debug!("Keeping {}: no new rows share its header", archive.name),
            }
        }

        let mut taken: HashSet<String> = existing.iter().map(|f| f.name.clone()).collect();
        let mut first_error = None;
        for batch in batches {
            let name = (1..)
                .map(|part| naming::archive_part_name(group.month, part))
                .find(|name| !taken.contains(name))
                .unwrap_or_else(|| naming::archive_name(group.month));
            let members: Vec<String> = batch.members.iter().map(|(f, _)| f.name.clone()).collect();

            match self.write_batch(&name, batch, &mut outcome) {
                Ok(()) => {
                    taken.insert(name);
                }
                Err(e) => {
                    log::warn!(
                        "Could not archive {} file(s) of {}: {}",
                        members.len(),
                        group.month,
                        e
                    );
                    outcome.skipped.extend(members);
                    outcome.errors.push(e.to_string());
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        if outcome.archives.is_empty() {
            return Err(first_error.unwrap_or(ArchiveError::NothingReadable { month: group.month }));
        }
        Ok(outcome)
    }

    /// Upload one batch under `name`, then remove what it replaced.
    fn write_batch(
        &self,
        name: &str,
        batch: Batch<'_>,
        outcome: &mut ArchiveOutcome,
    ) -> Result<(), ArchiveError> {
        if naming::validate(Category::Compressed, name).is_err() {
            return Err(ArchiveError::InvalidName(name.to_string()));
        }

        let mut merger = Merger::new(batch.header);
        for (_, table) in batch.previous.iter().chain(&batch.members) {
            merger.add(table);
        }
        let duplicates = merger.duplicates;
        let table = merger.finish();
        let blob = compress(&table)?;

        let id = self
            .client
            .upload(self.target, name, &blob, ARCHIVE_MIME)
            .map_err(|source| ArchiveError::Upload {
                name: name.to_string(),
                source,
            })?;
        log::info!(
            "Uploaded {} ({} rows, {} duplicate(s) dropped)",
            name,
            table.rows().len(),
            duplicates
        );

        outcome.archives.push(WrittenArchive {
            name: name.to_string(),
            id,
            bytes: blob.len() as u64,
            rows: table.rows().len(),
        });
        outcome.duplicates_removed += duplicates;
        outcome.merged += batch.members.len();

        for (file, _) in &batch.members {
            if self.remove(file, outcome) {
                outcome.deleted += 1;
                outcome.deleted_bytes += file.size_bytes;
            }
        }
        for (archive, _) in &batch.previous {
            if self.remove(archive, outcome) {
                outcome.superseded += 1;
                outcome.deleted_bytes += archive.size_bytes;
            }
        }
        Ok(())
    }

    fn read_table(&self, file: &FileRecord) -> Option<Table> {
        let bytes = match self.client.download(&file.id) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Skipping {}: download failed: {}", file.name, e);
                return None;
            }
        };
        match Table::parse(&bytes) {
            Ok(table) => Some(table),
            Err(e) => {
                log::warn!("Skipping {}: {}", file.name, e);
                None
            }
        }
    }

    fn remove(&self, file: &FileRecord, outcome: &mut ArchiveOutcome) -> bool {
        match self.client.delete(&file.id) {
            Ok(()) => {
                log::debug!("Deleted {}", file.name);
                true
            }
            Err(e) => {
                log::warn!("Failed to delete {} after archiving: {}", file.name, e);
                outcome.failures.push((file.name.clone(), e.to_string()));
                false
            }
        }
    }
}

fn compress(table: &Table) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(table.to_csv().as_bytes())?;
    encoder.finish()
}
