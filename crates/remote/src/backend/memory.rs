//! In-memory backend.
//!
//! Holds folders and files in process memory. Files carry a declared size that
//! is independent of their content, so quota scenarios in the gigabyte range
//! can be modelled without allocating the bytes. Faults can be injected per
//! file or per folder to exercise partial-failure paths.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::types::{FileId, FolderId, OrderBy, Quota, RemoteFile};

use super::Backend;

const DEFAULT_LIMIT_BYTES: u64 = 15 * 1024 * 1024 * 1024;

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    parent: Option<FolderId>,
    content: Vec<u8>,
    size: u64,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
    seq: u64,
}

#[derive(Debug, Default)]
struct State {
    folders: Vec<(FolderId, String)>,
    files: BTreeMap<FileId, Entry>,
    next_id: u64,
    folders_created: usize,
    baseline_bytes: u64,
    limit_bytes: u64,
    now: Option<DateTime<Utc>>,
    fail_uploads: bool,
    fail_downloads: HashSet<FileId>,
    fail_deletes: HashSet<FileId>,
    fail_moves: HashSet<FileId>,
    broken_folders: HashSet<FolderId>,
    transient_list_failures: u32,
}

/// Store that lives entirely in memory.
#[derive(Debug)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create an empty store with a 15 GiB limit.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                limit_bytes: DEFAULT_LIMIT_BYTES,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::Other("memory store lock poisoned".to_string()))
    }

    /// Set the quota limit.
    pub fn with_limit_bytes(self, limit: u64) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.limit_bytes = limit;
        }
        self
    }

    /// Count `bytes` of usage that belongs to no listed file.
    pub fn with_baseline_bytes(self, bytes: u64) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.baseline_bytes = bytes;
        }
        self
    }

    /// Timestamp to stamp on uploaded files (defaults to the wall clock).
    pub fn with_clock(self, now: DateTime<Utc>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.now = Some(now);
        }
        self
    }

    /// Insert a file with explicit content and timestamps.
    pub fn insert_file(
        &self,
        folder: &FolderId,
        name: &str,
        content: &[u8],
        created_at: DateTime<Utc>,
    ) -> Result<FileId> {
        let size = content.len() as u64;
        self.insert(Some(folder.clone()), name, content.to_vec(), size, created_at)
    }

    /// Insert a file whose reported size differs from its (empty) content.
    pub fn insert_sized(
        &self,
        folder: &FolderId,
        name: &str,
        size: u64,
        created_at: DateTime<Utc>,
    ) -> Result<FileId> {
        self.insert(Some(folder.clone()), name, Vec::new(), size, created_at)
    }

    /// Insert a file at the store root, outside any folder.
    pub fn insert_unfiled(
        &self,
        name: &str,
        content: &[u8],
        created_at: DateTime<Utc>,
    ) -> Result<FileId> {
        let size = content.len() as u64;
        self.insert(None, name, content.to_vec(), size, created_at)
    }

    fn insert(
        &self,
        parent: Option<FolderId>,
        name: &str,
        content: Vec<u8>,
        size: u64,
        created_at: DateTime<Utc>,
    ) -> Result<FileId> {
        let mut state = self.lock()?;
        state.next_id += 1;
        let seq = state.next_id;
        let id = FileId::new(format!("file-{seq:06}"));
        state.files.insert(
            id.clone(),
            Entry {
                name: name.to_string(),
                parent,
                content,
                size,
                created_at,
                modified_at: created_at,
                seq,
            },
        );
        Ok(id)
    }

    /// Names of the files in a folder, oldest first.
    pub fn file_names(&self, folder: &FolderId) -> Vec<String> {
        self.list_files(folder, OrderBy::CreatedAsc)
            .map(|files| files.into_iter().map(|f| f.name).collect())
            .unwrap_or_default()
    }

    /// Raw content of a file, if it exists.
    pub fn content(&self, file: &FileId) -> Option<Vec<u8>> {
        self.lock()
            .ok()
            .and_then(|state| state.files.get(file).map(|e| e.content.clone()))
    }

    /// Folder a file currently lives in (`None` at the root or if missing).
    pub fn parent_of(&self, file: &FileId) -> Option<FolderId> {
        self.lock()
            .ok()
            .and_then(|state| state.files.get(file).and_then(|e| e.parent.clone()))
    }

    /// Whether a file still exists.
    pub fn contains(&self, file: &FileId) -> bool {
        self.lock()
            .map(|state| state.files.contains_key(file))
            .unwrap_or(false)
    }

    /// How many folders were created through [`Backend::create_folder`].
    pub fn folders_created(&self) -> usize {
        self.lock().map(|state| state.folders_created).unwrap_or(0)
    }

    /// Make every upload fail.
    pub fn fail_uploads(&self, fail: bool) {
        if let Ok(mut state) = self.lock() {
            state.fail_uploads = fail;
        }
    }

    /// Make downloads of a file fail.
    pub fn fail_download(&self, file: &FileId) {
        if let Ok(mut state) = self.lock() {
            state.fail_downloads.insert(file.clone());
        }
    }

    /// Make deletes of a file fail.
    pub fn fail_delete(&self, file: &FileId) {
        if let Ok(mut state) = self.lock() {
            state.fail_deletes.insert(file.clone());
        }
    }

    /// Make moves of a file fail.
    pub fn fail_move(&self, file: &FileId) {
        if let Ok(mut state) = self.lock() {
            state.fail_moves.insert(file.clone());
        }
    }

    /// Make every listing of a folder fail with a network error.
    pub fn break_folder(&self, folder: &FolderId) {
        if let Ok(mut state) = self.lock() {
            state.broken_folders.insert(folder.clone());
        }
    }

    /// Fail the next `count` listing calls with a rate-limit error.
    pub fn fail_next_listings(&self, count: u32) {
        if let Ok(mut state) = self.lock() {
            state.transient_list_failures = count;
        }
    }

    fn sorted(mut entries: Vec<(FileId, Entry)>, order: OrderBy) -> Vec<RemoteFile> {
        match order {
            OrderBy::CreatedAsc => entries.sort_by_key(|(_, e)| (e.created_at, e.seq)),
            OrderBy::CreatedDesc => {
                entries.sort_by_key(|(_, e)| (std::cmp::Reverse(e.created_at), e.seq));
            }
            OrderBy::ModifiedDesc => {
                entries.sort_by_key(|(_, e)| (std::cmp::Reverse(e.modified_at), e.seq));
            }
        }
        entries
            .into_iter()
            .map(|(id, e)| RemoteFile {
                id,
                name: e.name,
                size: e.size,
                created_at: e.created_at,
                modified_at: e.modified_at,
            })
            .collect()
    }
}

impl Backend for MemoryBackend {
    fn find_folder(&self, name: &str) -> Result<Option<FolderId>> {
        let state = self.lock()?;
        Ok(state
            .folders
            .iter()
            .find(|(_, n)| n == name)
            .map(|(id, _)| id.clone()))
    }

    fn create_folder(&self, name: &str) -> Result<FolderId> {
        let mut state = self.lock()?;
        state.folders_created += 1;
        let id = FolderId::new(format!("folder-{}", state.folders.len() + 1));
        state.folders.push((id.clone(), name.to_string()));
        Ok(id)
    }

    fn list_files(&self, folder: &FolderId, order: OrderBy) -> Result<Vec<RemoteFile>> {
        let mut state = self.lock()?;
        if state.transient_list_failures > 0 {
            state.transient_list_failures -= 1;
            return Err(Error::RateLimited { status: 429 });
        }
        if state.broken_folders.contains(folder) {
            return Err(Error::Network {
                message: format!("listing {folder} timed out"),
            });
        }
        if !state.folders.iter().any(|(id, _)| id == folder) {
            return Err(Error::NotFound(folder.to_string()));
        }

        let entries = state
            .files
            .iter()
            .filter(|(_, e)| e.parent.as_ref() == Some(folder))
            .map(|(id, e)| (id.clone(), e.clone()))
            .collect();
        Ok(Self::sorted(entries, order))
    }

    fn list_unfiled(&self, name_contains: &str) -> Result<Vec<RemoteFile>> {
        let state = self.lock()?;
        let entries = state
            .files
            .iter()
            .filter(|(_, e)| e.parent.is_none() && e.name.contains(name_contains))
            .map(|(id, e)| (id.clone(), e.clone()))
            .collect();
        Ok(Self::sorted(entries, OrderBy::CreatedAsc))
    }

    fn download(&self, file: &FileId) -> Result<Vec<u8>> {
        let state = self.lock()?;
        if state.fail_downloads.contains(file) {
            return Err(Error::Http {
                message: format!("download of {file} failed"),
                status: Some(400),
            });
        }
        state
            .files
            .get(file)
            .map(|e| e.content.clone())
            .ok_or_else(|| Error::NotFound(file.to_string()))
    }

    fn upload(
        &self,
        folder: &FolderId,
        name: &str,
        bytes: &[u8],
        _mime_type: &str,
    ) -> Result<FileId> {
        let now = {
            let state = self.lock()?;
            if state.fail_uploads {
                return Err(Error::UploadFailed {
                    name: name.to_string(),
                    message: "store rejected upload".to_string(),
                });
            }
            if !state.folders.iter().any(|(id, _)| id == folder) {
                return Err(Error::NotFound(folder.to_string()));
            }
            state.now.unwrap_or_else(Utc::now)
        };
        self.insert_file(folder, name, bytes, now)
    }

    fn delete(&self, file: &FileId) -> Result<()> {
        let mut state = self.lock()?;
        if state.fail_deletes.contains(file) {
            return Err(Error::PermissionDenied(file.to_string()));
        }
        state
            .files
            .remove(file)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(file.to_string()))
    }

    fn move_to_folder(&self, file: &FileId, target: &FolderId) -> Result<()> {
        let mut state = self.lock()?;
        if state.fail_moves.contains(file) {
            return Err(Error::PermissionDenied(file.to_string()));
        }
        if !state.folders.iter().any(|(id, _)| id == target) {
            return Err(Error::NotFound(target.to_string()));
        }
        let entry = state
            .files
            .get_mut(file)
            .ok_or_else(|| Error::NotFound(file.to_string()))?;
        entry.parent = Some(target.clone());
        Ok(())
    }

    fn quota(&self) -> Result<Quota> {
        let state = self.lock()?;
        let used: u64 = state.files.values().map(|e| e.size).sum();
        Ok(Quota {
            used_bytes: used + state.baseline_bytes,
            limit_bytes: state.limit_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_listing_order() {
        let store = MemoryBackend::new();
        let folder = store.create_folder("raw").unwrap();
        store.insert_file(&folder, "b.csv", b"x", at(2)).unwrap();
        store.insert_file(&folder, "a.csv", b"x", at(1)).unwrap();

        let asc: Vec<_> = store
            .list_files(&folder, OrderBy::CreatedAsc)
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(asc, vec!["a.csv", "b.csv"]);

        let desc: Vec<_> = store
            .list_files(&folder, OrderBy::CreatedDesc)
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(desc, vec!["b.csv", "a.csv"]);
    }

    #[test]
    fn test_quota_counts_declared_sizes() {
        let store = MemoryBackend::new().with_baseline_bytes(10);
        let folder = store.create_folder("processed").unwrap();
        store.insert_sized(&folder, "big.parquet", 1000, at(1)).unwrap();

        let quota = store.quota().unwrap();
        assert_eq!(quota.used_bytes, 1010);
        assert_eq!(quota.limit_bytes, DEFAULT_LIMIT_BYTES);
    }

    #[test]
    fn test_move_and_delete() {
        let store = MemoryBackend::new();
        let models = store.create_folder("models").unwrap();
        let backups = store.create_folder("backups").unwrap();
        let id = store.insert_file(&models, "m.h5", b"w", at(1)).unwrap();

        store.move_to_folder(&id, &backups).unwrap();
        assert_eq!(store.parent_of(&id), Some(backups));

        store.delete(&id).unwrap();
        assert!(!store.contains(&id));
        assert!(store.delete(&id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_injected_faults() {
        let store = MemoryBackend::new();
        let folder = store.create_folder("raw").unwrap();
        let id = store.insert_file(&folder, "a.csv", b"x", at(1)).unwrap();

        store.fail_download(&id);
        assert!(store.download(&id).is_err());

        store.fail_uploads(true);
        assert!(store.upload(&folder, "b.csv", b"y", "text/csv").is_err());

        store.fail_next_listings(1);
        assert!(store.list_files(&folder, OrderBy::CreatedAsc).unwrap_err().is_retryable());
        assert!(store.list_files(&folder, OrderBy::CreatedAsc).is_ok());
    }

    #[test]
    fn test_unfiled_listing() {
        let store = MemoryBackend::new();
        let folder = store.create_folder("raw").unwrap();
        store.insert_file(&folder, "forex_data_1.csv", b"x", at(1)).unwrap();
        store.insert_unfiled("forex_data_2.csv", b"x", at(1)).unwrap();
        store.insert_unfiled("notes.txt", b"x", at(1)).unwrap();

        let unfiled = store.list_unfiled("forex").unwrap();
        assert_eq!(unfiled.len(), 1);
        assert_eq!(unfiled[0].name, "forex_data_2.csv");
    }
}
