//! Read-only view of the remote store, one category at a time.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use remote::{Client, FileId, OrderBy, Quota, RemoteFile};
use serde::Serialize;

use crate::category::{Category, FolderMap};
use crate::error::Result;

/// Snapshot of one remote file's metadata, tagged with the category of the
/// folder it was listed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: FileId,
    pub name: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub category: Category,
}

impl FileRecord {
    /// Tag a listed file with its category.
    pub fn from_remote(file: RemoteFile, category: Category) -> Self {
        Self {
            id: file.id,
            name: file.name,
            size_bytes: file.size,
            created_at: file.created_at,
            modified_at: file.modified_at,
            category,
        }
    }

    /// The store-level view of this file, without its category.
    pub fn to_remote(&self) -> RemoteFile {
        RemoteFile {
            id: self.id.clone(),
            name: self.name.clone(),
            size: self.size_bytes,
            created_at: self.created_at,
            modified_at: self.modified_at,
        }
    }
}

/// Every category's files, listed oldest first.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    files: BTreeMap<Category, Vec<FileRecord>>,
}

impl Snapshot {
    /// Files in a category (empty when the listing failed).
    pub fn files(&self, category: Category) -> &[FileRecord] {
        self.files.get(&category).map_or(&[], Vec::as_slice)
    }

    /// Total bytes in a category.
    pub fn bytes(&self, category: Category) -> u64 {
        self.files(category).iter().map(|f| f.size_bytes).sum()
    }
}

/// Lists files per category and fetches quota usage.
///
/// A listing that still fails after the client's retries degrades to an
/// empty result and leaves a warning behind; it never aborts the caller.
pub struct StorageInventory<'a> {
    client: &'a Client,
    folders: &'a FolderMap,
    warnings: Vec<String>,
}

impl<'a> StorageInventory<'a> {
    pub fn new(client: &'a Client, folders: &'a FolderMap) -> Self {
        Self {
            client,
            folders,
            warnings: Vec::new(),
        }
    }

    /// List one category in the requested order.
    pub fn list_category(&mut self, category: Category, order: OrderBy) -> Vec<FileRecord> {
        match self.try_list(category, order) {
            Ok(files) => {
                log::debug!("Listed {} {} file(s)", files.len(), category);
                files
            }
            Err(e) => {
                let warning = format!("Could not list {category} files: {e}");
                log::warn!("{}", warning);
                self.warnings.push(warning);
                Vec::new()
            }
        }
    }

    fn try_list(&self, category: Category, order: OrderBy) -> Result<Vec<FileRecord>> {
        let folder = self.folders.get(category)?;
        let files = self.client.list_files(folder, order)?;
        Ok(files
            .into_iter()
            .map(|f| FileRecord::from_remote(f, category))
            .collect())
    }

    /// List every category oldest first.
    pub fn snapshot(&mut self) -> Snapshot {
        let files = Category::ALL
            .into_iter()
            .map(|c| (c, self.list_category(c, OrderBy::CreatedAsc)))
            .collect();
        Snapshot { files }
    }

    /// Current aggregate usage. Failure here is the caller's to handle.
    pub fn usage(&self) -> Result<Quota> {
        Ok(self.client.quota()?)
    }

    /// Warnings recorded by degraded listings.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Drain the recorded warnings.
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::FolderLayout;
    use chrono::TimeZone;
    use remote::RetryPolicy;
    use remote::backend::memory::MemoryBackend;
    use std::sync::Arc;

    fn setup() -> (Arc<MemoryBackend>, Client, FolderMap) {
        let store = Arc::new(MemoryBackend::new());
        let client = Client::with_backend(Box::new(store.clone()))
            .with_retry_policy(RetryPolicy::no_retry());
        let mut folders = FolderMap::default();
        folders.resolve(&client, &FolderLayout::default()).unwrap();
        (store, client, folders)
    }

    #[test]
    fn test_category_comes_from_folder() {
        let (store, client, folders) = setup();
        let when = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        // Name says "model", folder says raw
        store
            .insert_sized(folders.get(Category::Raw).unwrap(), "model_input.csv", 5, when)
            .unwrap();

        let mut inventory = StorageInventory::new(&client, &folders);
        let files = inventory.list_category(Category::Raw, OrderBy::CreatedAsc);

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].category, Category::Raw);
        assert_eq!(files[0].size_bytes, 5);
    }

    #[test]
    fn test_failed_listing_degrades_to_empty() {
        let (store, client, folders) = setup();
        store.break_folder(folders.get(Category::Processed).unwrap());

        let mut inventory = StorageInventory::new(&client, &folders);
        let snapshot = inventory.snapshot();

        assert!(snapshot.files(Category::Processed).is_empty());
        assert_eq!(inventory.warnings().len(), 1);
        assert!(inventory.warnings()[0].contains("processed"));
    }

    #[test]
    fn test_missing_folder_degrades_to_empty() {
        let (_store, client, _) = setup();
        let folders = FolderMap::default();

        let mut inventory = StorageInventory::new(&client, &folders);
        assert!(inventory.list_category(Category::Logs, OrderBy::CreatedAsc).is_empty());
        assert_eq!(inventory.take_warnings().len(), 1);
        assert!(inventory.warnings().is_empty());
    }

    #[test]
    fn test_snapshot_bytes() {
        let (store, client, folders) = setup();
        let when = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let models = folders.get(Category::Models).unwrap();
        store.insert_sized(models, "a.h5", 100, when).unwrap();
        store.insert_sized(models, "b.h5", 250, when).unwrap();

        let mut inventory = StorageInventory::new(&client, &folders);
        let snapshot = inventory.snapshot();

        assert_eq!(snapshot.bytes(Category::Models), 350);
        assert_eq!(inventory.usage().unwrap().used_bytes, 350);
    }
}
