//! Logical file categories and the folders that hold them.

use std::collections::BTreeMap;
use std::fmt;

use remote::{Client, FolderId};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A logical grouping of files, mapped to exactly one remote folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Freshly collected data, archived by month once stale
    Raw,
    /// Derived data, expired after the processed window
    Processed,
    /// Best-ranked model artifacts
    Models,
    /// Monthly archives
    Compressed,
    /// Second-tier model artifacts
    Backups,
    /// Metrics and storage reports (append-only)
    Logs,
}

impl Category {
    /// Every category, in folder-resolution order.
    pub const ALL: [Self; 6] = [
        Self::Raw,
        Self::Processed,
        Self::Models,
        Self::Compressed,
        Self::Backups,
        Self::Logs,
    ];

    /// Key used in config files and reports.
    pub const fn key(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Processed => "processed",
            Self::Models => "models",
            Self::Compressed => "compressed",
            Self::Backups => "backups",
            Self::Logs => "logs",
        }
    }

    /// Folder name suffix appended to the namespace.
    pub const fn folder_suffix(self) -> &'static str {
        match self {
            Self::Raw => "data_raw",
            Self::Processed => "data_processed",
            Self::Models => "models",
            Self::Compressed => "compressed",
            Self::Backups => "backups",
            Self::Logs => "logs",
        }
    }

    /// Parse a config/report key.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.key() == key)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Naming scheme for category folders: `<namespace>_<suffix>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderLayout {
    namespace: String,
}

impl FolderLayout {
    /// Default namespace used when none is configured.
    pub const DEFAULT_NAMESPACE: &'static str = "forex";

    /// Create a layout for a namespace.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// The namespace prefix.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Folder name for a category.
    pub fn folder_name(&self, category: Category) -> String {
        format!("{}_{}", self.namespace, category.folder_suffix())
    }
}

impl Default for FolderLayout {
    fn default() -> Self {
        Self::new(Self::DEFAULT_NAMESPACE)
    }
}

/// Resolved folder handle per category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderMap {
    folders: BTreeMap<Category, FolderId>,
}

impl FolderMap {
    /// Build a map from already-known handles (typically the config file).
    pub fn from_ids(ids: impl IntoIterator<Item = (Category, FolderId)>) -> Self {
        Self {
            folders: ids.into_iter().collect(),
        }
    }

    /// Resolve every category folder, creating any that are missing.
    ///
    /// Known handles are kept as-is; the rest are looked up by name before
    /// being created, so resolving twice never creates a duplicate folder.
    pub fn resolve(&mut self, client: &Client, layout: &FolderLayout) -> Result<()> {
        for category in Category::ALL {
            if self.folders.contains_key(&category) {
                continue;
            }
            let name = layout.folder_name(category);
            let id = client.folder(&name)?;
            log::debug!("Resolved {} folder {} ({})", category, name, id);
            self.folders.insert(category, id);
        }
        Ok(())
    }

    /// Whether every category has a handle.
    pub fn is_complete(&self) -> bool {
        Category::ALL.iter().all(|c| self.folders.contains_key(c))
    }

    /// Handle for a category.
    pub fn get(&self, category: Category) -> Result<&FolderId> {
        self.folders
            .get(&category)
            .ok_or_else(|| Error::MissingFolder(category.key().to_string()))
    }

    /// Iterate `(category, handle)` pairs in category order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &FolderId)> {
        self.folders.iter().map(|(c, id)| (*c, id))
    }
}
