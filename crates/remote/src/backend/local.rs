//! Local directory backend.
//!
//! Mirrors the remote layout on disk: every folder is a subdirectory of the
//! root, every file lives directly inside its folder, and files at the root
//! are "unfiled". File handles are `folder/name` paths relative to the root.
//! A directory holds one file per name, so uploads and moves never replace
//! an existing file; they fail with [`Error::AlreadyExists`] instead.
//! Useful for running the lifecycle against a mounted or synced copy of the
//! store, and for trying the tool without credentials.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::types::{FileId, FolderId, OrderBy, Quota, RemoteFile};

use super::Backend;

/// Backend that stores everything under a local directory.
pub struct LocalBackend {
    root: PathBuf,
    limit_bytes: u64,
}

impl LocalBackend {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, limit_bytes: u64) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root, limit_bytes })
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn folder_path(&self, folder: &FolderId) -> Result<PathBuf> {
        let name = folder.as_str();
        if name.is_empty() || name.contains('/') || name.contains("..") {
            return Err(Error::InvalidResponse(format!("invalid folder handle: {name}")));
        }
        Ok(self.root.join(name))
    }

    fn file_path(&self, file: &FileId) -> Result<PathBuf> {
        let id = file.as_str();
        if id.is_empty() || id.starts_with('/') || id.split('/').any(|part| part == "..") {
            return Err(Error::InvalidResponse(format!("invalid file handle: {id}")));
        }
        Ok(self.root.join(id))
    }

    fn map_io(err: std::io::Error, what: &str) -> Error {
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(what.to_string()),
            std::io::ErrorKind::PermissionDenied => Error::PermissionDenied(what.to_string()),
            std::io::ErrorKind::AlreadyExists => Error::AlreadyExists(what.to_string()),
            _ => Error::Io(err),
        }
    }

    fn describe(&self, path: &Path, id: String) -> Result<RemoteFile> {
        let meta = fs::metadata(path).map_err(|e| Self::map_io(e, &id))?;
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let created = meta.created().unwrap_or(modified);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Ok(RemoteFile {
            id: FileId::new(id),
            name,
            size: meta.len(),
            created_at: DateTime::<Utc>::from(created),
            modified_at: DateTime::<Utc>::from(modified),
        })
    }

    /// Claim `target` for a rename from `source`, failing if the name is
    /// taken. The empty placeholder is replaced by the rename.
    fn rename_new(source: &Path, target: &Path, what: &str) -> Result<()> {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(target)
            .map_err(|e| Self::map_io(e, &target.display().to_string()))?;
        fs::rename(source, target).map_err(|e| {
            let _ = fs::remove_file(target);
            Self::map_io(e, what)
        })
    }

    fn list_dir(&self, dir: &Path, prefix: Option<&str>) -> Result<Vec<RemoteFile>> {
        let entries = fs::read_dir(dir).map_err(|e| Self::map_io(e, &dir.display().to_string()))?;
        let mut files = Vec::new();

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            // Hidden files and in-flight uploads
            if name.starts_with('.') {
                continue;
            }
            let id = match prefix {
                Some(folder) => format!("{folder}/{name}"),
                None => name,
            };
            files.push(self.describe(&path, id)?);
        }

        Ok(files)
    }
}

impl Backend for LocalBackend {
    fn find_folder(&self, name: &str) -> Result<Option<FolderId>> {
        let id = FolderId::new(name);
        let path = self.folder_path(&id)?;
        Ok(path.is_dir().then_some(id))
    }

    fn create_folder(&self, name: &str) -> Result<FolderId> {
        let id = FolderId::new(name);
        let path = self.folder_path(&id)?;
        fs::create_dir_all(&path).map_err(|e| Self::map_io(e, name))?;
        log::debug!("Created folder {}", path.display());
        Ok(id)
    }

    fn list_files(&self, folder: &FolderId, order: OrderBy) -> Result<Vec<RemoteFile>> {
        let dir = self.folder_path(folder)?;
        let mut files = self.list_dir(&dir, Some(folder.as_str()))?;
        match order {
            OrderBy::CreatedAsc => files.sort_by(|a, b| {
                a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name))
            }),
            OrderBy::CreatedDesc => files.sort_by(|a, b| {
                b.created_at.cmp(&a.created_at).then_with(|| a.name.cmp(&b.name))
            }),
            OrderBy::ModifiedDesc => files.sort_by(|a, b| {
                b.modified_at.cmp(&a.modified_at).then_with(|| a.name.cmp(&b.name))
            }),
        }
        Ok(files)
    }

    fn list_unfiled(&self, name_contains: &str) -> Result<Vec<RemoteFile>> {
        let mut files = self.list_dir(&self.root, None)?;
        files.retain(|f| f.name.contains(name_contains));
        files.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(files)
    }

    fn download(&self, file: &FileId) -> Result<Vec<u8>> {
        let path = self.file_path(file)?;
        fs::read(&path).map_err(|e| Self::map_io(e, file.as_str()))
    }

    fn upload(
        &self,
        folder: &FolderId,
        name: &str,
        bytes: &[u8],
        _mime_type: &str,
    ) -> Result<FileId> {
        if name.is_empty() || name.contains('/') || name.starts_with('.') {
            return Err(Error::UploadFailed {
                name: name.to_string(),
                message: "invalid file name".to_string(),
            });
        }
        let dir = self.folder_path(folder)?;
        if !dir.is_dir() {
            return Err(Error::NotFound(folder.to_string()));
        }

        // Write next to the target and rename so readers never see a partial file
        let staging = dir.join(format!(".{name}.partial"));
        let target = dir.join(name);
        fs::write(&staging, bytes).map_err(|e| Self::map_io(e, name))?;
        if let Err(e) = Self::rename_new(&staging, &target, name) {
            let _ = fs::remove_file(&staging);
            return Err(e);
        }

        Ok(FileId::new(format!("{}/{}", folder.as_str(), name)))
    }

    fn delete(&self, file: &FileId) -> Result<()> {
        let path = self.file_path(file)?;
        fs::remove_file(&path).map_err(|e| Self::map_io(e, file.as_str()))
    }

    fn move_to_folder(&self, file: &FileId, target: &FolderId) -> Result<()> {
        let from = self.file_path(file)?;
        let dir = self.folder_path(target)?;
        if !dir.is_dir() {
            return Err(Error::NotFound(target.to_string()));
        }
        let name = from
            .file_name()
            .ok_or_else(|| Error::InvalidResponse(format!("invalid file handle: {file}")))?;
        if !from.is_file() {
            return Err(Error::NotFound(file.to_string()));
        }
        Self::rename_new(&from, &dir.join(name), file.as_str())
    }

    fn quota(&self) -> Result<Quota> {
        let used_bytes = WalkDir::new(&self.root)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.metadata().ok())
            .map(|m| m.len())
            .sum();

        Ok(Quota {
            used_bytes,
            limit_bytes: self.limit_bytes,
        })
    }
}
