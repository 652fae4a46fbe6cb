use crate::error::Result;
use crate::types::{FileId, FolderId, OrderBy, Quota, RemoteFile};

#[cfg(feature = "drive")]
pub mod drive;
pub mod local;
pub mod memory;

/// Backend trait for remote store operations
///
/// This trait abstracts the underlying store, allowing us to:
/// - Talk to Google Drive over its REST API
/// - Mirror the same layout in a local directory
/// - Run the whole lifecycle against an in-memory store in tests
///
/// Implementations make exactly one attempt per call; retries are the
/// [`Client`](crate::Client)'s job.
pub trait Backend: Send + Sync {
    /// Look up a folder by exact name.
    fn find_folder(&self, name: &str) -> Result<Option<FolderId>>;

    /// Create a folder with the given name.
    fn create_folder(&self, name: &str) -> Result<FolderId>;

    /// List the (non-trashed) files directly inside a folder.
    fn list_files(&self, folder: &FolderId, order: OrderBy) -> Result<Vec<RemoteFile>>;

    /// List files that live at the store root (outside any folder) and whose
    /// name contains `name_contains`.
    fn list_unfiled(&self, name_contains: &str) -> Result<Vec<RemoteFile>>;

    /// Download the full content of a file.
    fn download(&self, file: &FileId) -> Result<Vec<u8>>;

    /// Upload a new file into a folder and return its handle.
    fn upload(&self, folder: &FolderId, name: &str, bytes: &[u8], mime_type: &str)
    -> Result<FileId>;

    /// Permanently delete a file.
    fn delete(&self, file: &FileId) -> Result<()>;

    /// Move a file into another folder (metadata-only).
    fn move_to_folder(&self, file: &FileId, target: &FolderId) -> Result<()>;

    /// Get the aggregate storage quota.
    fn quota(&self) -> Result<Quota>;
}

/// Shared backends, so a caller can keep a handle on a store the client owns.
impl<B: Backend + ?Sized> Backend for std::sync::Arc<B> {
    fn find_folder(&self, name: &str) -> Result<Option<FolderId>> {
        (**self).find_folder(name)
    }

    fn create_folder(&self, name: &str) -> Result<FolderId> {
        (**self).create_folder(name)
    }

    fn list_files(&self, folder: &FolderId, order: OrderBy) -> Result<Vec<RemoteFile>> {
        (**self).list_files(folder, order)
    }

    fn list_unfiled(&self, name_contains: &str) -> Result<Vec<RemoteFile>> {
        (**self).list_unfiled(name_contains)
    }

    fn download(&self, file: &FileId) -> Result<Vec<u8>> {
        (**self).download(file)
    }

    fn upload(
        &self,
        folder: &FolderId,
        name: &str,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<FileId> {
        (**self).upload(folder, name, bytes, mime_type)
    }

    fn delete(&self, file: &FileId) -> Result<()> {
        (**self).delete(file)
    }

    fn move_to_folder(&self, file: &FileId, target: &FolderId) -> Result<()> {
        (**self).move_to_folder(file, target)
    }

    fn quota(&self) -> Result<Quota> {
        (**self).quota()
    }
}
