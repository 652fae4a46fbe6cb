//! # remote
//!
//! Blocking client for a capacity-limited remote object store organised in
//! flat folders (Google Drive style).
//!
//! ## Retry Guarantees
//!
//! Every call goes through the [`Client`], which retries transient failures
//! (network errors, rate limiting, server errors) with exponential backoff.
//! The budget depends on the kind of call:
//!
//! - **Reads** (list, lookup, download, quota): 4 attempts
//! - **Mutations** (create folder, delete, move): 3 attempts
//! - **Uploads**: 2 attempts, since a retried upload may leave a duplicate
//!
//! Non-retryable errors (not found, permission denied, malformed responses)
//! are returned on the first failure.
//!
//! ## Example
//!
//! ```no_run
//! use remote::{Client, OrderBy};
//! use remote::backend::local::LocalBackend;
//!
//! let backend = LocalBackend::new("/tmp/store", 15 * 1024 * 1024 * 1024)
//!     .expect("Failed to open store");
//! let client = Client::with_backend(Box::new(backend));
//!
//! let raw = client.folder("pipeline_data_raw").expect("Failed to resolve folder");
//! for file in client.list_files(&raw, OrderBy::CreatedAsc).expect("Failed to list") {
//!     println!("{} ({} bytes)", file.name, file.size);
//! }
//! ```
//!
//! ## Backends
//!
//! - `memory`: in-process store with fault injection (tests)
//! - `local`: a directory tree on disk
//! - `drive` (default feature): Google Drive v3 REST API

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

/// Backend implementations for remote store operations.
pub mod backend;
/// Error types for remote store operations.
pub mod error;
/// Retry policy and exponential backoff.
pub mod retry;
/// Common types for remote files, folders and quota.
pub mod types;

pub use error::{Error, ErrorCategory, Result};
pub use retry::{CallKind, LogCallback, RetryConfig, RetryPolicy};
pub use types::{BulkResult, FileId, FolderId, OrderBy, Quota, RemoteFile};

use backend::Backend;
use retry::{RetryCallback, with_retry};

/// High-level client for the remote store.
///
/// Wraps a [`Backend`] and applies the retry policy to every call.
pub struct Client {
    backend: Box<dyn Backend>,
    policy: RetryPolicy,
    callback: Box<dyn RetryCallback + Send + Sync>,
}

impl Client {
    /// Create a client with a custom backend and the default retry policy.
    pub fn with_backend(backend: Box<dyn Backend>) -> Self {
        Self {
            backend,
            policy: RetryPolicy::default(),
            callback: Box::new(LogCallback),
        }
    }

    /// Replace the retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The retry policy in use.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn call<T>(&self, kind: CallKind, what: &str, op: impl FnMut() -> Result<T>) -> Result<T> {
        with_retry(
            self.policy.for_kind(kind),
            what,
            Some(self.callback.as_ref()),
            op,
        )
    }

    /// Get or create a folder by name.
    ///
    /// Looks the folder up first and only creates it when absent, so calling
    /// this repeatedly with the same name never creates duplicates.
    pub fn folder(&self, name: &str) -> Result<FolderId> {
        let what = format!("find folder {name}");
        if let Some(id) = self.call(CallKind::Read, &what, || self.backend.find_folder(name))? {
            return Ok(id);
        }

        let what = format!("create folder {name}");
        let id = self.call(CallKind::Mutate, &what, || self.backend.create_folder(name))?;
        log::info!("Created folder {} ({})", name, id);
        Ok(id)
    }

    /// List the files directly inside a folder.
    pub fn list_files(&self, folder: &FolderId, order: OrderBy) -> Result<Vec<RemoteFile>> {
        let what = format!("list {folder}");
        self.call(CallKind::Read, &what, || self.backend.list_files(folder, order))
    }

    /// List root-level files whose name contains `name_contains`.
    pub fn list_unfiled(&self, name_contains: &str) -> Result<Vec<RemoteFile>> {
        let what = format!("list unfiled '{name_contains}'");
        self.call(CallKind::Read, &what, || {
            self.backend.list_unfiled(name_contains)
        })
    }

    /// Download a file's content.
    pub fn download(&self, file: &FileId) -> Result<Vec<u8>> {
        let what = format!("download {file}");
        self.call(CallKind::Read, &what, || self.backend.download(file))
    }

    /// Upload a new file into a folder.
    pub fn upload(
        &self,
        folder: &FolderId,
        name: &str,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<FileId> {
        let what = format!("upload {name}");
        self.call(CallKind::Upload, &what, || {
            self.backend.upload(folder, name, bytes, mime_type)
        })
    }

    /// Permanently delete a file.
    ///
    /// A file that is already gone counts as deleted: a previous attempt may
    /// have succeeded before its response was lost.
    pub fn delete(&self, file: &FileId) -> Result<()> {
        let what = format!("delete {file}");
        match self.call(CallKind::Mutate, &what, || self.backend.delete(file)) {
            Err(e) if e.is_not_found() => {
                log::debug!("{} already gone", file);
                Ok(())
            }
            other => other,
        }
    }

    /// Move a file into another folder.
    pub fn move_to_folder(&self, file: &FileId, target: &FolderId) -> Result<()> {
        let what = format!("move {file} to {target}");
        self.call(CallKind::Mutate, &what, || {
            self.backend.move_to_folder(file, target)
        })
    }

    /// Get the aggregate storage quota.
    pub fn quota(&self) -> Result<Quota> {
        self.call(CallKind::Read, "quota", || self.backend.quota())
    }

    /// Delete several files one at a time, collecting per-file outcomes.
    pub fn delete_bulk(&self, files: &[RemoteFile]) -> BulkResult {
        let mut result = BulkResult::default();

        for file in files {
            match self.delete(&file.id) {
                Ok(()) => result.add_success(file.size),
                Err(e) => {
                    log::warn!("Failed to delete {}: {}", file.name, e);
                    result.add_failure(file.name.clone(), e.to_string());
                }
            }
        }

        result
    }
}
