//! Google Drive v3 backend.
//!
//! Talks to the Drive REST API with a bearer token. Folders are Drive folders
//! (`application/vnd.google-apps.folder`) looked up by name; uploads use a
//! single multipart request so a file is never created without its content.
//!
//! # Authentication
//!
//! The backend only carries an access token. Obtaining and refreshing it
//! (service accounts, OAuth) happens outside this crate.

use serde::Deserialize;

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::types::{FileId, FolderId, OrderBy, Quota, RemoteFile};

/// Default Drive API endpoint.
pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com";

/// Environment variable the token is read from by default.
pub const DEFAULT_TOKEN_ENV: &str = "DRIVE_ACCESS_TOKEN";

/// Maximum download size (archives for a month of data stay well below this).
const MAX_BODY_SIZE: u64 = 512 * 1024 * 1024;

/// Enough of an error body to read the failure reason.
const MAX_ERROR_BODY_SIZE: u64 = 64 * 1024;

/// Drive reports no limit for unlimited plans; assume the free tier.
const FALLBACK_LIMIT_BYTES: u64 = 15 * 1024 * 1024 * 1024;

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const FILE_FIELDS: &str = "nextPageToken,files(id,name,size,createdTime,modifiedTime)";
const MULTIPART_BOUNDARY: &str = "drivekeeper-part-5f0c2a9e7d314b6b";

/// Google Drive backend.
pub struct DriveBackend {
    /// HTTP agent for requests.
    agent: ureq::Agent,
    /// API base URL.
    api_base: String,
    /// OAuth access token.
    token: String,
}

impl DriveBackend {
    /// Create a backend using the given access token.
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_api_base(token, DEFAULT_API_BASE)
    }

    /// Create a backend with a custom API base (for testing or proxies).
    pub fn with_api_base(token: impl Into<String>, api_base: impl Into<String>) -> Self {
        // Error statuses come back as responses so their body can be classified
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build();
        Self {
            agent: config.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Create a backend reading the access token from an environment variable.
    pub fn from_env(var: &str, api_base: Option<&str>) -> Result<Self> {
        let token = std::env::var(var)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::PermissionDenied(format!("{var} is not set")))?;
        Ok(Self::with_api_base(
            token,
            api_base.unwrap_or(DEFAULT_API_BASE),
        ))
    }

    /// Get the current API base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn files_url(&self) -> String {
        format!("{}/drive/v3/files", self.api_base)
    }

    fn file_url(&self, id: &str) -> String {
        format!("{}/drive/v3/files/{}", self.api_base, id)
    }

    fn upload_url(&self) -> String {
        format!("{}/upload/drive/v3/files", self.api_base)
    }

    fn about_url(&self) -> String {
        format!("{}/drive/v3/about", self.api_base)
    }

    fn auth(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Run a files.list query, following pagination.
    fn query_files(&self, query: &str, order_by: Option<&str>) -> Result<Vec<RemoteFile>> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .agent
                .get(&self.files_url())
                .header("Authorization", &self.auth())
                .query("q", query)
                .query("fields", FILE_FIELDS)
                .query("pageSize", "1000");
            if let Some(order) = order_by {
                request = request.query("orderBy", order);
            }
            if let Some(token) = &page_token {
                request = request.query("pageToken", token);
            }

            let page: FileList = checked(request.call(), "files.list")?
                .body_mut()
                .read_json()?;

            for file in page.files {
                files.push(file.try_into()?);
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(files)
    }
}

impl Backend for DriveBackend {
    fn find_folder(&self, name: &str) -> Result<Option<FolderId>> {
        let query = format!(
            "name = '{}' and mimeType = '{}' and trashed = false",
            escape_query(name),
            FOLDER_MIME
        );
        let folders = self.query_files(&query, None)?;
        Ok(folders.into_iter().next().map(|f| FolderId::new(f.id.as_str())))
    }

    fn create_folder(&self, name: &str) -> Result<FolderId> {
        let request = self
            .agent
            .post(&self.files_url())
            .header("Authorization", &self.auth())
            .query("fields", "id")
            .send_json(serde_json::json!({ "name": name, "mimeType": FOLDER_MIME }));
        let created: Created = checked(request, name)?
            .body_mut()
            .read_json()?;
        log::debug!("Created Drive folder {} ({})", name, created.id);
        Ok(FolderId::new(created.id))
    }

    fn list_files(&self, folder: &FolderId, order: OrderBy) -> Result<Vec<RemoteFile>> {
        let query = format!(
            "'{}' in parents and trashed = false and mimeType != '{}'",
            escape_query(folder.as_str()),
            FOLDER_MIME
        );
        self.query_files(&query, Some(order_by_param(order)))
    }

    fn list_unfiled(&self, name_contains: &str) -> Result<Vec<RemoteFile>> {
        let query = format!(
            "'root' in parents and name contains '{}' and trashed = false and mimeType != '{}'",
            escape_query(name_contains),
            FOLDER_MIME
        );
        self.query_files(&query, Some(order_by_param(OrderBy::CreatedAsc)))
    }

    fn download(&self, file: &FileId) -> Result<Vec<u8>> {
        let request = self
            .agent
            .get(&self.file_url(file.as_str()))
            .header("Authorization", &self.auth())
            .query("alt", "media")
            .call();
        let mut response = checked(request, file.as_str())?;

        response
            .body_mut()
            .with_config()
            .limit(MAX_BODY_SIZE)
            .read_to_vec()
            .map_err(|e| status_error(e, file.as_str()))
    }

    fn upload(
        &self,
        folder: &FolderId,
        name: &str,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<FileId> {
        let metadata = serde_json::json!({
            "name": name,
            "parents": [folder.as_str()],
            "mimeType": mime_type,
        });
        let body = multipart_body(&metadata, bytes, mime_type)?;

        let request = self
            .agent
            .post(&self.upload_url())
            .header("Authorization", &self.auth())
            .header(
                "Content-Type",
                &format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
            )
            .query("uploadType", "multipart")
            .query("fields", "id")
            .send(&body[..]);
        let created: Created = checked(request, name)
            .map_err(|err| {
                if err.is_retryable() {
                    err
                } else {
                    Error::UploadFailed {
                        name: name.to_string(),
                        message: err.to_string(),
                    }
                }
            })?
            .body_mut()
            .read_json()?;

        Ok(FileId::new(created.id))
    }

    fn delete(&self, file: &FileId) -> Result<()> {
        let request = self
            .agent
            .delete(&self.file_url(file.as_str()))
            .header("Authorization", &self.auth())
            .call();
        checked(request, file.as_str())?;
        Ok(())
    }

    fn move_to_folder(&self, file: &FileId, target: &FolderId) -> Result<()> {
        let request = self
            .agent
            .get(&self.file_url(file.as_str()))
            .header("Authorization", &self.auth())
            .query("fields", "parents")
            .call();
        let current: Parents = checked(request, file.as_str())?
            .body_mut()
            .read_json()?;

        let previous = current.parents.join(",");
        let request = self
            .agent
            .patch(&self.file_url(file.as_str()))
            .header("Authorization", &self.auth())
            .query("addParents", target.as_str())
            .query("removeParents", &previous)
            .query("fields", "id,parents")
            .send_json(serde_json::json!({}));
        checked(request, file.as_str())?;
        Ok(())
    }

    fn quota(&self) -> Result<Quota> {
        let request = self
            .agent
            .get(&self.about_url())
            .header("Authorization", &self.auth())
            .query("fields", "storageQuota")
            .call();
        let about: About = checked(request, "about")?
            .body_mut()
            .read_json()?;

        about.storage_quota.try_into()
    }
}

type Response = ureq::http::Response<ureq::Body>;

/// Turn an error status into an [`Error`], reading the body to tell
/// throttling apart from a real permission failure.
fn checked(result: std::result::Result<Response, ureq::Error>, what: &str) -> Result<Response> {
    let mut response = result.map_err(|e| status_error(e, what))?;
    let status = response.status().as_u16();
    if status < 400 {
        return Ok(response);
    }
    let body = response
        .body_mut()
        .with_config()
        .limit(MAX_ERROR_BODY_SIZE)
        .read_to_string()
        .unwrap_or_default();
    log::debug!("HTTP {} for {}: {}", status, what, body.trim());
    Err(Error::from_status_body(status, &body, what))
}

/// Attach the call description to status-code errors.
fn status_error(err: ureq::Error, what: &str) -> Error {
    match err {
        ureq::Error::StatusCode(code) => Error::from_status(code, what),
        other => other.into(),
    }
}

fn order_by_param(order: OrderBy) -> &'static str {
    match order {
        OrderBy::CreatedAsc => "createdTime",
        OrderBy::CreatedDesc => "createdTime desc",
        OrderBy::ModifiedDesc => "modifiedTime desc",
    }
}

/// Escape a value for use inside a single-quoted Drive query string.
fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn multipart_body(metadata: &serde_json::Value, bytes: &[u8], mime_type: &str) -> Result<Vec<u8>> {
    let mut body = Vec::with_capacity(bytes.len() + 512);
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(&serde_json::to_vec(metadata)?);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(format!("Content-Type: {mime_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
    Ok(body)
}

// =============================================================================
// Drive API response types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    /// Drive encodes int64 values as strings
    size: Option<String>,
    created_time: chrono::DateTime<chrono::Utc>,
    modified_time: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<DriveFile> for RemoteFile {
    type Error = Error;

    fn try_from(f: DriveFile) -> Result<Self> {
        let size = match f.size.as_deref() {
            Some(s) => s
                .parse()
                .map_err(|_| Error::InvalidResponse(format!("bad size '{s}' for {}", f.name)))?,
            None => 0,
        };
        Ok(Self {
            id: FileId::new(f.id),
            name: f.name,
            size,
            created_at: f.created_time,
            modified_at: f.modified_time,
        })
    }
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Parents {
    #[serde(default)]
    parents: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct About {
    storage_quota: StorageQuota,
}

#[derive(Debug, Deserialize)]
struct StorageQuota {
    limit: Option<String>,
    usage: Option<String>,
}

impl TryFrom<StorageQuota> for Quota {
    type Error = Error;

    fn try_from(q: StorageQuota) -> Result<Self> {
        let parse = |value: Option<String>, field: &str| -> Result<Option<u64>> {
            value
                .map(|v| {
                    v.parse()
                        .map_err(|_| Error::InvalidResponse(format!("bad {field} '{v}'")))
                })
                .transpose()
        };
        Ok(Self {
            used_bytes: parse(q.usage, "usage")?.unwrap_or(0),
            limit_bytes: parse(q.limit, "limit")?.unwrap_or(FALLBACK_LIMIT_BYTES),
        })
    }
}
