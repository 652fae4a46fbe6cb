//! Error types for remote store operations.
//!
//! Errors are categorized so the [`Client`](crate::Client) can decide whether a
//! call is worth retrying. Only transient categories are retried; everything
//! else is returned to the caller on the first failure.

use std::io;

use thiserror::Error;

/// Drive `error.errors[].reason` values that mean "slow down", reported with
/// HTTP 403 rather than 429.
const RATE_LIMIT_REASONS: [&str; 2] = ["rateLimitExceeded", "userRateLimitExceeded"];

/// Categories of remote store errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network-related errors (transient, retryable)
    Network,
    /// Rate limiting or server-side overload (transient, retryable)
    RateLimited,
    /// File or folder does not exist
    NotFound,
    /// Credentials rejected or access denied
    Permission,
    /// The target name is already taken
    Conflict,
    /// The store answered with something we could not understand
    Protocol,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::RateLimited)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::RateLimited => "Remote store is throttling requests",
            Self::NotFound => "File or folder not found",
            Self::Permission => "Access denied",
            Self::Conflict => "A file with that name already exists",
            Self::Protocol => "Unexpected response from remote store",
            Self::Other => "Unexpected error",
        }
    }
}

/// Errors that can occur while talking to the remote store.
#[derive(Debug, Error)]
pub enum Error {
    /// Network-related error (connection, timeout, DNS, etc.)
    #[error("network error: {message}")]
    Network {
        /// Detailed error message from the failed network operation
        message: String,
    },

    /// The store rejected the request because of rate limits or overload
    #[error("rate limited (HTTP {status})")]
    RateLimited {
        /// HTTP status returned by the store
        status: u16,
    },

    /// File or folder not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Credentials missing, expired, or not allowed to perform the call
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A store that keeps one file per name already has this one
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Upload rejected by the backend
    #[error("upload of '{name}' failed: {message}")]
    UploadFailed {
        /// Name of the file being uploaded
        name: String,
        /// Why the upload failed
        message: String,
    },

    /// HTTP error that does not fit another category
    #[error("HTTP error: {message}")]
    Http {
        /// Error message
        message: String,
        /// HTTP status code, if any
        status: Option<u16>,
    },

    /// Response could not be interpreted
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Network { .. } => ErrorCategory::Network,
            Error::RateLimited { .. } => ErrorCategory::RateLimited,
            Error::NotFound(_) => ErrorCategory::NotFound,
            Error::PermissionDenied(_) => ErrorCategory::Permission,
            Error::AlreadyExists(_) => ErrorCategory::Conflict,
            Error::InvalidResponse(_) | Error::Json(_) => ErrorCategory::Protocol,
            Error::Http {
                status: Some(status),
                ..
            } if *status >= 500 => ErrorCategory::Network,
            Error::Io(e) if is_transient_io(e.kind()) => ErrorCategory::Network,
            _ => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Returns true if the target of the call no longer exists.
    pub fn is_not_found(&self) -> bool {
        matches!(self.category(), ErrorCategory::NotFound)
    }

    /// Classify an HTTP status code returned by the store.
    pub fn from_status(status: u16, context: &str) -> Self {
        match status {
            401 | 403 => Error::PermissionDenied(context.to_string()),
            404 => Error::NotFound(context.to_string()),
            429 => Error::RateLimited { status },
            _ => Error::Http {
                message: format!("HTTP {status} for {context}"),
                status: Some(status),
            },
        }
    }

    /// Classify an HTTP status using the error body when there is one.
    ///
    /// A 403 whose body names a rate-limit reason is throttling, not a
    /// permission problem.
    pub fn from_status_body(status: u16, body: &str, context: &str) -> Self {
        if status == 403 && is_rate_limit_body(body) {
            return Error::RateLimited { status };
        }
        Self::from_status(status, context)
    }
}

/// IO failures that come from a dropped or stalled connection.
fn is_transient_io(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::TimedOut
            | io::ErrorKind::UnexpectedEof
    )
}

fn is_rate_limit_body(body: &str) -> bool {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return false;
    };
    value["error"]["errors"].as_array().is_some_and(|errors| {
        errors.iter().any(|e| {
            e["reason"]
                .as_str()
                .is_some_and(|reason| RATE_LIMIT_REASONS.contains(&reason))
        })
    })
}

#[cfg(feature = "drive")]
impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::from_status(code, "remote request"),
            ureq::Error::Io(e) => Self::Io(e),
            transient @ (ureq::Error::Timeout(_)
            | ureq::Error::HostNotFound
            | ureq::Error::ConnectionFailed) => Self::Network {
                message: transient.to_string(),
            },
            other => Self::Http {
                message: other.to_string(),
                status: None,
            },
        }
    }
}

/// Result type for remote store operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::Network.is_retryable());
        assert!(ErrorCategory::RateLimited.is_retryable());
        assert!(!ErrorCategory::NotFound.is_retryable());
        assert!(!ErrorCategory::Permission.is_retryable());
        assert!(!ErrorCategory::Conflict.is_retryable());
    }

    #[test]
    fn test_from_status() {
        assert_eq!(
            Error::from_status(429, "list").category(),
            ErrorCategory::RateLimited
        );
        assert_eq!(
            Error::from_status(404, "file").category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            Error::from_status(403, "file").category(),
            ErrorCategory::Permission
        );
        assert!(Error::from_status(503, "quota").is_retryable());
        assert!(!Error::from_status(400, "upload").is_retryable());
    }

    #[test]
    fn test_forbidden_rate_limit_is_retryable() {
        let body = r#"{"error": {"code": 403, "errors": [
            {"domain": "usageLimits", "reason": "userRateLimitExceeded"}
        ]}}"#;
        let err = Error::from_status_body(403, body, "files.list");
        assert_eq!(err.category(), ErrorCategory::RateLimited);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_forbidden_without_rate_limit_reason() {
        let body = r#"{"error": {"errors": [{"reason": "insufficientFilePermissions"}]}}"#;
        assert_eq!(
            Error::from_status_body(403, body, "file").category(),
            ErrorCategory::Permission
        );
        assert_eq!(
            Error::from_status_body(403, "<html>", "file").category(),
            ErrorCategory::Permission
        );
        assert_eq!(
            Error::from_status_body(429, "", "file").category(),
            ErrorCategory::RateLimited
        );
    }

    #[test]
    fn test_dropped_connection_is_retryable() {
        for kind in [
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::BrokenPipe,
            io::ErrorKind::UnexpectedEof,
        ] {
            assert!(Error::Io(io::Error::from(kind)).is_retryable(), "{kind:?}");
        }
        assert!(!Error::Io(io::Error::from(io::ErrorKind::PermissionDenied)).is_retryable());
    }

    #[cfg(feature = "drive")]
    #[test]
    fn test_ureq_io_error_is_retryable() {
        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        let err = Error::from(ureq::Error::Io(reset));
        assert_eq!(err.category(), ErrorCategory::Network);
    }

    #[test]
    fn test_not_found_helper() {
        assert!(Error::NotFound("abc".into()).is_not_found());
        assert!(!Error::Other("abc".into()).is_not_found());
    }
}
