use thiserror::Error;

/// Errors that can occur while running the storage lifecycle.
#[derive(Debug, Error)]
pub enum Error {
    /// Retention configuration is self-contradictory or out of range
    #[error("invalid retention config: {message}")]
    InvalidConfig {
        /// Which invariant was violated
        message: String,
    },

    /// A category has no folder handle
    #[error("no folder resolved for category '{0}'")]
    MissingFolder(String),

    /// A name does not follow the convention for its category
    #[error("name '{name}' is not valid for category '{category}'")]
    InvalidName {
        /// Offending file name
        name: String,
        /// Target category
        category: String,
    },

    /// Remote store error
    #[error("remote store error: {0}")]
    Remote(#[from] remote::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;
