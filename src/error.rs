//! Error types for stagepack

use thiserror::Error;

/// Result type for pack operations
pub type PackResult<T> = Result<T, PackError>;

/// Errors that can occur during packaging
///
/// Every variant except [`PackError::CacheFailure`] aborts a packaging run.
/// Cache failures are produced by cache backends and swallowed by
/// [`crate::IntegrityStore`].
#[derive(Error, Debug)]
pub enum PackError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Requested a logical asset name the catalog does not know
    #[error("Invalid asset: {0}")]
    InvalidAssetRequest(String),

    /// Network or storage read failed
    #[error("Failed to retrieve {asset}: {reason}")]
    RetrievalFailure { asset: String, reason: String },

    /// Retrieved bytes do not hash to the expected digest
    #[error("Hash mismatch for {asset}, found {found} but expected {expected}")]
    IntegrityMismatch {
        asset: String,
        found: String,
        expected: String,
    },

    /// Cache backend failure (recovered locally, never surfaced by the store)
    #[error("Cache error: {0}")]
    CacheFailure(String),

    /// A payload, icon or manifest write lands on a rewritten template path
    #[error("Layout collision at {path}")]
    LayoutCollision { path: String },

    /// Archive codec failure
    #[error("Archive error: {0}")]
    SerializationFailure(String),

    /// Icon processing error
    #[error("Icon error: {0}")]
    Icon(String),
}

impl From<zip::result::ZipError> for PackError {
    fn from(err: zip::result::ZipError) -> Self {
        PackError::SerializationFailure(err.to_string())
    }
}
