//! Sentra Edge - Error Types

use thiserror::Error;

/// Result type for edge operations
pub type EdgeResult<T> = Result<T, EdgeError>;

/// Edge error types
#[derive(Error, Debug)]
pub enum EdgeError {
    // ═══════════════════════════════════════════════════════════════
    // CONFIGURATION
    // ═══════════════════════════════════════════════════════════════

    #[error("Configuration error: {0}")]
    Config(String),

    // ═══════════════════════════════════════════════════════════════
    // REMOTE SERVICE
    // ═══════════════════════════════════════════════════════════════

    #[error("No profile for product key: {0}")]
    ProfileNotFound(String),

    #[error("Malformed profile: {0}")]
    MalformedProfile(String),

    #[error("Network error: {0}")]
    Network(String),

    // ═══════════════════════════════════════════════════════════════
    // SYNC
    // ═══════════════════════════════════════════════════════════════

    #[error("Sync cancelled")]
    Cancelled,

    // ═══════════════════════════════════════════════════════════════
    // CRYPTO / KEY CUSTODY
    // ═══════════════════════════════════════════════════════════════

    #[error(transparent)]
    KeyVault(#[from] sentra_keyvault::KeyVaultError),

    // ═══════════════════════════════════════════════════════════════
    // STORAGE
    // ═══════════════════════════════════════════════════════════════

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ═══════════════════════════════════════════════════════════════
    // IMAGES
    // ═══════════════════════════════════════════════════════════════

    #[error("Image processing error: {0}")]
    Image(String),
}

impl EdgeError {
    /// Fatal errors end the run immediately and are never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EdgeError::Config(_) | EdgeError::ProfileNotFound(_) | EdgeError::MalformedProfile(_)
        )
    }

    /// Retryable errors are transient; the sync engine retries them with
    /// bounded backoff before giving up.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EdgeError::Network(_))
    }
}

impl From<reqwest::Error> for EdgeError {
    fn from(e: reqwest::Error) -> Self {
        EdgeError::Network(e.to_string())
    }
}

impl From<rusqlite::Error> for EdgeError {
    fn from(e: rusqlite::Error) -> Self {
        EdgeError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for EdgeError {
    fn from(e: serde_json::Error) -> Self {
        EdgeError::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for EdgeError {
    fn from(e: bincode::Error) -> Self {
        EdgeError::Serialization(e.to_string())
    }
}

impl From<image::ImageError> for EdgeError {
    fn from(e: image::ImageError) -> Self {
        EdgeError::Image(e.to_string())
    }
}
