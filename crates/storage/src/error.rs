//! Error types for backend storage operations

use thiserror::Error;

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur while talking to the block backend
#[derive(Error, Debug)]
pub enum StorageError {
    /// Object store request failed
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// A meta document could not be decoded
    #[error("Failed to parse meta file {path}: {source}")]
    MetaParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Object store construction failed
    #[error("Object store configuration error: {0}")]
    Config(String),
}

impl StorageError {
    /// True for errors caused by a single malformed block rather than the backend
    pub fn is_block_local(&self) -> bool {
        matches!(self, StorageError::MetaParse { .. })
    }
}
