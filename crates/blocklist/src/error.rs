use storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlocklistError {
    /// Listing or reading the backend failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Collector registration failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

pub type Result<T> = std::result::Result<T, BlocklistError>;
