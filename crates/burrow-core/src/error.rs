use thiserror::Error;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// A supplied URL failed syntactic validation. The whole batch is rejected.
    #[error("invalid url: {0}")]
    InvalidInput(String),
    /// A row for the URL or id already exists (raised by concurrent writers).
    #[error("link already exists: {0}")]
    Conflict(String),
    #[error("link not found: {0}")]
    NotFound(String),
    #[error("link is deleted: {0}")]
    Gone(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("storage io failed: {0}")]
    Io(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid link id: {0}")]
    InvalidLinkId(String),
}
