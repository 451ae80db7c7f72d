use thiserror::Error;

/// Main error type for the lineage service
#[derive(Error, Debug)]
pub enum LineageError {
    /// Authoritative store failures (the source of truth could not be read)
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Entity not found (raised only at the request boundary)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Deadline exceeded or the request was aborted
    #[error("Request cancelled: {0}")]
    Cancelled(String),
}

/// Convenient Result type using LineageError
pub type Result<T> = std::result::Result<T, LineageError>;
