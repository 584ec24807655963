//! Error types for filestore.

use thiserror::Error;

use crate::storage::StorageError;

/// Common error type for filestore.
#[derive(Error, Debug)]
pub enum FileStoreError {
    /// Database error.
    ///
    /// Errors from sqlx are converted into this variant.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A storage path resolved outside the storage root.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// The record exists but has been soft-deleted.
    #[error("{0} has been deleted")]
    Gone(String),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The operation was cancelled by its caller.
    #[error("operation cancelled")]
    Cancelled,
}

impl From<sqlx::Error> for FileStoreError {
    fn from(e: sqlx::Error) -> Self {
        FileStoreError::Database(e.to_string())
    }
}

impl From<StorageError> for FileStoreError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::AccessDenied(msg) => FileStoreError::AccessDenied(msg),
            StorageError::NotFound(path) => FileStoreError::NotFound(format!("blob {path}")),
            StorageError::Cancelled => FileStoreError::Cancelled,
            StorageError::Io(err) => FileStoreError::Io(err),
        }
    }
}

/// Result type alias for filestore operations.
pub type Result<T> = std::result::Result<T, FileStoreError>;
