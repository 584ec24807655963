//! Local blob storage for filestore.
//!
//! This module owns every byte of uploaded content on disk:
//! - Date-sharded storage paths (`YYYY/MM/DD/<file id>`)
//! - Atomic temp-file-then-rename writes with inline SHA-256
//! - Path resolution that never leaves the storage root
//! - Idempotent deletion with best-effort directory cleanup

mod blob_store;
mod cancel;
mod checksum;
mod path;

pub use blob_store::{BlobStore, SavedBlob, CONTENT_FILE_NAME, SIDECAR_FILE_NAME};
pub use cancel::CancelFlag;
pub(crate) use cancel::CancelOnDrop;
pub use checksum::{Checksum, CHUNK_SIZE};
pub use path::{FileId, StoragePath};

use thiserror::Error;

/// Errors raised by the blob store.
///
/// The store never retries; callers decide what to do with each kind.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The path would resolve outside the storage root.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// No content file exists at an otherwise valid storage path.
    #[error("blob not found at {0}")]
    NotFound(String),

    /// The caller cancelled an in-flight write.
    #[error("write cancelled")]
    Cancelled,

    /// Disk full, permission problems, interrupted writes.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for blob store operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
