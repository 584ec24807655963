//! filestore - file management service.
//!
//! Uploaded files are kept in a date-sharded local blob store with atomic
//! writes, path-traversal protection and SHA-256 checksums. Metadata lives in
//! SQLite and is served through a JWT-protected HTTP API.

pub mod config;
pub mod datetime;
pub mod db;
pub mod error;
pub mod file;
pub mod logging;
pub mod storage;
pub mod web;

pub use config::Config;
pub use db::{Database, DbPool};
pub use error::{FileStoreError, Result};
pub use file::{FileMetadata, FileRepository, FileService, NewFile, Page, UploadRequest};
pub use storage::{BlobStore, CancelFlag, Checksum, FileId, StorageError, StoragePath};
pub use web::WebServer;
