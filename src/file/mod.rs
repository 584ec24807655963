//! File management module for filestore.
//!
//! This module provides:
//! - File metadata records and their repository
//! - Upload validation (name, tags, size, MIME allow list)
//! - The service that keeps metadata and stored blobs in step

mod metadata;
mod service;
mod validation;

pub use metadata::{FileMetadata, FileRepository, NewFile};
pub use service::{is_previewable, FileDownload, FileService, Page, StagedUpload, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use validation::{validate_content_size, UploadRequest, ALLOWED_CONTENT_TYPES, MAX_FILE_NAME_LENGTH, MAX_TAGS_LENGTH};
