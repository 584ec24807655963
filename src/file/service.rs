//! File service.
//!
//! Ties the blob store to the metadata table:
//! - Upload: validate, stream to disk with inline checksum, insert the row
//! - Download and preview of active files
//! - Soft and hard deletion

use std::fs::File;
use std::io::Read;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use validator::Validate;

use crate::db::Database;
use crate::storage::{BlobStore, CancelFlag, CancelOnDrop, FileId, SavedBlob, StorageResult};
use crate::{FileStoreError, Result};

use super::metadata::{FileMetadata, FileRepository, NewFile};
use super::validation::{describe, validate_content_size, UploadRequest};

/// Default page size when none (or an invalid one) is requested.
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Largest page size a caller may request.
pub const MAX_PAGE_SIZE: i64 = 100;

/// One page of results.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Size of the whole (filtered) result set.
    pub total_count: i64,
    pub page_number: i64,
    pub page_size: i64,
}

impl<T> Page<T> {
    /// Number of pages needed for `total_count` items.
    pub fn total_pages(&self) -> i64 {
        (self.total_count + self.page_size - 1) / self.page_size
    }
}

/// An open blob together with its metadata.
#[derive(Debug)]
pub struct FileDownload {
    pub metadata: FileMetadata,
    pub file: File,
}

/// A blob written to storage whose metadata row does not exist yet.
#[derive(Debug)]
pub struct StagedUpload {
    request: UploadRequest,
    file_id: FileId,
    created_at: DateTime<Utc>,
    saved: SavedBlob,
}

impl StagedUpload {
    /// Replace the tags that will be recorded.
    pub fn set_tags(&mut self, tags: Option<String>) {
        self.request.tags = tags;
    }

    /// Number of bytes stored.
    pub fn size_bytes(&self) -> u64 {
        self.saved.size_bytes
    }
}

/// File service for uploads, downloads and deletion.
#[derive(Clone)]
pub struct FileService {
    db: Database,
    storage: BlobStore,
    max_upload_bytes: u64,
}

impl FileService {
    /// Create a new FileService.
    pub fn new(db: Database, storage: BlobStore, max_upload_bytes: u64) -> Self {
        Self {
            db,
            storage,
            max_upload_bytes,
        }
    }

    /// Get the underlying blob store.
    pub fn storage(&self) -> &BlobStore {
        &self.storage
    }

    /// Maximum accepted upload size in bytes.
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    /// Store an upload and record its metadata.
    ///
    /// Equivalent to [`stage`](Self::stage) followed by [`record`](Self::record).
    pub async fn upload<R>(&self, request: UploadRequest, content: R, owner: &str) -> Result<FileMetadata>
    where
        R: Read + Send + 'static,
    {
        let staged = self.stage(request, content).await?;
        self.record(staged, owner).await
    }

    /// Stream upload content into the blob store without recording it yet.
    ///
    /// At most one byte past the upload limit is read; empty and oversized
    /// content is removed again and reported as a validation error. The date
    /// segment of the storage path and `created_at` come from the same
    /// instant. Dropping the returned future stops the write at its next chunk.
    pub async fn stage<R>(&self, request: UploadRequest, content: R) -> Result<StagedUpload>
    where
        R: Read + Send + 'static,
    {
        request
            .validate()
            .map_err(|e| FileStoreError::Validation(describe(&e)))?;

        let file_id = FileId::new();
        let created_at = Utc::now();
        let cancel = CancelFlag::new();
        let guard = CancelOnDrop::new(cancel.clone());
        let limited = content.take(self.max_upload_bytes.saturating_add(1));

        let saved = {
            let id = file_id.clone();
            self.blocking(move |storage| storage.save_file_at(&id, limited, created_at, &cancel))
                .await?
        };
        guard.disarm();

        if let Err(e) = validate_content_size(saved.size_bytes, self.max_upload_bytes) {
            self.remove_blob(saved.storage_path.to_string()).await;
            return Err(FileStoreError::Validation(describe(&e)));
        }

        Ok(StagedUpload {
            request,
            file_id,
            created_at,
            saved,
        })
    }

    /// Insert the metadata row for a staged blob.
    ///
    /// If the request no longer validates or the row cannot be inserted, the
    /// blob is removed again.
    pub async fn record(&self, staged: StagedUpload, owner: &str) -> Result<FileMetadata> {
        let StagedUpload {
            request,
            file_id,
            created_at,
            saved,
        } = staged;
        let storage_path = saved.storage_path.to_string();

        if let Err(e) = request.validate() {
            self.remove_blob(storage_path).await;
            return Err(FileStoreError::Validation(describe(&e)));
        }

        let new_file = NewFile {
            id: file_id.to_string(),
            original_file_name: request.file_name,
            content_type: request.content_type,
            size_in_bytes: saved.size_bytes as i64,
            checksum: saved.checksum.to_string(),
            storage_path: storage_path.clone(),
            tags: request.tags.filter(|t| !t.trim().is_empty()),
            created_by: owner.to_string(),
            created_at,
        };

        match FileRepository::new(self.db.pool()).create(&new_file).await {
            Ok(created) => {
                info!(
                    file_id = %created.id,
                    file_name = %created.original_file_name,
                    size = created.size_in_bytes,
                    "File uploaded"
                );
                Ok(created)
            }
            Err(e) => {
                self.remove_blob(storage_path).await;
                Err(e)
            }
        }
    }

    /// Drop a staged blob that will never be recorded.
    pub async fn discard(&self, staged: StagedUpload) {
        self.remove_blob(staged.saved.storage_path.to_string()).await;
    }

    async fn remove_blob(&self, storage_path: String) {
        let path = storage_path.clone();
        if let Err(e) = self.blocking(move |storage| storage.delete_file(&path)).await {
            warn!(
                storage_path = %storage_path,
                error = %e,
                "Failed to remove unrecorded blob"
            );
        }
    }

    /// Get an active file's metadata.
    pub async fn get(&self, id: &str) -> Result<FileMetadata> {
        FileRepository::new(self.db.pool())
            .get_by_id(id, false)
            .await?
            .ok_or_else(|| not_found(id))
    }

    /// List active files newest first, optionally filtered by a search term.
    ///
    /// `page_number` below 1 becomes 1; `page_size` outside 1..=100 becomes 20.
    pub async fn list(
        &self,
        page_number: i64,
        page_size: i64,
        search: Option<&str>,
    ) -> Result<Page<FileMetadata>> {
        let page_number = page_number.max(1);
        let page_size = if (1..=MAX_PAGE_SIZE).contains(&page_size) {
            page_size
        } else {
            DEFAULT_PAGE_SIZE
        };
        let skip = (page_number - 1).saturating_mul(page_size);

        let repo = FileRepository::new(self.db.pool());
        let search = search.map(str::trim).filter(|s| !s.is_empty());

        let (items, total_count) = match search {
            Some(term) => (
                repo.search(term, skip, page_size, false).await?,
                repo.count_search(term, false).await?,
            ),
            None => (
                repo.list(skip, page_size, false).await?,
                repo.count(false).await?,
            ),
        };

        Ok(Page {
            items,
            total_count,
            page_number,
            page_size,
        })
    }

    /// Replace the tags of an active file.
    pub async fn update_tags(&self, id: &str, tags: Option<&str>) -> Result<FileMetadata> {
        let repo = FileRepository::new(self.db.pool());
        let tags = tags.filter(|t| !t.trim().is_empty());

        if tags.is_some_and(|t| t.chars().count() > super::validation::MAX_TAGS_LENGTH as usize) {
            return Err(FileStoreError::Validation(
                "Tags cannot exceed 2000 characters".to_string(),
            ));
        }

        if !repo.update_tags(id, tags).await? {
            return Err(not_found(id));
        }
        self.get(id).await
    }

    /// Open an active file for download.
    pub async fn download(&self, id: &str) -> Result<FileDownload> {
        let metadata = FileRepository::new(self.db.pool())
            .get_by_id(id, true)
            .await?
            .ok_or_else(|| not_found(id))?;

        if metadata.is_deleted() {
            return Err(FileStoreError::Gone(format!("file {id}")));
        }

        let path = metadata.storage_path.clone();
        let file = self
            .blocking(move |storage| storage.open_read_stream(&path))
            .await?;

        Ok(FileDownload { metadata, file })
    }

    /// Open an active image or PDF for inline display.
    pub async fn preview(&self, id: &str) -> Result<FileDownload> {
        let download = self.download(id).await?;
        if !is_previewable(&download.metadata.content_type) {
            return Err(FileStoreError::Validation(format!(
                "preview is not available for {}",
                download.metadata.content_type
            )));
        }
        Ok(download)
    }

    /// Mark an active file deleted; its blob is kept.
    pub async fn soft_delete(&self, id: &str) -> Result<()> {
        let repo = FileRepository::new(self.db.pool());
        if repo.get_by_id(id, false).await?.is_none() {
            return Err(not_found(id));
        }

        repo.soft_delete(id).await?;
        info!(file_id = %id, "File soft deleted");
        Ok(())
    }

    /// Remove a file's blob and row, whether or not it was soft-deleted.
    pub async fn hard_delete(&self, id: &str) -> Result<()> {
        let repo = FileRepository::new(self.db.pool());
        let metadata = repo
            .get_by_id(id, true)
            .await?
            .ok_or_else(|| not_found(id))?;

        let path = metadata.storage_path;
        self.blocking(move |storage| {
            if storage.file_exists(&path)? {
                storage.delete_file(&path)?;
            }
            Ok(())
        })
        .await?;

        repo.hard_delete(id).await?;
        info!(file_id = %id, "File hard deleted");
        Ok(())
    }

    /// Run blob store work on the blocking thread pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&BlobStore) -> StorageResult<T> + Send + 'static,
    {
        let storage = self.storage.clone();
        let result = tokio::task::spawn_blocking(move || f(&storage))
            .await
            .map_err(|e| FileStoreError::Io(std::io::Error::other(e)))?;
        Ok(result?)
    }
}

/// Whether a content type can be shown inline.
pub fn is_previewable(content_type: &str) -> bool {
    let lower = content_type.to_ascii_lowercase();
    lower.starts_with("image/") || lower == "application/pdf"
}

fn not_found(id: &str) -> FileStoreError {
    FileStoreError::NotFound(format!("file {id}"))
}
