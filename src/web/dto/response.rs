//! Response DTOs for the HTTP API.

use serde::Serialize;

use crate::datetime::to_rfc3339;
use crate::file::{FileMetadata, Page};

/// Generic API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Paginated response wrapper.
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T: Serialize> {
    pub data: Vec<T>,
    pub meta: PaginationMeta,
}

/// Pagination metadata.
#[derive(Debug, Serialize)]
pub struct PaginationMeta {
    /// Current page number.
    pub page: i64,
    /// Items per page.
    pub per_page: i64,
    /// Total number of matching items.
    pub total: i64,
    pub total_pages: i64,
}

impl<T: Serialize> PaginatedResponse<T> {
    /// Convert a service page, mapping each item.
    pub fn from_page<U>(page: Page<U>, f: impl FnMut(U) -> T) -> Self {
        let meta = PaginationMeta {
            page: page.page_number,
            per_page: page.page_size,
            total: page.total_count,
            total_pages: page.total_pages(),
        };
        Self {
            data: page.items.into_iter().map(f).collect(),
            meta,
        }
    }
}

/// File metadata as returned to clients.
///
/// The storage path stays server-side.
#[derive(Debug, Serialize)]
pub struct FileResponse {
    pub id: String,
    pub original_file_name: String,
    pub content_type: String,
    pub size_in_bytes: i64,
    pub checksum: String,
    pub tags: Option<String>,
    pub created_by: String,
    /// RFC3339 upload time.
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl From<FileMetadata> for FileResponse {
    fn from(file: FileMetadata) -> Self {
        Self {
            id: file.id,
            original_file_name: file.original_file_name,
            content_type: file.content_type,
            size_in_bytes: file.size_in_bytes,
            checksum: file.checksum,
            tags: file.tags,
            created_by: file.created_by,
            created_at: to_rfc3339(&file.created_at),
            updated_at: file.updated_at.as_deref().map(to_rfc3339),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> FileMetadata {
        FileMetadata {
            id: "abc".to_string(),
            original_file_name: "a.txt".to_string(),
            content_type: "text/plain".to_string(),
            size_in_bytes: 3,
            checksum: "ff".repeat(32),
            storage_path: "2024/06/15/abc".to_string(),
            tags: None,
            created_by: "alice".to_string(),
            created_at: "2024-06-15 12:00:00.000000".to_string(),
            updated_at: None,
            deleted_at: None,
        }
    }

    #[test]
    fn test_file_response_hides_storage_path() {
        let json = serde_json::to_value(FileResponse::from(metadata())).unwrap();

        assert_eq!(json["id"], "abc");
        assert_eq!(json["created_at"], "2024-06-15T12:00:00.000000Z");
        assert!(json.get("storage_path").is_none());
        assert!(json.get("updated_at").is_none());
    }

    #[test]
    fn test_paginated_response_meta() {
        let page = Page {
            items: vec![metadata()],
            total_count: 41,
            page_number: 2,
            page_size: 20,
        };

        let response = PaginatedResponse::from_page(page, FileResponse::from);

        assert_eq!(response.data.len(), 1);
        assert_eq!(response.meta.page, 2);
        assert_eq!(response.meta.total, 41);
        assert_eq!(response.meta.total_pages, 3);
    }
}
