//! File metadata types and repository.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::datetime::to_db_string;
use crate::Result;

const COLUMNS: &str = "id, original_file_name, content_type, size_in_bytes, checksum, \
                       storage_path, tags, created_by, created_at, updated_at, deleted_at";

/// Metadata row for a stored file.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct FileMetadata {
    /// File ID (also the last storage path segment).
    pub id: String,
    /// Filename as supplied by the uploader.
    pub original_file_name: String,
    /// MIME type as supplied by the uploader.
    pub content_type: String,
    /// Content size in bytes.
    pub size_in_bytes: i64,
    /// Lowercase hex SHA-256 of the content.
    pub checksum: String,
    /// Relative blob location (`YYYY/MM/DD/<id>`).
    pub storage_path: String,
    /// Free-form tags.
    pub tags: Option<String>,
    /// Subject of the token that uploaded the file.
    pub created_by: String,
    /// Upload time (stored UTC text).
    pub created_at: String,
    /// Last metadata change.
    pub updated_at: Option<String>,
    /// Soft-deletion time; `None` while the file is active.
    pub deleted_at: Option<String>,
}

impl FileMetadata {
    /// Whether the record has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Data for inserting a file row.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub id: String,
    pub original_file_name: String,
    pub content_type: String,
    pub size_in_bytes: i64,
    pub checksum: String,
    pub storage_path: String,
    pub tags: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Repository for file metadata operations.
pub struct FileRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> FileRepository<'a> {
    /// Create a new FileRepository with the given database pool reference.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new file row and return it as stored.
    pub async fn create(&self, file: &NewFile) -> Result<FileMetadata> {
        let sql = format!(
            "INSERT INTO files (id, original_file_name, content_type, size_in_bytes, checksum,
                                storage_path, tags, created_by, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {COLUMNS}"
        );

        let created = sqlx::query_as::<_, FileMetadata>(&sql)
            .bind(&file.id)
            .bind(&file.original_file_name)
            .bind(&file.content_type)
            .bind(file.size_in_bytes)
            .bind(&file.checksum)
            .bind(&file.storage_path)
            .bind(&file.tags)
            .bind(&file.created_by)
            .bind(to_db_string(&file.created_at))
            .fetch_one(self.pool)
            .await?;

        Ok(created)
    }

    /// Get a file by ID; soft-deleted rows only when `include_deleted`.
    pub async fn get_by_id(&self, id: &str, include_deleted: bool) -> Result<Option<FileMetadata>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM files WHERE id = ?{}",
            active_filter(include_deleted, "AND")
        );

        let file = sqlx::query_as::<_, FileMetadata>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(file)
    }

    /// List files newest first.
    pub async fn list(&self, skip: i64, take: i64, include_deleted: bool) -> Result<Vec<FileMetadata>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM files{}
             ORDER BY created_at DESC, id
             LIMIT ? OFFSET ?",
            active_filter(include_deleted, "WHERE")
        );

        let files = sqlx::query_as::<_, FileMetadata>(&sql)
            .bind(take)
            .bind(skip)
            .fetch_all(self.pool)
            .await?;

        Ok(files)
    }

    /// Case-insensitive substring search over file name, tags and content type.
    pub async fn search(
        &self,
        term: &str,
        skip: i64,
        take: i64,
        include_deleted: bool,
    ) -> Result<Vec<FileMetadata>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM files
             WHERE {SEARCH_CLAUSE}{}
             ORDER BY created_at DESC, id
             LIMIT ? OFFSET ?",
            active_filter(include_deleted, "AND")
        );
        let needle = term.to_lowercase();

        let files = sqlx::query_as::<_, FileMetadata>(&sql)
            .bind(&needle)
            .bind(&needle)
            .bind(&needle)
            .bind(take)
            .bind(skip)
            .fetch_all(self.pool)
            .await?;

        Ok(files)
    }

    /// Count files.
    pub async fn count(&self, include_deleted: bool) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM files{}",
            active_filter(include_deleted, "WHERE")
        );

        let count: i64 = sqlx::query_scalar(&sql).fetch_one(self.pool).await?;
        Ok(count)
    }

    /// Count files matching a search term.
    pub async fn count_search(&self, term: &str, include_deleted: bool) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM files WHERE {SEARCH_CLAUSE}{}",
            active_filter(include_deleted, "AND")
        );
        let needle = term.to_lowercase();

        let count: i64 = sqlx::query_scalar(&sql)
            .bind(&needle)
            .bind(&needle)
            .bind(&needle)
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    /// Replace the tags of an active file. Returns false if no such file.
    pub async fn update_tags(&self, id: &str, tags: Option<&str>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE files SET tags = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(tags)
        .bind(to_db_string(&Utc::now()))
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark a file deleted. The first deletion time is kept on repeat calls.
    ///
    /// Returns true if this call changed the row.
    pub async fn soft_delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE files SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
            .bind(to_db_string(&Utc::now()))
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove a file row entirely.
    pub async fn hard_delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Whether a row with this ID exists, deleted or not.
    pub async fn exists(&self, id: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM files WHERE id = ?)")
            .bind(id)
            .fetch_one(self.pool)
            .await?;

        Ok(exists)
    }
}

// instr() keeps `%` and `_` in user input literal.
const SEARCH_CLAUSE: &str = "(instr(lower(original_file_name), ?) > 0
        OR (tags IS NOT NULL AND instr(lower(tags), ?) > 0)
        OR instr(lower(content_type), ?) > 0)";

fn active_filter(include_deleted: bool, keyword: &str) -> String {
    if include_deleted {
        String::new()
    } else {
        format!(" {keyword} deleted_at IS NULL")
    }
}
