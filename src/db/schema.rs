//! Database schema and migrations for filestore.
//!
//! Migrations are applied in order when the database is opened; the
//! `schema_version` table records which ones have run.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: File metadata
    r#"
-- One row per stored blob; content lives under storage_path in the blob store
CREATE TABLE files (
    id                  TEXT PRIMARY KEY,
    original_file_name  TEXT NOT NULL,
    content_type        TEXT NOT NULL,
    size_in_bytes       INTEGER NOT NULL,
    checksum            TEXT NOT NULL,        -- lowercase hex SHA-256
    storage_path        TEXT NOT NULL,        -- YYYY/MM/DD/<id>
    tags                TEXT,
    created_by          TEXT NOT NULL,
    created_at          TEXT NOT NULL,
    updated_at          TEXT,
    deleted_at          TEXT                  -- NULL unless soft-deleted
);

CREATE INDEX idx_files_created_at ON files(created_at);
CREATE INDEX idx_files_deleted_at ON files(deleted_at);
"#,
];
