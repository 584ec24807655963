//! Blob store for filestore.
//!
//! Blobs live in a date-sharded directory structure:
//! ```text
//! {root}/
//! └── 2024/
//!     └── 06/
//!         └── 15/
//!             └── 6f1c2e9a-0b7d-4d8e-9a55-3f2b7c1d0e42/
//!                 ├── content.bin              (canonical content)
//!                 └── content.tmp.<uuid>       (only while a write is in flight)
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::cancel::CancelFlag;
use super::checksum::{Checksum, ChecksumBuilder, CHUNK_SIZE};
use super::path::{FileId, StoragePath};
use super::{StorageError, StorageResult};

/// Name of the canonical content file inside a blob directory.
pub const CONTENT_FILE_NAME: &str = "content.bin";

/// Name of the optional sidecar metadata file inside a blob directory.
pub const SIDECAR_FILE_NAME: &str = "metadata.json";

const TEMP_FILE_PREFIX: &str = "content.tmp.";

/// Attempts at creating a blob directory while empty parents are being swept.
const CREATE_DIR_ATTEMPTS: usize = 5;

/// Outcome of a successful save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedBlob {
    /// Relative path to persist in the metadata record.
    pub storage_path: StoragePath,
    /// Digest of exactly the bytes written.
    pub checksum: Checksum,
    /// Number of bytes written.
    pub size_bytes: u64,
}

/// Path-safe, atomic store for opaque byte streams under a fixed root.
///
/// All operations are blocking and the store holds no mutable state, so one
/// instance can be cloned into as many worker threads as needed.
#[derive(Debug, Clone)]
pub struct BlobStore {
    /// Root directory as configured.
    root: PathBuf,
    /// Root with symlinks and relative components resolved.
    canonical_root: PathBuf,
}

impl BlobStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();

        if !root.exists() {
            fs::create_dir_all(&root)?;
            info!(root = %root.display(), "Created storage root directory");
        }

        let canonical_root = fs::canonicalize(&root)?;

        Ok(Self {
            root,
            canonical_root,
        })
    }

    /// Get the root directory as configured.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Storage path for a file created now.
    pub fn generate_storage_path(&self, file_id: &FileId) -> StoragePath {
        StoragePath::generate(file_id, Utc::now())
    }

    /// Resolve a stored path string to an absolute directory inside the root.
    ///
    /// Fails with [`StorageError::AccessDenied`] for `..` segments, absolute
    /// paths, or anything whose existing prefix resolves (through symlinks)
    /// outside the root.
    pub fn resolve_path(&self, storage_path: &str) -> StorageResult<PathBuf> {
        let parsed = StoragePath::parse(storage_path).inspect_err(|e| {
            warn!(storage_path, error = %e, "Rejected storage path");
        })?;
        self.resolve(&parsed)
    }

    fn resolve(&self, storage_path: &StoragePath) -> StorageResult<PathBuf> {
        let mut candidate = self.canonical_root.clone();
        for segment in storage_path.segments() {
            candidate.push(segment);
        }

        self.ensure_inside(&candidate).inspect_err(|e| {
            if matches!(e, StorageError::AccessDenied(_)) {
                warn!(storage_path = %storage_path, error = %e, "Rejected storage path");
            }
        })?;

        Ok(candidate)
    }

    /// Check that the deepest existing ancestor of `candidate` is inside the root.
    fn ensure_inside(&self, candidate: &Path) -> StorageResult<()> {
        let denied = || {
            StorageError::AccessDenied(format!(
                "{} resolves outside the storage root",
                candidate.display()
            ))
        };

        let mut ancestor = candidate;
        let existing = loop {
            match fs::symlink_metadata(ancestor) {
                Ok(_) => break ancestor,
                Err(e) if e.kind() == io::ErrorKind::NotFound => match ancestor.parent() {
                    Some(parent) => ancestor = parent,
                    None => return Err(denied()),
                },
                Err(e) => return Err(e.into()),
            }
        };

        let canonical = match fs::canonicalize(existing) {
            Ok(path) => path,
            // A dangling symlink: its target is unknowable, so refuse it.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(denied()),
            Err(e) => return Err(e.into()),
        };

        if canonical.starts_with(&self.canonical_root) {
            Ok(())
        } else {
            Err(denied())
        }
    }

    /// Resolve the canonical content file for a stored path.
    fn content_path(&self, storage_path: &str) -> StorageResult<PathBuf> {
        let file = self.resolve_path(storage_path)?.join(CONTENT_FILE_NAME);
        self.ensure_inside(&file).inspect_err(|e| {
            warn!(storage_path, error = %e, "Rejected content file");
        })?;
        Ok(file)
    }

    /// Persist a stream under a freshly generated path for `file_id`.
    ///
    /// Content is hashed while it is written, so the returned checksum always
    /// describes exactly the bytes on disk.
    pub fn save_file<R: Read>(&self, file_id: &FileId, reader: R) -> StorageResult<SavedBlob> {
        self.save_file_at(file_id, reader, Utc::now(), &CancelFlag::new())
    }

    /// Like [`save_file`](Self::save_file), stopping early once `cancel` is set.
    pub fn save_file_cancellable<R: Read>(
        &self,
        file_id: &FileId,
        reader: R,
        cancel: &CancelFlag,
    ) -> StorageResult<SavedBlob> {
        self.save_file_at(file_id, reader, Utc::now(), cancel)
    }

    /// Persist a stream as if it were created at `now`.
    ///
    /// The write goes to a uniquely named temp file in the target directory,
    /// is flushed and synced, then renamed onto `content.bin`. Any failure
    /// removes the temp file; the canonical name is never left half-written.
    pub fn save_file_at<R: Read>(
        &self,
        file_id: &FileId,
        mut reader: R,
        now: DateTime<Utc>,
        cancel: &CancelFlag,
    ) -> StorageResult<SavedBlob> {
        let storage_path = StoragePath::generate(file_id, now);
        let dir = self.resolve(&storage_path)?;
        let temp_path = dir.join(format!("{TEMP_FILE_PREFIX}{}", Uuid::new_v4()));

        let result = create_blob_dir(&dir)
            .and_then(|()| write_temp_file(&temp_path, &mut reader, cancel))
            .and_then(|written| {
                commit(&temp_path, &dir)?;
                Ok(written)
            });

        match result {
            Ok((checksum, size_bytes)) => {
                info!(
                    storage_path = %storage_path,
                    size = size_bytes,
                    checksum = %checksum,
                    "Saved blob"
                );
                Ok(SavedBlob {
                    storage_path,
                    checksum,
                    size_bytes,
                })
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&temp_path) {
                    if cleanup.kind() != io::ErrorKind::NotFound {
                        warn!(path = %temp_path.display(), error = %cleanup, "Failed to remove temp file");
                    }
                }
                warn!(storage_path = %storage_path, error = %e, "Failed to save blob");
                Err(e)
            }
        }
    }

    /// Open the content of a blob for reading.
    ///
    /// The file is opened read-only; any number of readers may hold it at once.
    pub fn open_read_stream(&self, storage_path: &str) -> StorageResult<File> {
        let path = self.content_path(storage_path)?;

        match File::open(&path) {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(storage_path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a blob's content file is present.
    ///
    /// Absence is `Ok(false)`; only invalid paths and real I/O failures error.
    pub fn file_exists(&self, storage_path: &str) -> StorageResult<bool> {
        let path = self.content_path(storage_path)?;

        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Size in bytes of a blob's content file.
    pub fn file_size(&self, storage_path: &str) -> StorageResult<u64> {
        let path = self.content_path(storage_path)?;

        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(storage_path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a blob's content and sidecar files.
    ///
    /// Deleting something already gone succeeds. The blob directory is removed
    /// when it ends up empty; if that fails it is left behind silently.
    pub fn delete_file(&self, storage_path: &str) -> StorageResult<()> {
        let dir = self.resolve_path(storage_path)?;

        for name in [CONTENT_FILE_NAME, SIDECAR_FILE_NAME] {
            match fs::remove_file(dir.join(name)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    error!(storage_path, error = %e, "Error deleting blob");
                    return Err(e.into());
                }
            }
        }

        if let Err(e) = fs::remove_dir(&dir) {
            debug!(storage_path, error = %e, "Left blob directory in place");
        }

        info!(storage_path, "Deleted blob");
        Ok(())
    }

    /// Digest a stream without touching the filesystem.
    pub fn compute_checksum<R: Read>(&self, reader: R) -> StorageResult<Checksum> {
        Ok(Checksum::compute(reader)?)
    }

    /// Remove empty date directories (`YYYY`, `YYYY/MM`, `YYYY/MM/DD`).
    ///
    /// Returns how many directories were removed. Directories that are not
    /// empty, or that disappear concurrently, are skipped.
    pub fn cleanup_empty_dirs(&self) -> StorageResult<usize> {
        fn sweep(dir: &Path, depth: usize) -> usize {
            let Ok(entries) = fs::read_dir(dir) else {
                return 0;
            };

            let mut removed = 0;
            for entry in entries.flatten() {
                let path = entry.path();
                let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                if !is_dir {
                    continue;
                }
                if depth > 1 {
                    removed += sweep(&path, depth - 1);
                }
                if fs::remove_dir(&path).is_ok() {
                    removed += 1;
                }
            }
            removed
        }

        let removed = sweep(&self.canonical_root, 3);
        if removed > 0 {
            debug!(removed, "Removed empty storage directories");
        }
        Ok(removed)
    }
}

/// Create a blob directory and its date parents.
///
/// [`BlobStore::cleanup_empty_dirs`] may remove a parent between two levels
/// of `create_dir_all`, which surfaces as `NotFound`; the whole chain is
/// simply created again.
fn create_blob_dir(dir: &Path) -> StorageResult<()> {
    let mut attempt = 1;
    loop {
        match fs::create_dir_all(dir) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound && attempt < CREATE_DIR_ATTEMPTS => {
                debug!(dir = %dir.display(), attempt, "Parent directory vanished, retrying");
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Stream `reader` into a new file at `temp_path`, hashing as it goes.
fn write_temp_file<R: Read>(
    temp_path: &Path,
    reader: &mut R,
    cancel: &CancelFlag,
) -> StorageResult<(Checksum, u64)> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(temp_path)?;
    let mut hasher = ChecksumBuilder::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut size = 0u64;

    loop {
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }

        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };

        hasher.update(&buf[..n]);
        file.write_all(&buf[..n])?;
        size += n as u64;
    }

    // The source may have ended only because its producer was torn down.
    if cancel.is_cancelled() {
        return Err(StorageError::Cancelled);
    }

    file.flush()?;
    file.sync_all()?;

    Ok((hasher.finish(), size))
}

/// Atomically move a finished temp file onto the canonical name.
fn commit(temp_path: &Path, dir: &Path) -> StorageResult<()> {
    fs::rename(temp_path, dir.join(CONTENT_FILE_NAME))?;

    // Persist the rename itself; failure here does not undo the write.
    #[cfg(unix)]
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }

    Ok(())
}
