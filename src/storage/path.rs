//! File identities and storage paths.

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{StorageError, StorageResult};

/// Identity of a stored file.
///
/// Always a single path segment made of ASCII letters, digits, `-` and `_`,
/// so it can never reshape the storage path it is embedded in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileId(String);

impl FileId {
    /// Generate a fresh random identity (UUID v4, hyphenated).
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Parse an identity supplied from outside.
    pub fn parse(raw: &str) -> StorageResult<Self> {
        let valid = !raw.is_empty()
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(StorageError::AccessDenied(format!(
                "file id {raw:?} is not a single path segment"
            )))
        }
    }

    /// Get the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for FileId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Relative location of a blob directory inside the storage root.
///
/// Segments are always joined with `/` regardless of the host platform.
/// A `StoragePath` never contains `..`, is never absolute and is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoragePath(String);

impl StoragePath {
    /// Build the path for a file created at the given instant.
    pub fn generate(file_id: &FileId, at: DateTime<Utc>) -> Self {
        Self(format!("{}/{}", at.format("%Y/%m/%d"), file_id))
    }

    /// Parse a stored path string, rejecting anything that could escape the root.
    ///
    /// Backslashes are treated as separators too, so `..\..` is caught on
    /// every host. Empty and `.` segments are dropped.
    pub fn parse(raw: &str) -> StorageResult<Self> {
        let denied = |reason: &str| {
            StorageError::AccessDenied(format!("storage path {raw:?} {reason}"))
        };

        if raw.starts_with('/') || raw.starts_with('\\') {
            return Err(denied("is absolute"));
        }

        let mut segments = Vec::new();
        for segment in raw.split(['/', '\\']) {
            match segment {
                "" | "." => continue,
                ".." => return Err(denied("contains a parent segment")),
                s if s.contains(':') || s.contains('\0') => {
                    return Err(denied("contains a forbidden character"))
                }
                s => segments.push(s),
            }
        }

        if segments.is_empty() {
            return Err(denied("is empty"));
        }

        Ok(Self(segments.join("/")))
    }

    /// Get the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

impl AsRef<str> for StoragePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_file_id_new_is_unique() {
        let a = FileId::new();
        let b = FileId::new();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
        assert!(FileId::parse(a.as_str()).is_ok());
    }

    #[test]
    fn test_file_id_parse_rejects_separators() {
        assert!(FileId::parse("abc123").is_ok());
        assert!(FileId::parse("a_b-c").is_ok());
        for bad in ["", "..", "a/b", "a\\b", "a.b", "x y", "c:"] {
            assert!(
                matches!(FileId::parse(bad), Err(StorageError::AccessDenied(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_file_id_from_uuid() {
        let uuid = Uuid::new_v4();
        assert_eq!(FileId::from(uuid).as_str(), uuid.to_string());
    }

    #[test]
    fn test_generate_shape() {
        let at = Utc.with_ymd_and_hms(2024, 6, 15, 23, 59, 59).unwrap();
        let id = FileId::parse("abc123").unwrap();
        assert_eq!(StoragePath::generate(&id, at).as_str(), "2024/06/15/abc123");
    }

    #[test]
    fn test_generate_pads_components() {
        let at = Utc.with_ymd_and_hms(987, 1, 2, 0, 0, 0).unwrap();
        let id = FileId::parse("x").unwrap();
        assert_eq!(StoragePath::generate(&id, at).as_str(), "0987/01/02/x");
    }

    #[test]
    fn test_generate_is_deterministic() {
        let at = Utc.with_ymd_and_hms(2030, 12, 31, 12, 0, 0).unwrap();
        let id = FileId::new();
        assert_eq!(
            StoragePath::generate(&id, at),
            StoragePath::generate(&id, at)
        );
    }

    #[test]
    fn test_parse_normalizes() {
        let path = StoragePath::parse("2024//06/./15/abc").unwrap();
        assert_eq!(path.as_str(), "2024/06/15/abc");
        assert_eq!(path.segments().count(), 4);

        let path = StoragePath::parse("2024\\06\\15\\abc").unwrap();
        assert_eq!(path.as_str(), "2024/06/15/abc");
    }

    #[test]
    fn test_parse_rejects_traversal() {
        for bad in [
            "../etc",
            "2024/../../etc",
            "2024/06/..",
            "..\\..\\windows",
            "/etc/passwd",
            "\\server\\share",
            "C:/Windows",
            "",
            "./.",
            "a\0b",
        ] {
            assert!(
                matches!(StoragePath::parse(bad), Err(StorageError::AccessDenied(_))),
                "{bad:?} should be rejected"
            );
        }
    }
}
