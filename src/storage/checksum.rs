//! SHA-256 content checksums.

use std::fmt;
use std::io::{self, Read};

use sha2::{Digest, Sha256};

/// Buffer size used when streaming content.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Lowercase hex SHA-256 digest of a blob's full content.
///
/// There is deliberately no way to build a `Checksum` from an arbitrary
/// string; it only comes out of hashing a stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Checksum(String);

impl Checksum {
    /// Stream `reader` to its end through SHA-256.
    ///
    /// Memory use is bounded by [`CHUNK_SIZE`] whatever the input length.
    pub fn compute<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut hasher = ChecksumBuilder::new();
        let mut buf = vec![0u8; CHUNK_SIZE];

        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => hasher.update(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(hasher.finish())
    }

    /// Digest an in-memory buffer.
    pub fn of_bytes(data: &[u8]) -> Self {
        let mut hasher = ChecksumBuilder::new();
        hasher.update(data);
        hasher.finish()
    }

    /// Get the hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare against a digest loaded from elsewhere (e.g. the database).
    pub fn matches(&self, stored: &str) -> bool {
        self.0.eq_ignore_ascii_case(stored)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Incremental digest used by the single-pass write path.
pub(crate) struct ChecksumBuilder {
    hasher: Sha256,
}

impl ChecksumBuilder {
    pub(crate) fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    pub(crate) fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub(crate) fn finish(self) -> Checksum {
        Checksum(format!("{:x}", self.hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn test_known_vectors() {
        assert_eq!(Checksum::of_bytes(b"").as_str(), EMPTY_SHA256);
        assert_eq!(Checksum::of_bytes(b"abc").as_str(), ABC_SHA256);
    }

    #[test]
    fn test_compute_matches_of_bytes() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let streamed = Checksum::compute(&data[..]).unwrap();
        assert_eq!(streamed, Checksum::of_bytes(&data));
    }

    #[test]
    fn test_format_is_lowercase_hex() {
        let checksum = Checksum::of_bytes(b"Hello, World!");
        assert_eq!(checksum.as_str().len(), 64);
        assert!(checksum
            .as_str()
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_one_byte_difference() {
        let a = Checksum::of_bytes(b"0123456789");
        let b = Checksum::of_bytes(b"0123456788");
        assert_ne!(a, b);
    }

    #[test]
    fn test_matches_is_case_insensitive() {
        let checksum = Checksum::of_bytes(b"abc");
        assert!(checksum.matches(&ABC_SHA256.to_uppercase()));
        assert!(!checksum.matches(EMPTY_SHA256));
    }

    #[test]
    fn test_compute_propagates_read_errors() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            }
        }

        let err = Checksum::compute(Broken).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
