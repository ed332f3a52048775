//! Content fingerprints for input videos.
//!
//! A fingerprint is the SHA-256 of a file's full byte content, so two copies of
//! the same upload share a cache entry no matter what they are called.

use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::Error;

/// Read size for streaming files through the digest.
const CHUNK_SIZE: usize = 8192;

/// Hex-encoded SHA-256 of a file's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Validate an externally supplied fingerprint.
    ///
    /// Accepts exactly 64 hex digits and normalizes them to lowercase.
    pub fn parse(s: &str) -> Result<Self, Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidHash);
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wrap a value read back from the index without revalidating it.
    pub(crate) fn from_stored(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the fingerprint of a file by streaming it in fixed-size chunks.
///
/// This is blocking I/O; async callers should run it on a
/// [`BlockingPool`](crate::pool::BlockingPool).
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be opened or read.
pub fn fingerprint_file(path: impl AsRef<Path>) -> Result<Fingerprint, Error> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];

    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::io(path, e)),
        };
        hasher.update(&buf[..n]);
    }

    Ok(Fingerprint(hex::encode(hasher.finalize())))
}
