//! SHA-256 digests for downloaded file verification
//!
//! Digests are kept as raw 32-byte arrays and compared byte-wise. File entries
//! carry the expected digest as a hex string, which is parsed on demand.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};

use crate::errors::CacheError;

/// SHA-256 digest stored as raw bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sha256Hash([u8; 32]);

impl Sha256Hash {
    /// Parse a 64-character hex string (case insensitive)
    ///
    /// # Errors
    ///
    /// Returns `CacheError::IllegalArgument` if the string is not a valid
    /// SHA-256 hex representation
    pub fn from_hex(hex: &str) -> Result<Self, CacheError> {
        let invalid = || CacheError::IllegalArgument(format!("invalid sha256 digest: {}", hex));
        if hex.len() != 64 || !hex.is_ascii() {
            return Err(invalid());
        }

        let mut bytes = [0u8; 32];
        for (i, pair) in hex.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(pair).map_err(|_| invalid())?;
            bytes[i] = u8::from_str_radix(pair, 16).map_err(|_| invalid())?;
        }
        Ok(Sha256Hash(bytes))
    }

    /// Digest a complete in-memory buffer
    pub fn digest(data: &[u8]) -> Self {
        Self::from_digest(&Sha256::digest(data))
    }

    fn from_digest(digest: &[u8]) -> Self {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(digest);
        Sha256Hash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex representation
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Compare against an expected hex digest, treating malformed input as a mismatch
    pub fn matches_hex(&self, expected: &str) -> bool {
        Sha256Hash::from_hex(expected).map_or(false, |hash| hash == *self)
    }
}

impl fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Sha256Hash {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// Incremental hasher fed while a download streams to disk
#[derive(Default)]
pub struct StreamingHasher {
    inner: Sha256,
    bytes: u64,
}

impl StreamingHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
        self.bytes += chunk.len() as u64;
    }

    /// Number of bytes hashed so far
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn finish(self) -> Sha256Hash {
        Sha256Hash::from_digest(&self.inner.finalize())
    }
}
