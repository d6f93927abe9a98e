#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! BLAKE3 content digests for atomos
//!
//! A digest identifies exactly what content a synchronization produced.
//! Equal sources always yield equal digests; the algorithm itself is an
//! implementation detail and not part of any wire format.

use blake3::Hasher;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use atomos_errors::{Error, SyncError};

/// Size of chunks for streaming digest computation
const CHUNK_SIZE: usize = 64 * 1024; // 64KB

/// A BLAKE3 content digest
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    bytes: [u8; 32],
}

impl Digest {
    /// Create a digest from raw bytes
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Get the raw bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Convert to hex string
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Parse from hex string
    ///
    /// # Errors
    /// Returns an error if the input is not valid hexadecimal or does not
    /// decode to exactly 32 bytes.
    pub fn from_hex(s: &str) -> Result<Self, Error> {
        let bytes = hex::decode(s).map_err(|e| SyncError::DigestFailed {
            path: String::new(),
            message: format!("invalid hex: {e}"),
        })?;

        if bytes.len() != 32 {
            return Err(SyncError::DigestFailed {
                path: String::new(),
                message: format!("digest must be 32 bytes, got {}", bytes.len()),
            }
            .into());
        }

        let mut array = [0u8; 32];
        array.copy_from_slice(&bytes);
        Ok(Self::from_bytes(array))
    }

    /// Compute digest of a byte slice
    #[must_use]
    pub fn from_data(data: &[u8]) -> Self {
        let hash = blake3::hash(data);
        Self::from_bytes(*hash.as_bytes())
    }

    /// Compute digest of a file
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or read.
    pub async fn hash_file(path: &Path) -> Result<Self, Error> {
        let mut file = File::open(path)
            .await
            .map_err(|e| Error::io_with_path(&e, path))?;

        let mut hasher = Hasher::new();
        let mut buffer = vec![0; CHUNK_SIZE];

        loop {
            let n = file.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(Self::from_bytes(*hasher.finalize().as_bytes()))
    }

    /// Compute digest of a blocking reader. Used from contexts that already
    /// run on the blocking thread pool, such as streaming tar extraction.
    ///
    /// # Errors
    /// Returns an error if reading fails.
    pub fn hash_reader<R: Read>(mut reader: R) -> Result<Self, Error> {
        let mut hasher = Hasher::new();
        let mut buffer = vec![0; CHUNK_SIZE];

        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(Self::from_bytes(*hasher.finalize().as_bytes()))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Incremental digest builder for composite content such as directory trees.
///
/// Feed path names and file contents in a deterministic order; the resulting
/// digest is stable across runs for identical trees.
#[derive(Default)]
pub struct DigestBuilder {
    hasher: Hasher,
}

impl DigestBuilder {
    /// Create an empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mix raw bytes into the digest
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.hasher.update(data);
        self
    }

    /// Mix a path (as lossy UTF-8, NUL-terminated to avoid ambiguity between
    /// adjacent records) into the digest
    pub fn update_path(&mut self, path: &Path) -> &mut Self {
        self.hasher.update(path.to_string_lossy().as_bytes());
        self.hasher.update(&[0]);
        self
    }

    /// Finalize into a digest
    #[must_use]
    pub fn finish(&self) -> Digest {
        Digest::from_bytes(*self.hasher.finalize().as_bytes())
    }
}
