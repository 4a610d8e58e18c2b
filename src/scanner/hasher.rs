//! BLAKE3 file hasher with streaming support.
//!
//! # Overview
//!
//! This module provides the [`ContentHasher`] trait, the seam the scan engine
//! hashes through, and [`Hasher`], its BLAKE3 implementation.
//!
//! Small and medium files are streamed through a fixed-size buffer so memory
//! use stays constant. Files above the memory-map threshold are hashed with
//! `blake3`'s rayon-parallel mmap path.
//!
//! # Example
//!
//! ```no_run
//! use dupevault::scanner::{hash_to_hex, ContentHasher, Hasher};
//! use std::path::Path;
//!
//! let hasher = Hasher::new();
//! let digest = hasher.hash_file(Path::new("photo.jpg")).unwrap();
//! println!("{}", hash_to_hex(&digest));
//! ```

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::HashError;

/// A BLAKE3 digest.
pub type Hash = [u8; 32];

/// Default read buffer for streaming hashing.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Files at or above this size are hashed through a memory map.
pub const DEFAULT_MMAP_THRESHOLD: u64 = 16 * 1024 * 1024;

/// Streaming content hasher: byte stream in, fixed-length digest out.
pub trait ContentHasher: Send + Sync {
    /// Hash the full content of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be opened or read.
    fn hash_file(&self, path: &Path) -> Result<Hash, HashError>;
}

/// BLAKE3 hasher.
#[derive(Debug, Clone)]
pub struct Hasher {
    buffer_size: usize,
    mmap_threshold: Option<u64>,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    /// Create a hasher with default buffer size and mmap threshold.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            mmap_threshold: Some(DEFAULT_MMAP_THRESHOLD),
            shutdown_flag: None,
        }
    }

    /// Set the streaming buffer size (minimum 4 KiB).
    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(4096);
        self
    }

    /// Set the mmap threshold, or `None` to always stream.
    #[must_use]
    pub fn with_mmap_threshold(mut self, threshold: Option<u64>) -> Self {
        self.mmap_threshold = threshold;
        self
    }

    /// Set the shutdown flag, checked between buffer reads.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Hash the full content of a file.
    ///
    /// # Errors
    ///
    /// - `NotFound` / `PermissionDenied` / `Io` if the file cannot be read
    /// - `Interrupted` if the shutdown flag is raised mid-file
    pub fn full_hash(&self, path: &Path) -> Result<Hash, HashError> {
        let file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        let len = file
            .metadata()
            .map_err(|e| HashError::from_io(path, e))?
            .len();

        if self.mmap_threshold.is_some_and(|t| len >= t) {
            log::debug!(
                "Hashing large file via mmap ({} MB): {}",
                len / (1024 * 1024),
                path.display()
            );
            let mut hasher = blake3::Hasher::new();
            hasher
                .update_mmap_rayon(path)
                .map_err(|e| HashError::from_io(path, e))?;
            return Ok(*hasher.finalize().as_bytes());
        }

        self.hash_reader(file)
            .map_err(|e| HashError::from_io(path, e))
    }

    /// Hash everything readable from `reader`.
    ///
    /// # Errors
    ///
    /// Propagates read errors; returns `ErrorKind::Interrupted` if the
    /// shutdown flag is raised.
    pub fn hash_reader<R: Read>(&self, mut reader: R) -> io::Result<Hash> {
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; self.buffer_size];
        loop {
            if self.is_shutdown_requested() {
                return Err(io::Error::new(io::ErrorKind::Interrupted, "shutdown"));
            }
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted && !self.is_shutdown_requested() => {
                    continue
                }
                Err(e) => return Err(e),
            };
            hasher.update(&buffer[..n]);
        }
        Ok(*hasher.finalize().as_bytes())
    }

    /// Hash an in-memory byte slice.
    #[must_use]
    pub fn hash_bytes(&self, data: &[u8]) -> Hash {
        *blake3::hash(data).as_bytes()
    }
}

impl ContentHasher for Hasher {
    fn hash_file(&self, path: &Path) -> Result<Hash, HashError> {
        self.full_hash(path)
    }
}

/// Lower-case hex rendering of a digest.
#[must_use]
pub fn hash_to_hex(hash: &Hash) -> String {
    blake3::Hash::from(*hash).to_hex().to_string()
}

/// Parse a 64-character hex digest.
#[must_use]
pub fn hex_to_hash(hex: &str) -> Option<Hash> {
    blake3::Hash::from_hex(hex).ok().map(|h| *h.as_bytes())
}
