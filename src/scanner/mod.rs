//! Scanner module for directory traversal and file hashing.
//!
//! This module provides the leaf collaborators of the scan engine:
//! - Explicit-stack directory walking with cooperative cancellation
//! - Content hashing with BLAKE3
//! - Canonical path keys (Unicode and separator normalization)
//! - Volume root resolution for the trash vault
//!
//! # Architecture
//!
//! - [`walker`]: Directory traversal and file discovery
//! - [`hasher`]: BLAKE3 file hashing (streaming)
//! - [`path_utils`]: Canonical path keys
//! - [`volume`]: Storage volume root resolution
//!
//! # Example
//!
//! ```no_run
//! use dupevault::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let config = WalkerConfig {
//!     skip_hidden: true,
//!     ..Default::default()
//! };
//!
//! let walker = Walker::new(Path::new("."), config);
//! for entry in walker.walk() {
//!     match entry {
//!         Ok(file) => println!("{}: {} bytes", file.path.display(), file.size),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

pub mod hasher;
pub mod path_utils;
pub mod volume;
pub mod walker;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

pub use hasher::{hash_to_hex, hex_to_hash, ContentHasher, Hash, Hasher};
pub use volume::{DeviceBoundaryResolver, FixedRootsResolver, VolumeResolver};
pub use walker::Walker;

/// Raw metadata for a discovered file.
///
/// Collected during the walk, before any hashing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path as produced by the walk
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
}

impl FileEntry {
    /// Create a new FileEntry.
    #[must_use]
    pub fn new(path: PathBuf, size: u64, modified: SystemTime) -> Self {
        Self {
            path,
            size,
            modified,
        }
    }

    /// Canonical cache key of this entry's path.
    #[must_use]
    pub fn canonical_key(&self) -> String {
        path_utils::absolute_key(&self.path)
    }
}

/// Caller-supplied ignore predicate: `(path, is_dir) -> ignore?`.
pub type IgnorePredicate = Arc<dyn Fn(&Path, bool) -> bool + Send + Sync>;

/// Configuration for directory walking.
#[derive(Clone, Default)]
pub struct WalkerConfig {
    /// Follow symbolic links to files. Symlinked directories are never
    /// descended into.
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (names starting with `.`).
    pub skip_hidden: bool,

    /// Glob patterns to ignore (gitignore-style).
    /// These are applied in addition to any root `.gitignore` file.
    pub ignore_patterns: Vec<String>,

    /// Directory names never descended into (the trash directory, for one).
    pub excluded_dir_names: Vec<String>,

    /// Optional caller predicate, consulted for every directory and file.
    pub ignore: Option<IgnorePredicate>,
}

impl fmt::Debug for WalkerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalkerConfig")
            .field("follow_symlinks", &self.follow_symlinks)
            .field("skip_hidden", &self.skip_hidden)
            .field("ignore_patterns", &self.ignore_patterns)
            .field("excluded_dir_names", &self.excluded_dir_names)
            .field("ignore", &self.ignore.as_ref().map(|_| "<predicate>"))
            .finish()
    }
}

impl WalkerConfig {
    /// Set the ignore patterns.
    #[must_use]
    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// Set the caller ignore predicate.
    #[must_use]
    pub fn with_ignore<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Path, bool) -> bool + Send + Sync + 'static,
    {
        self.ignore = Some(Arc::new(predicate));
        self
    }

    /// Add a directory name that is never descended into.
    #[must_use]
    pub fn with_excluded_dir_name(mut self, name: impl Into<String>) -> Self {
        self.excluded_dir_names.push(name.into());
        self
    }

    /// Skip hidden entries.
    #[must_use]
    pub fn with_skip_hidden(mut self, skip: bool) -> Self {
        self.skip_hidden = skip;
        self
    }
}

/// Errors that can occur during directory scanning.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The specified path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A file could not be hashed.
    #[error(transparent)]
    Hash(#[from] HashError),
}

impl ScanError {
    /// Classify an I/O error for `path`.
    #[must_use]
    pub fn from_io(path: &Path, error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }
}

/// Errors that can occur during file hashing.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Hashing stopped because shutdown was requested.
    #[error("Hashing interrupted: {0}")]
    Interrupted(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl HashError {
    /// Classify an I/O error for `path`.
    #[must_use]
    pub fn from_io(path: &Path, error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            std::io::ErrorKind::Interrupted => Self::Interrupted(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }

    /// The path this error concerns.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(p) | Self::PermissionDenied(p) | Self::Interrupted(p) => p,
            Self::Io { path, .. } => path,
        }
    }
}
