//! Cache entry definitions.
//!
//! A [`FileRecord`] is the unit stored by the freshness cache: one row per
//! canonical path, holding the last-known size, modification time and hash
//! state of that file.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::scanner::{path_utils, FileEntry, Hash};

/// Hash state of a file record.
///
/// Only `Computed` is persisted as a hash value; the other two states load
/// back as `NotNeeded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashState {
    /// No hash has been computed (singleton size, unreadable, or trimmed).
    #[default]
    NotNeeded,
    /// The file is a candidate and is waiting to be hashed.
    Pending,
    /// The content hash is known.
    Computed(Hash),
}

impl HashState {
    /// The digest, if computed.
    #[must_use]
    pub fn digest(&self) -> Option<&Hash> {
        match self {
            Self::Computed(hash) => Some(hash),
            Self::NotNeeded | Self::Pending => None,
        }
    }

    /// Whether a digest is present.
    #[must_use]
    pub fn is_computed(&self) -> bool {
        matches!(self, Self::Computed(_))
    }
}

impl From<Option<Hash>> for HashState {
    fn from(hash: Option<Hash>) -> Self {
        hash.map_or(Self::NotNeeded, Self::Computed)
    }
}

/// Persisted metadata for one file, keyed by canonical path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Canonical path (cache key)
    pub key: String,
    /// Path as it was seen on disk
    pub original_path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
    /// Hash state
    pub hash: HashState,
}

impl FileRecord {
    /// Create a record for `path`, deriving the canonical key.
    #[must_use]
    pub fn new(path: &Path, size: u64, modified: SystemTime, hash: HashState) -> Self {
        Self {
            key: path_utils::absolute_key(path),
            original_path: path.to_path_buf(),
            size,
            modified,
            hash,
        }
    }

    /// Create a record from walk output with the given hash state.
    #[must_use]
    pub fn from_entry(entry: &FileEntry, hash: HashState) -> Self {
        Self::new(&entry.path, entry.size, entry.modified, hash)
    }

    /// Replace the hash state.
    #[must_use]
    pub fn with_hash(mut self, hash: HashState) -> Self {
        self.hash = hash;
        self
    }

    /// The digest, if computed.
    #[must_use]
    pub fn digest(&self) -> Option<&Hash> {
        self.hash.digest()
    }

    /// Modification time as nanoseconds relative to the Unix epoch.
    #[must_use]
    pub fn mtime_nanos(&self) -> i64 {
        system_time_to_nanos(self.modified)
    }
}

/// Freshness classification of a candidate against the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// No record exists for the path.
    Miss,
    /// A record exists but its size, mtime or hash does not qualify.
    Stale,
    /// The cached hash can be reused.
    Fresh,
}

impl Freshness {
    /// Classify `candidate` against the cached record for its path.
    ///
    /// FRESH requires equal size, equal mtime and a computed hash.
    #[must_use]
    pub fn classify(candidate: &FileRecord, cached: Option<&FileRecord>) -> Self {
        match cached {
            None => Self::Miss,
            Some(cached)
                if cached.size == candidate.size
                    && cached.mtime_nanos() == candidate.mtime_nanos()
                    && cached.hash.is_computed() =>
            {
                Self::Fresh
            }
            Some(_) => Self::Stale,
        }
    }
}

/// Convert a timestamp to signed nanoseconds since the Unix epoch.
///
/// Values beyond the `i64` range saturate.
#[must_use]
pub fn system_time_to_nanos(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_nanos()).unwrap_or(i64::MAX),
        Err(before) => i64::try_from(before.duration().as_nanos()).map_or(i64::MIN, |n| -n),
    }
}

/// Inverse of [`system_time_to_nanos`].
#[must_use]
pub fn nanos_to_system_time(nanos: i64) -> SystemTime {
    if nanos >= 0 {
        UNIX_EPOCH + Duration::from_nanos(nanos.unsigned_abs())
    } else {
        UNIX_EPOCH - Duration::from_nanos(nanos.unsigned_abs())
    }
}
