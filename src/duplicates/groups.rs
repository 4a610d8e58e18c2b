//! Duplicate grouping and size-based file organization.
//!
//! # Overview
//!
//! This module holds the in-memory steps of duplicate detection:
//!
//! - Deduplicating walk output by canonical path
//! - Bucketing files by exact size (files of different sizes cannot be
//!   duplicates, so only buckets with two or more members need hashing)
//! - Grouping hashed records into confirmed duplicate sets
//!
//! It also defines [`DuplicateGroupRecord`], the persisted row of the
//! duplicate group index.
//!
//! # Example
//!
//! ```
//! use dupevault::scanner::FileEntry;
//! use dupevault::duplicates::group_by_size;
//! use std::path::PathBuf;
//! use std::time::SystemTime;
//!
//! let files = vec![
//!     FileEntry::new(PathBuf::from("/file1.txt"), 1024, SystemTime::now()),
//!     FileEntry::new(PathBuf::from("/file2.txt"), 1024, SystemTime::now()),
//!     FileEntry::new(PathBuf::from("/file3.txt"), 2048, SystemTime::now()),
//! ];
//!
//! let (buckets, stats) = group_by_size(files);
//!
//! assert_eq!(buckets.len(), 2);
//! assert_eq!(stats.total_files, 3);
//! assert_eq!(stats.candidates, 2);  // Two 1024-byte files
//! ```

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use crate::cache::FileRecord;
use crate::scanner::{hash_to_hex, FileEntry, Hash};

/// Confirmed set of files sharing size and content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateSet {
    /// Size of every member in bytes
    pub size: u64,
    /// BLAKE3 content hash shared by every member
    pub hash: Hash,
    /// Member records, ordered by canonical path
    pub files: Vec<FileRecord>,
}

impl DuplicateSet {
    /// Number of files in this set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if this set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Total bytes of all members.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.size.saturating_mul(self.files.len() as u64)
    }

    /// Bytes reclaimable by keeping one copy.
    #[must_use]
    pub fn wasted_space(&self) -> u64 {
        self.size
            .saturating_mul(self.files.len().saturating_sub(1) as u64)
    }

    /// Number of redundant copies (total - 1 original).
    #[must_use]
    pub fn duplicate_count(&self) -> usize {
        self.files.len().saturating_sub(1)
    }

    /// Hash as hexadecimal string.
    #[must_use]
    pub fn hash_hex(&self) -> String {
        hash_to_hex(&self.hash)
    }

    /// Original paths of the members.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.original_path.clone()).collect()
    }
}

/// One row of the persisted duplicate group index.
///
/// Exists only while `member_count >= 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateGroupRecord {
    /// Size of each member in bytes
    pub size: u64,
    /// Shared content hash
    pub hash: Hash,
    /// Number of files with this (size, hash)
    pub member_count: u64,
    /// `member_count * size`
    pub total_bytes: u64,
    /// Snapshot version the row was last written at
    pub version: u64,
}

impl DuplicateGroupRecord {
    /// Hash as hexadecimal string.
    #[must_use]
    pub fn hash_hex(&self) -> String {
        hash_to_hex(&self.hash)
    }

    /// Bytes reclaimable by keeping one copy.
    #[must_use]
    pub fn wasted_space(&self) -> u64 {
        self.size.saturating_mul(self.member_count.saturating_sub(1))
    }
}

/// Statistics from the detect phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupingStats {
    /// Total number of unique files
    pub total_files: usize,
    /// Total size of all files in bytes
    pub total_size: u64,
    /// Number of distinct file sizes
    pub unique_sizes: usize,
    /// Files sharing their size with at least one other file
    pub candidates: usize,
    /// Files alone in their size bucket (never hashed)
    pub singletons: usize,
    /// Number of size-0 files
    pub empty_files: usize,
}

impl GroupingStats {
    /// Percentage of files eliminated by size grouping.
    #[must_use]
    pub fn elimination_rate(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            (self.singletons as f64 / self.total_files as f64) * 100.0
        }
    }
}

/// Drop repeated canonical paths, keeping the first occurrence.
///
/// Returns the unique entries in input order and the number dropped.
#[must_use]
pub fn dedupe_by_path(files: impl IntoIterator<Item = FileEntry>) -> (Vec<FileEntry>, usize) {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    let mut dropped = 0;

    for file in files {
        let key = file.canonical_key();
        if seen.insert(key) {
            unique.push(file);
        } else {
            log::debug!("Duplicate walk entry ignored: {}", file.path.display());
            dropped += 1;
        }
    }

    (unique, dropped)
}

/// Bucket files by exact size.
///
/// Every bucket is returned, singletons included; buckets with two or more
/// members are the candidates for hashing.
///
/// # Example
///
/// ```
/// use dupevault::scanner::FileEntry;
/// use dupevault::duplicates::group_by_size;
/// use std::path::PathBuf;
/// use std::time::SystemTime;
///
/// let files = vec![
///     FileEntry::new(PathBuf::from("/a.txt"), 100, SystemTime::now()),
///     FileEntry::new(PathBuf::from("/b.txt"), 100, SystemTime::now()),
///     FileEntry::new(PathBuf::from("/c.txt"), 200, SystemTime::now()),
/// ];
///
/// let (buckets, stats) = group_by_size(files);
///
/// assert_eq!(buckets[&100].len(), 2);
/// assert_eq!(buckets[&200].len(), 1);
/// assert_eq!(stats.singletons, 1);
/// ```
#[must_use]
pub fn group_by_size(
    files: impl IntoIterator<Item = FileEntry>,
) -> (HashMap<u64, Vec<FileEntry>>, GroupingStats) {
    let mut buckets: HashMap<u64, Vec<FileEntry>> = HashMap::new();
    let mut stats = GroupingStats::default();

    for file in files {
        stats.total_files += 1;
        stats.total_size += file.size;
        if file.size == 0 {
            stats.empty_files += 1;
        }
        buckets.entry(file.size).or_default().push(file);
    }

    stats.unique_sizes = buckets.len();
    for (size, files) in &buckets {
        if files.len() > 1 {
            stats.candidates += files.len();
            log::trace!("Size bucket {} bytes: {} candidates", size, files.len());
        } else {
            stats.singletons += 1;
        }
    }

    log::info!(
        "Detect complete: {} files → {} candidates ({:.1}% eliminated)",
        stats.total_files,
        stats.candidates,
        stats.elimination_rate()
    );

    (buckets, stats)
}

/// Group records with a computed hash by (size, hash), keeping sets of
/// two or more.
///
/// Sets are ordered by wasted space (largest first), then size and hash.
#[must_use]
pub fn group_by_hash<'a>(records: impl IntoIterator<Item = &'a FileRecord>) -> Vec<DuplicateSet> {
    let mut by_key: HashMap<(u64, Hash), Vec<FileRecord>> = HashMap::new();
    for record in records {
        if let Some(hash) = record.digest() {
            by_key
                .entry((record.size, *hash))
                .or_default()
                .push(record.clone());
        }
    }

    let mut sets: Vec<DuplicateSet> = by_key
        .into_iter()
        .filter(|(_, files)| files.len() > 1)
        .map(|((size, hash), mut files)| {
            files.sort_by(|a, b| a.key.cmp(&b.key));
            DuplicateSet { size, hash, files }
        })
        .collect();

    sets.sort_by(|a, b| {
        b.wasted_space()
            .cmp(&a.wasted_space())
            .then(a.size.cmp(&b.size))
            .then(a.hash.cmp(&b.hash))
    });
    sets
}
