//! Incremental scan engine.
//!
//! # Overview
//!
//! A scan runs three phases:
//! 1. **Collect** - walk every root and capture path, size and mtime
//! 2. **Detect** - drop repeated canonical paths, bucket files by size
//! 3. **Hash** - for size buckets with two or more members, reuse a FRESH
//!    cached hash or stream the file through the hasher
//!
//! Files alone in their size bucket are never hashed, so hash work is
//! bounded by the number of candidates rather than the number of files.
//! When the hash phase completes, every final record is written to the
//! freshness cache in one transaction.
//!
//! # Cancellation
//!
//! The shutdown flag is polled at every walked node and before every
//! candidate is hashed.
//! - Cancelled during collect or detect: empty result, nothing persisted.
//! - Cancelled during hash: the partial file list is returned with no
//!   duplicate groups, and nothing is persisted.
//!
//! # Example
//!
//! ```no_run
//! use dupevault::cache::{FreshnessCache, Store};
//! use dupevault::duplicates::{ScanConfig, ScanEngine};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! let store = Arc::new(Store::open_in_memory().unwrap());
//! let engine = ScanEngine::with_default_hasher(FreshnessCache::new(store), ScanConfig::default());
//!
//! let result = engine.scan(&[PathBuf::from(".")]).unwrap();
//! println!("Found {} duplicate groups", result.duplicate_groups.len());
//! ```

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytesize::ByteSize;
use chrono::{DateTime, Utc};
use rayon::prelude::*;

use super::groups::{dedupe_by_path, group_by_hash, group_by_size, DuplicateSet};
use crate::cache::{CacheError, FileRecord, Freshness, FreshnessCache, HashState};
use crate::progress::{ProgressCallback, PHASE_COLLECT, PHASE_HASH};
use crate::scanner::{
    path_utils, ContentHasher, FileEntry, Hash, HashError, Hasher, ScanError, Walker,
    WalkerConfig,
};

/// Configuration for a scan.
///
/// Every policy value is injected here; the engine reads no global state.
#[derive(Clone)]
pub struct ScanConfig {
    /// Number of I/O threads for parallel hashing.
    /// Default is 4 to prevent disk thrashing.
    pub io_threads: usize,
    /// Directory walker configuration.
    pub walker_config: WalkerConfig,
    /// Abort the scan on the first walk error instead of collecting it.
    pub strict: bool,
    /// Do not persist records for size-0 files.
    pub exclude_empty_from_cache: bool,
    /// Delete cached records under each root that the scan did not see.
    pub prune_vanished: bool,
    /// Optional shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for ScanConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanConfig")
            .field("io_threads", &self.io_threads)
            .field("walker_config", &self.walker_config)
            .field("strict", &self.strict)
            .field("exclude_empty_from_cache", &self.exclude_empty_from_cache)
            .field("prune_vanished", &self.prune_vanished)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            io_threads: 4,
            walker_config: WalkerConfig::default(),
            strict: false,
            exclude_empty_from_cache: true,
            prune_vanished: false,
            shutdown_flag: None,
            progress_callback: None,
        }
    }
}

impl ScanConfig {
    /// Set the number of hashing threads (at least 1).
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
        self
    }

    /// Set the walker configuration.
    #[must_use]
    pub fn with_walker_config(mut self, config: WalkerConfig) -> Self {
        self.walker_config = config;
        self
    }

    /// Enable strict mode.
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Exclude size-0 files from persistence.
    #[must_use]
    pub fn with_exclude_empty_from_cache(mut self, exclude: bool) -> Self {
        self.exclude_empty_from_cache = exclude;
        self
    }

    /// Prune cached records that vanished from the scanned roots.
    #[must_use]
    pub fn with_prune_vanished(mut self, prune: bool) -> Self {
        self.prune_vanished = prune;
        self
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Check if shutdown has been requested.
    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Summary statistics from a scan.
#[derive(Debug, Default)]
pub struct ScanSummary {
    /// Number of unique files collected
    pub total_files: usize,
    /// Total size of all collected files in bytes
    pub total_size: u64,
    /// Walk entries dropped because their canonical path repeated
    pub repeated_paths: usize,
    /// Files sharing their size with another file
    pub candidates: usize,
    /// Candidates hashed during this scan
    pub hashed_files: usize,
    /// Candidates whose cached hash was reused
    pub reused_hashes: usize,
    /// Candidates that could not be read
    pub failed_files: usize,
    /// Number of duplicate groups found
    pub duplicate_groups: usize,
    /// Redundant copies (files beyond the first in each group)
    pub duplicate_files: usize,
    /// Bytes reclaimable by keeping one copy per group
    pub reclaimable_space: u64,
    /// Cached records removed because their file vanished
    pub pruned_records: usize,
    /// Duration of the entire scan
    pub scan_duration: std::time::Duration,
    /// Whether the scan was cancelled
    pub interrupted: bool,
    /// Errors encountered during the scan
    pub scan_errors: Vec<ScanError>,
}

impl ScanSummary {
    /// Format reclaimable space as human-readable string.
    #[must_use]
    pub fn reclaimable_display(&self) -> String {
        ByteSize::b(self.reclaimable_space).to_string()
    }

    /// Format total size as human-readable string.
    #[must_use]
    pub fn total_size_display(&self) -> String {
        ByteSize::b(self.total_size).to_string()
    }

    /// Whether some files could not be processed.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.scan_errors.is_empty()
    }
}

/// Result of one scan.
#[derive(Debug)]
pub struct ScanResult {
    /// When the scan finished
    pub timestamp: DateTime<Utc>,
    /// Final record for every unique file, ordered by canonical path
    pub files: Vec<FileRecord>,
    /// Confirmed duplicate groups
    pub duplicate_groups: Vec<DuplicateSet>,
    /// Statistics
    pub summary: ScanSummary,
}

impl ScanResult {
    fn empty(summary: ScanSummary) -> Self {
        Self {
            timestamp: Utc::now(),
            files: Vec::new(),
            duplicate_groups: Vec::new(),
            summary,
        }
    }
}

/// Errors that can occur during a scan.
#[derive(thiserror::Error, Debug)]
pub enum FinderError {
    /// The provided path does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// The provided path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// A walk error occurred in strict mode.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// The freshness cache could not be read or written.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

enum HashOutcome {
    Hashed(Hash),
    Failed(HashError),
    Skipped,
}

/// Incremental duplicate scan engine.
pub struct ScanEngine {
    cache: FreshnessCache,
    hasher: Arc<dyn ContentHasher>,
    config: ScanConfig,
}

impl ScanEngine {
    /// Create an engine with an explicit hasher.
    #[must_use]
    pub fn new(cache: FreshnessCache, hasher: Arc<dyn ContentHasher>, config: ScanConfig) -> Self {
        Self {
            cache,
            hasher,
            config,
        }
    }

    /// Create an engine hashing with BLAKE3.
    #[must_use]
    pub fn with_default_hasher(cache: FreshnessCache, config: ScanConfig) -> Self {
        let mut hasher = Hasher::new();
        if let Some(ref flag) = config.shutdown_flag {
            hasher = hasher.with_shutdown_flag(Arc::clone(flag));
        }
        Self::new(cache, Arc::new(hasher), config)
    }

    /// The freshness cache this engine reads and writes.
    #[must_use]
    pub fn cache(&self) -> &FreshnessCache {
        &self.cache
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan `roots` for duplicates.
    ///
    /// # Errors
    ///
    /// Returns `FinderError` if:
    /// - A root does not exist or is not a directory (checked before any work)
    /// - A walk error occurs in strict mode
    /// - The freshness cache cannot be read or written
    ///
    /// Cancellation is not an error: the result carries
    /// `summary.interrupted = true`.
    pub fn scan(&self, roots: &[PathBuf]) -> Result<ScanResult, FinderError> {
        let start_time = Instant::now();
        let mut summary = ScanSummary::default();

        for root in roots {
            if !root.exists() {
                return Err(FinderError::PathNotFound(root.clone()));
            }
            if !root.is_dir() {
                return Err(FinderError::NotADirectory(root.clone()));
            }
        }

        log::info!("Starting scan of {} root(s)", roots.len());

        // Collect
        let Some(entries) = self.collect(roots, &mut summary)? else {
            log::info!("Collect: Interrupted by shutdown signal");
            summary.interrupted = true;
            summary.scan_duration = start_time.elapsed();
            return Ok(ScanResult::empty(summary));
        };

        // Detect
        let (unique, repeated) = dedupe_by_path(entries);
        summary.repeated_paths = repeated;
        let (buckets, stats) = group_by_size(unique);
        summary.total_files = stats.total_files;
        summary.total_size = stats.total_size;
        summary.candidates = stats.candidates;

        if self.config.is_shutdown_requested() {
            log::info!("Detect: Interrupted by shutdown signal");
            summary.interrupted = true;
            summary.scan_duration = start_time.elapsed();
            return Ok(ScanResult::empty(summary));
        }

        let mut records = Vec::with_capacity(summary.total_files);
        let mut is_candidate = Vec::with_capacity(summary.total_files);
        for files in buckets.into_values() {
            let candidate = files.len() > 1;
            for file in files {
                let state = if candidate {
                    HashState::Pending
                } else {
                    HashState::NotNeeded
                };
                records.push(FileRecord::from_entry(&file, state));
                is_candidate.push(candidate);
            }
        }

        // Hash
        let completed = self.hash_candidates(&mut records, &is_candidate, &mut summary)?;

        records.sort_by(|a, b| a.key.cmp(&b.key));

        if !completed {
            log::info!("Hash: Interrupted by shutdown signal, skipping persistence");
            summary.interrupted = true;
            summary.scan_duration = start_time.elapsed();
            return Ok(ScanResult {
                timestamp: Utc::now(),
                files: records,
                duplicate_groups: Vec::new(),
                summary,
            });
        }

        self.persist(roots, &records, &mut summary)?;

        let duplicate_groups = group_by_hash(&records);
        summary.duplicate_groups = duplicate_groups.len();
        summary.duplicate_files = duplicate_groups.iter().map(DuplicateSet::duplicate_count).sum();
        summary.reclaimable_space = duplicate_groups.iter().map(DuplicateSet::wasted_space).sum();
        summary.scan_duration = start_time.elapsed();

        log::info!(
            "Scan complete: {} files, {} groups, {} reclaimable in {:.2?}",
            summary.total_files,
            summary.duplicate_groups,
            summary.reclaimable_display(),
            summary.scan_duration
        );

        Ok(ScanResult {
            timestamp: Utc::now(),
            files: records,
            duplicate_groups,
            summary,
        })
    }

    /// Walk every root. Returns `None` if cancelled.
    fn collect(
        &self,
        roots: &[PathBuf],
        summary: &mut ScanSummary,
    ) -> Result<Option<Vec<FileEntry>>, FinderError> {
        if self.config.is_shutdown_requested() {
            return Ok(None);
        }
        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start(PHASE_COLLECT, 0);
        }

        let mut entries = Vec::new();
        for root in roots {
            if let Some(ref callback) = self.config.progress_callback {
                callback.on_message(&format!("Walking {}", root.display()));
            }
            let mut walker = Walker::new(root, self.config.walker_config.clone());
            if let Some(ref flag) = self.config.shutdown_flag {
                walker = walker.with_shutdown_flag(Arc::clone(flag));
            }

            let mut iter = walker.walk();
            for result in iter.by_ref() {
                match result {
                    Ok(entry) => {
                        if let Some(ref callback) = self.config.progress_callback {
                            callback.on_progress(
                                entries.len() + 1,
                                entry.path.to_string_lossy().as_ref(),
                            );
                        }
                        entries.push(entry);
                    }
                    Err(e) if self.config.strict => return Err(FinderError::Scan(e)),
                    Err(e) => summary.scan_errors.push(e),
                }
            }
            if iter.was_interrupted() {
                return Ok(None);
            }
        }

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end(PHASE_COLLECT);
        }
        log::info!("Collect complete: {} entries", entries.len());
        Ok(Some(entries))
    }

    /// Fill in hash states. Returns `false` if cancelled.
    fn hash_candidates(
        &self,
        records: &mut [FileRecord],
        is_candidate: &[bool],
        summary: &mut ScanSummary,
    ) -> Result<bool, FinderError> {
        let lookups = self.cache.lookup_many(records)?;

        let mut to_hash = Vec::new();
        for (idx, (freshness, cached)) in lookups.into_iter().enumerate() {
            let cached_hash = match freshness {
                Freshness::Fresh => cached.and_then(|c| c.digest().copied()),
                Freshness::Stale | Freshness::Miss => None,
            };
            match (is_candidate[idx], cached_hash) {
                (true, Some(hash)) => {
                    log::trace!("Reusing cached hash: {}", records[idx].key);
                    records[idx].hash = HashState::Computed(hash);
                    summary.reused_hashes += 1;
                }
                (true, None) => to_hash.push(idx),
                // A fresh hash on a singleton is kept without rehashing.
                (false, Some(hash)) => records[idx].hash = HashState::Computed(hash),
                (false, None) => {}
            }
        }

        if to_hash.is_empty() {
            log::info!(
                "Hash: nothing to hash ({} cached hashes reused)",
                summary.reused_hashes
            );
            return Ok(!self.config.is_shutdown_requested());
        }

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start(PHASE_HASH, to_hash.len());
        }
        log::info!(
            "Hash: computing {} hashes ({} reused) on {} threads",
            to_hash.len(),
            summary.reused_hashes,
            self.config.io_threads
        );

        let jobs: Vec<(usize, PathBuf, u64)> = to_hash
            .iter()
            .map(|&idx| (idx, records[idx].original_path.clone(), records[idx].size))
            .collect();
        let done = AtomicUsize::new(0);

        let run = || -> Vec<(usize, HashOutcome)> {
            jobs.par_iter()
                .map(|(idx, path, size)| {
                    if self.config.is_shutdown_requested() {
                        return (*idx, HashOutcome::Skipped);
                    }
                    let outcome = match self.hasher.hash_file(path) {
                        Ok(hash) => HashOutcome::Hashed(hash),
                        Err(HashError::Interrupted(_)) => HashOutcome::Skipped,
                        Err(e) => {
                            log::warn!("Skipping unreadable file {}: {}", path.display(), e);
                            HashOutcome::Failed(e)
                        }
                    };
                    if let Some(ref callback) = self.config.progress_callback {
                        let current = done.fetch_add(1, Ordering::Relaxed) + 1;
                        callback.on_progress(current, path.to_string_lossy().as_ref());
                        callback.on_item_completed(*size);
                    }
                    (*idx, outcome)
                })
                .collect()
        };

        // Bounded pool to limit concurrent disk reads.
        let outcomes = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.io_threads.max(1))
            .build()
        {
            Ok(pool) => pool.install(run),
            Err(e) => {
                log::warn!("Failed to create hashing thread pool, using global pool: {}", e);
                run()
            }
        };

        let mut completed = true;
        for (idx, outcome) in outcomes {
            match outcome {
                HashOutcome::Hashed(hash) => {
                    records[idx].hash = HashState::Computed(hash);
                    summary.hashed_files += 1;
                }
                HashOutcome::Failed(e) => {
                    records[idx].hash = HashState::NotNeeded;
                    summary.failed_files += 1;
                    summary.scan_errors.push(ScanError::Hash(e));
                }
                HashOutcome::Skipped => completed = false,
            }
        }

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end(PHASE_HASH);
        }

        Ok(completed && !self.config.is_shutdown_requested())
    }

    fn persist(
        &self,
        roots: &[PathBuf],
        records: &[FileRecord],
        summary: &mut ScanSummary,
    ) -> Result<(), FinderError> {
        let to_persist: Vec<FileRecord> = records
            .iter()
            .filter(|r| !(self.config.exclude_empty_from_cache && r.size == 0))
            .cloned()
            .collect();
        self.cache.upsert_all(&to_persist)?;

        if self.config.prune_vanished {
            let seen: HashSet<String> = to_persist.iter().map(|r| r.key.clone()).collect();
            for root in roots {
                let root_key = path_utils::absolute_key(root);
                summary.pruned_records += self.cache.prune_missing(&root_key, &seen)?;
            }
        }
        Ok(())
    }
}
