//! Duplicate detection module.
//!
//! This module provides functionality for:
//! - Size-based candidate detection ([`groups`])
//! - The incremental scan engine ([`finder`])
//! - The persisted duplicate group index ([`index`])
//! - Snapshot-consistent paging over the index ([`pager`])

pub mod finder;
pub mod groups;
pub mod index;
pub mod pager;

pub use finder::{FinderError, ScanConfig, ScanEngine, ScanResult, ScanSummary};
pub use groups::{
    dedupe_by_path, group_by_hash, group_by_size, DuplicateGroupRecord, DuplicateSet,
    GroupingStats,
};
pub use index::{refresh_key, GroupIndex, IndexError};
pub use pager::{PageRequest, PageSession, PagerError, SnapshotPager, SortDirection, SortKey};
