//! Persistent storage for file hashes, duplicate groups and trash records.
//!
//! # Architecture
//!
//! * [`database`]: SQLite store, schema management and connection sharing.
//! * [`entry`]: Data model for cached files and the freshness rules.
//! * [`freshness`]: The freshness cache (CRUD over `file_records`).
//!
//! # Cache Invalidation
//!
//! A cached hash is reused only when all of the following hold:
//! * A record exists for the canonical path (primary key)
//! * The file size is unchanged
//! * The modification time is unchanged (nanosecond precision)
//! * The record carries a computed hash
//!
//! Otherwise the entry is stale (or missing) and the file is re-hashed if it
//! is a duplicate candidate.

pub mod database;
pub mod entry;
pub mod freshness;

pub use database::{CacheError, CacheResult, Store};
pub use entry::{FileRecord, Freshness, HashState};
pub use freshness::FreshnessCache;
