//! Snapshot-consistent paging over the group index.
//!
//! A reader calls [`SnapshotPager::begin`] once to pin the installed
//! version, then fetches pages at that version. Every page is ordered by a
//! total order ending in `(size, hash)`, so concatenating pages of any size
//! yields exactly the rows of one full-width fetch: no gaps, no repeats.
//!
//! If a bulk rebuild installs a new version while a reader is paging, the
//! next page fails with [`PagerError::SnapshotExpired`] and the reader has
//! to begin again. A reader never sees rows from two generations.

use std::sync::Arc;

use rusqlite::params;

use super::groups::DuplicateGroupRecord;
use super::index::{group_from_row, installed_version};
use crate::cache::database::{from_sql_int, to_sql_int};
use crate::cache::{CacheError, Store};

/// Column a page is sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    /// Number of members
    #[default]
    Count,
    /// Total bytes across members
    TotalBytes,
    /// Size of one member
    Size,
}

/// Sort direction, applied to every column of the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Smallest first
    Ascending,
    /// Largest first
    #[default]
    Descending,
}

impl SortKey {
    fn columns(self) -> &'static [&'static str] {
        match self {
            Self::Count => &["member_count", "total_bytes", "size", "hash"],
            Self::TotalBytes => &["total_bytes", "member_count", "size", "hash"],
            Self::Size => &["size", "member_count", "hash"],
        }
    }

    fn order_by(self, direction: SortDirection) -> String {
        let dir = match direction {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        };
        self.columns()
            .iter()
            .map(|col| format!("{col} {dir}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// One page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Sort column
    pub sort: SortKey,
    /// Sort direction
    pub direction: SortDirection,
    /// Rows to skip
    pub offset: usize,
    /// Maximum rows to return
    pub limit: usize,
}

impl PageRequest {
    /// First page of `limit` rows, largest member count first.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            sort: SortKey::default(),
            direction: SortDirection::default(),
            offset: 0,
            limit,
        }
    }

    /// Set the sort column and direction.
    #[must_use]
    pub fn sorted_by(mut self, sort: SortKey, direction: SortDirection) -> Self {
        self.sort = sort;
        self.direction = direction;
        self
    }

    /// Set the offset.
    #[must_use]
    pub fn at(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// Version and row count captured by [`SnapshotPager::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSession {
    /// Pinned version
    pub version: u64,
    /// Rows visible at that version
    pub total: usize,
}

/// Errors from the pager.
#[derive(thiserror::Error, Debug)]
pub enum PagerError {
    /// A rebuild replaced the pinned version.
    #[error("Snapshot version {pinned} expired (installed version is {installed})")]
    SnapshotExpired {
        /// Version the reader pinned
        pinned: u64,
        /// Version now installed
        installed: u64,
    },

    /// The store could not be accessed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A query failed.
    #[error("Page query failed: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Pager over the persisted group index.
#[derive(Debug, Clone)]
pub struct SnapshotPager {
    store: Arc<Store>,
    hide_empty: bool,
}

impl SnapshotPager {
    /// Create a pager on a shared store.
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            hide_empty: false,
        }
    }

    /// Exclude groups of size-0 files from totals and pages.
    #[must_use]
    pub fn with_hide_empty(mut self, hide: bool) -> Self {
        self.hide_empty = hide;
        self
    }

    fn size_filter(&self) -> &'static str {
        if self.hide_empty {
            " AND size > 0"
        } else {
            ""
        }
    }

    /// Pin the installed version and count its rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the read transaction fails.
    pub fn begin(&self) -> Result<PageSession, PagerError> {
        let conn = self.store.lock()?;
        let tx = conn.unchecked_transaction()?;
        let version = installed_version(&tx)?;
        let sql = format!(
            "SELECT COUNT(*) FROM duplicate_groups WHERE version = ?1{}",
            self.size_filter()
        );
        let total: i64 = tx.query_row(&sql, [to_sql_int(version)], |row| row.get(0))?;
        tx.commit()?;

        let total = usize::try_from(from_sql_int(total)).unwrap_or(usize::MAX);
        log::debug!("Page session at version {}: {} groups", version, total);
        Ok(PageSession { version, total })
    }

    /// Fetch one page at a pinned version.
    ///
    /// # Errors
    ///
    /// Returns [`PagerError::SnapshotExpired`] if `version` is no longer
    /// installed, or a database error.
    pub fn page(
        &self,
        version: u64,
        request: PageRequest,
    ) -> Result<Vec<DuplicateGroupRecord>, PagerError> {
        let conn = self.store.lock()?;
        let tx = conn.unchecked_transaction()?;

        let installed = installed_version(&tx)?;
        if installed != version {
            log::debug!("Snapshot {} expired, installed is {}", version, installed);
            return Err(PagerError::SnapshotExpired {
                pinned: version,
                installed,
            });
        }
        if request.limit == 0 {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT size, hash, member_count, total_bytes, version
             FROM duplicate_groups
             WHERE version = ?1{}
             ORDER BY {}
             LIMIT ?2 OFFSET ?3",
            self.size_filter(),
            request.sort.order_by(request.direction)
        );
        let rows = {
            let mut stmt = tx.prepare_cached(&sql)?;
            let mapped = stmt.query_map(
                params![
                    to_sql_int(version),
                    to_sql_int(request.limit as u64),
                    to_sql_int(request.offset as u64),
                ],
                group_from_row,
            )?;
            let rows = mapped
                .filter_map(|row| row.transpose())
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        tx.commit()?;
        Ok(rows)
    }
}
