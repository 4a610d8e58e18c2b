//! Persisted duplicate group index.
//!
//! The index is an aggregate of `file_records` keyed by `(size, hash)`. Rows
//! exist only for keys with two or more members, and each row carries the
//! snapshot version it was written at.
//!
//! Two ways to maintain it:
//! - [`GroupIndex::rebuild_all`] recomputes every row in a single
//!   set-based statement and installs a new version.
//! - [`GroupIndex::refresh_one`] (or [`refresh_key`] inside a caller's
//!   transaction) recounts one key after a single file changed. It stamps
//!   the row with the installed version and never mints a new one.

use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::groups::DuplicateGroupRecord;
use crate::cache::database::{from_sql_int, to_sql_int};
use crate::cache::{CacheError, Store};
use crate::scanner::{hash_to_hex, hex_to_hash, Hash};

const INSTALLED_VERSION_KEY: &str = "installed_version";

/// Errors from the group index.
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    /// The store could not be accessed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A query failed.
    #[error("Index query failed: {0}")]
    Database(#[from] rusqlite::Error),

    /// The requested rebuild version does not advance the installed one.
    #[error("Index version {requested} is not newer than installed version {installed}")]
    StaleVersion {
        /// Version passed to the rebuild
        requested: u64,
        /// Version currently installed
        installed: u64,
    },
}

/// Handle to the persisted group index.
#[derive(Debug, Clone)]
pub struct GroupIndex {
    store: Arc<Store>,
}

impl GroupIndex {
    /// Create an index handle on a shared store.
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Version installed by the last bulk rebuild (0 before the first).
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn installed_version(&self) -> Result<u64, IndexError> {
        let conn = self.store.lock()?;
        Ok(installed_version(&conn)?)
    }

    /// Next version token for a rebuild (installed version + 1).
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn next_version(&self) -> Result<u64, IndexError> {
        Ok(self.installed_version()?.saturating_add(1))
    }

    /// Recompute every group and install `version`.
    ///
    /// Runs as one transaction, so readers see either the previous
    /// generation or the new one. Returns the number of groups written.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::StaleVersion`] if `version` is not greater than
    /// the installed version. Returns an error if any statement fails; the
    /// previous generation is left in place.
    pub fn rebuild_all(&self, version: u64) -> Result<usize, IndexError> {
        let conn = self.store.lock()?;
        let tx = conn.unchecked_transaction()?;

        let installed = installed_version(&tx)?;
        if version <= installed {
            return Err(IndexError::StaleVersion {
                requested: version,
                installed,
            });
        }

        tx.execute("DELETE FROM duplicate_groups", [])?;
        // total_bytes saturates at i64::MAX instead of overflowing to REAL.
        let written = tx.execute(
            "INSERT INTO duplicate_groups (size, hash, member_count, total_bytes, version)
             SELECT size, hash, COUNT(*),
                    CASE WHEN size > 0 AND COUNT(*) > 9223372036854775807 / size
                         THEN 9223372036854775807
                         ELSE COUNT(*) * size END,
                    ?1
             FROM file_records
             WHERE hash IS NOT NULL
             GROUP BY size, hash
             HAVING COUNT(*) >= 2",
            [to_sql_int(version)],
        )?;
        set_installed_version(&tx, version)?;
        tx.commit()?;

        log::info!("Rebuilt duplicate index: {} groups at version {}", written, version);
        Ok(written)
    }

    /// Recount one `(size, hash)` key in its own transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the recount fails.
    pub fn refresh_one(&self, size: u64, hash: &Hash) -> Result<(), IndexError> {
        let conn = self.store.lock()?;
        let tx = conn.unchecked_transaction()?;
        refresh_key(&tx, size, &hash_to_hex(hash))?;
        tx.commit()?;
        Ok(())
    }

    /// Fetch the row for one key.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, size: u64, hash: &Hash) -> Result<Option<DuplicateGroupRecord>, IndexError> {
        let conn = self.store.lock()?;
        let record = conn
            .prepare_cached(
                "SELECT size, hash, member_count, total_bytes, version
                 FROM duplicate_groups WHERE size = ?1 AND hash = ?2",
            )?
            .query_row(params![to_sql_int(size), hash_to_hex(hash)], group_from_row)
            .optional()?;
        Ok(record.flatten())
    }

    /// Number of rows in the index, across all versions.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn len(&self) -> Result<usize, IndexError> {
        let conn = self.store.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM duplicate_groups", [], |row| {
            row.get(0)
        })?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Check if the index has no rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn is_empty(&self) -> Result<bool, IndexError> {
        Ok(self.len()? == 0)
    }
}

/// Read the installed version on an existing connection or transaction.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn installed_version(conn: &Connection) -> rusqlite::Result<u64> {
    let value: Option<i64> = conn
        .query_row(
            "SELECT value FROM index_meta WHERE key = ?1",
            [INSTALLED_VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.map_or(0, from_sql_int))
}

fn set_installed_version(conn: &Connection, version: u64) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO index_meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![INSTALLED_VERSION_KEY, to_sql_int(version)],
    )?;
    Ok(())
}

/// Recount one key inside the caller's transaction.
///
/// Deletes the row when one or no members remain, otherwise replaces it
/// stamped with the installed version.
///
/// # Errors
///
/// Returns an error if any statement fails.
pub fn refresh_key(conn: &Connection, size: u64, hash_hex: &str) -> rusqlite::Result<()> {
    let size_sql = to_sql_int(size);
    let count: i64 = conn
        .prepare_cached("SELECT COUNT(*) FROM file_records WHERE size = ?1 AND hash = ?2")?
        .query_row(params![size_sql, hash_hex], |row| row.get(0))?;

    if count <= 1 {
        conn.prepare_cached("DELETE FROM duplicate_groups WHERE size = ?1 AND hash = ?2")?
            .execute(params![size_sql, hash_hex])?;
        log::debug!("Index key ({}, {}) dropped", size, hash_hex);
        return Ok(());
    }

    let version = installed_version(conn)?;
    let count = from_sql_int(count);
    conn.prepare_cached(
        "INSERT INTO duplicate_groups (size, hash, member_count, total_bytes, version)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(size, hash) DO UPDATE SET
            member_count = excluded.member_count,
            total_bytes = excluded.total_bytes,
            version = excluded.version",
    )?
    .execute(params![
        size_sql,
        hash_hex,
        to_sql_int(count),
        to_sql_int(count.saturating_mul(size)),
        to_sql_int(version),
    ])?;
    log::debug!("Index key ({}, {}) refreshed: {} members", size, hash_hex, count);
    Ok(())
}

/// Map a `size, hash, member_count, total_bytes, version` row.
///
/// Rows with a malformed hash map to `None`.
pub(crate) fn group_from_row(row: &Row<'_>) -> rusqlite::Result<Option<DuplicateGroupRecord>> {
    let hash_text: String = row.get(1)?;
    let Some(hash) = hex_to_hash(&hash_text) else {
        log::warn!("Ignoring index row with malformed hash: {}", hash_text);
        return Ok(None);
    };
    Ok(Some(DuplicateGroupRecord {
        size: from_sql_int(row.get(0)?),
        hash,
        member_count: from_sql_int(row.get(2)?),
        total_bytes: from_sql_int(row.get(3)?),
        version: from_sql_int(row.get(4)?),
    }))
}
