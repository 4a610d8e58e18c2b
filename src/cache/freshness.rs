//! Freshness cache over the `file_records` table.
//!
//! Decides whether a previously computed hash may be reused for a file seen
//! in a new scan. Records are replaced, never merged.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension, Row, Statement};

use super::database::{from_sql_int, to_sql_int, CacheResult, Store};
use super::entry::{nanos_to_system_time, FileRecord, Freshness, HashState};
use crate::scanner::{hash_to_hex, hex_to_hash, path_utils};

const SELECT_RECORD: &str =
    "SELECT path, original_path, size, mtime_ns, hash FROM file_records WHERE path = ?1";

const UPSERT_RECORD: &str = "INSERT INTO file_records (path, original_path, size, mtime_ns, hash)
     VALUES (?1, ?2, ?3, ?4, ?5)
     ON CONFLICT(path) DO UPDATE SET
        original_path = excluded.original_path,
        size = excluded.size,
        mtime_ns = excluded.mtime_ns,
        hash = excluded.hash";

/// Persisted map from canonical path to last-known size, mtime and hash.
#[derive(Debug, Clone)]
pub struct FreshnessCache {
    store: Arc<Store>,
}

impl FreshnessCache {
    /// Wrap a shared store.
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Classify `candidate` and return the cached record, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn lookup(&self, candidate: &FileRecord) -> CacheResult<(Freshness, Option<FileRecord>)> {
        let conn = self.store.lock()?;
        let cached = get_record(&conn, &candidate.key)?;
        let freshness = Freshness::classify(candidate, cached.as_ref());
        log::trace!("Cache {:?}: {}", freshness, candidate.key);
        Ok((freshness, cached))
    }

    /// Classify a batch of candidates inside one read transaction.
    ///
    /// Results are returned in input order.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction or any query fails.
    pub fn lookup_many(
        &self,
        candidates: &[FileRecord],
    ) -> CacheResult<Vec<(Freshness, Option<FileRecord>)>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.store.lock()?;
        let tx = conn.unchecked_transaction()?;
        let mut results = Vec::with_capacity(candidates.len());
        {
            let mut stmt = tx.prepare_cached(SELECT_RECORD)?;
            for candidate in candidates {
                let cached = stmt
                    .query_row([&candidate.key], record_from_row)
                    .optional()?;
                let freshness = Freshness::classify(candidate, cached.as_ref());
                results.push((freshness, cached));
            }
        }
        tx.commit()?;
        Ok(results)
    }

    /// Fetch the record for a path key.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, key: &str) -> CacheResult<Option<FileRecord>> {
        let conn = self.store.lock()?;
        Ok(get_record(&conn, key)?)
    }

    /// Replace the record for its path.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn upsert(&self, record: &FileRecord) -> CacheResult<()> {
        let conn = self.store.lock()?;
        upsert_record(&conn, record)?;
        Ok(())
    }

    /// Replace every record in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; nothing is written then.
    pub fn upsert_all(&self, records: &[FileRecord]) -> CacheResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let conn = self.store.lock()?;
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(UPSERT_RECORD)?;
            for record in records {
                execute_upsert(&mut stmt, record)?;
            }
        }
        tx.commit()?;
        log::debug!("Persisted {} file records", records.len());
        Ok(())
    }

    /// Remove the record for a path key. Returns whether a row existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn remove(&self, key: &str) -> CacheResult<bool> {
        let conn = self.store.lock()?;
        Ok(delete_record(&conn, key)?)
    }

    /// Number of records.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn len(&self) -> CacheResult<usize> {
        let conn = self.store.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM file_records", [], |r| r.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Whether the cache holds no records.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Delete every record.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn clear(&self) -> CacheResult<usize> {
        let conn = self.store.lock()?;
        let removed = conn.execute("DELETE FROM file_records", [])?;
        log::info!("Cleared {} file records", removed);
        Ok(removed)
    }

    /// Delete records at or below `root_key` whose key is not in `seen`.
    ///
    /// Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub fn prune_missing(&self, root_key: &str, seen: &HashSet<String>) -> CacheResult<usize> {
        let conn = self.store.lock()?;
        let tx = conn.unchecked_transaction()?;

        // Keys strictly below `root` sort between "root/" and "root0".
        let prefix = if root_key.ends_with('/') {
            root_key.to_string()
        } else {
            format!("{root_key}/")
        };
        let upper = format!("{}0", &prefix[..prefix.len() - 1]);

        let vanished: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT path FROM file_records
                 WHERE path = ?1 OR (path >= ?2 AND path < ?3)",
            )?;
            let keys = stmt
                .query_map(params![root_key, prefix, upper], |row| {
                    row.get::<_, String>(0)
                })?
                .collect::<Result<Vec<String>, _>>()?;
            keys.into_iter()
                .filter(|key| {
                    path_utils::key_is_under(key, root_key) && !seen.contains(key)
                })
                .collect()
        };

        let mut removed = 0;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM file_records WHERE path = ?1")?;
            for key in &vanished {
                removed += stmt.execute([key])?;
            }
        }
        tx.commit()?;

        if removed > 0 {
            log::info!("Pruned {} vanished file records under {}", removed, root_key);
        }
        Ok(removed)
    }
}

/// Fetch one record on an existing connection or transaction.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_record(conn: &Connection, key: &str) -> rusqlite::Result<Option<FileRecord>> {
    conn.prepare_cached(SELECT_RECORD)?
        .query_row([key], record_from_row)
        .optional()
}

/// Replace one record on an existing connection or transaction.
///
/// # Errors
///
/// Returns an error if the write fails.
pub fn upsert_record(conn: &Connection, record: &FileRecord) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare_cached(UPSERT_RECORD)?;
    execute_upsert(&mut stmt, record)?;
    Ok(())
}

/// Delete one record on an existing connection or transaction.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn delete_record(conn: &Connection, key: &str) -> rusqlite::Result<bool> {
    let removed = conn
        .prepare_cached("DELETE FROM file_records WHERE path = ?1")?
        .execute([key])?;
    Ok(removed > 0)
}

fn execute_upsert(stmt: &mut Statement<'_>, record: &FileRecord) -> rusqlite::Result<usize> {
    stmt.execute(params![
        record.key,
        record.original_path.to_string_lossy(),
        to_sql_int(record.size),
        record.mtime_nanos(),
        record.digest().map(hash_to_hex),
    ])
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let key: String = row.get(0)?;
    let original_path: String = row.get(1)?;
    let hash: Option<String> = row.get(4)?;
    let hash = match hash {
        Some(hex) => match hex_to_hash(&hex) {
            Some(digest) => HashState::Computed(digest),
            None => {
                log::warn!("Ignoring malformed cached hash for {}", key);
                HashState::NotNeeded
            }
        },
        None => HashState::NotNeeded,
    };
    Ok(FileRecord {
        key,
        original_path: PathBuf::from(original_path),
        size: from_sql_int(row.get(2)?),
        modified: nanos_to_system_time(row.get(3)?),
        hash,
    })
}
