//! Per-volume trash vault.
//!
//! # Overview
//!
//! Files are moved into a hidden directory at the root of the volume that
//! holds them, so a move is a rename on the same device. Each trashed file
//! is renamed `<id>_<file name>` and described by a [`TrashRecord`] carrying
//! the size, mtime and hash of the original, so a restore never rehashes.
//!
//! # Consistency
//!
//! The file move and the database write are two steps:
//! - The move happens first. It is an atomic rename, or a copy + delete
//!   on cross-device errors that removes the partial destination on failure.
//! - One transaction then deletes the file record, inserts the trash record
//!   and refreshes the index key. If that transaction fails, the file is
//!   moved back and the outcome is reported in
//!   [`TrashError::PersistFailed`].
//!
//! # Example
//!
//! ```no_run
//! use dupevault::actions::trash::TrashVault;
//! use dupevault::cache::Store;
//! use dupevault::scanner::DeviceBoundaryResolver;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let store = Arc::new(Store::open_in_memory().unwrap());
//! let vault = TrashVault::new(store, Arc::new(DeviceBoundaryResolver::new()));
//!
//! let moved = vault.move_to_trash(Path::new("/data/copy.jpg")).unwrap();
//! println!("Trashed as {}", moved.record.id);
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use thiserror::Error;

use crate::cache::database::{from_sql_int, to_sql_int};
use crate::cache::entry::{nanos_to_system_time, system_time_to_nanos};
use crate::cache::freshness::{delete_record, get_record, upsert_record};
use crate::cache::{CacheError, FileRecord, Freshness, HashState, Store};
use crate::duplicates::refresh_key;
use crate::scanner::{hash_to_hex, hex_to_hash, path_utils, Hash, VolumeResolver};

/// Default name of the trash directory at each volume root.
pub const DEFAULT_TRASH_DIR: &str = ".dupevault-trash";

/// Marker file hiding the trash directory from media galleries.
const NOMEDIA_MARKER: &str = ".nomedia";

const SELECT_TRASH: &str = "SELECT id, original_path, trashed_path, size, mtime_ns, hash, \
                            deleted_at, volume_root FROM trash_records";

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Error type for trash operations.
#[derive(Debug, Error)]
pub enum TrashError {
    /// The volume root of the path could not be determined.
    #[error("cannot resolve volume root for {0}")]
    UnresolvableRoot(PathBuf),

    /// The file to trash does not exist.
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// The path is not a regular file.
    #[error("not a regular file: {0}")]
    NotAFile(PathBuf),

    /// No trash record has this id.
    #[error("no trash entry with id {0}")]
    UnknownId(String),

    /// The file could not be moved.
    #[error("failed to move {from} to {to}: {source}")]
    MoveFailed {
        /// Source path
        from: PathBuf,
        /// Destination path
        to: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The file moved but the database update failed.
    #[error("moved {path} but failed to record it (rolled back: {rolled_back}): {source}")]
    PersistFailed {
        /// Path of the file that was moved
        path: PathBuf,
        /// Whether the compensating move succeeded
        rolled_back: bool,
        /// Underlying store error
        #[source]
        source: CacheError,
    },

    /// General I/O error.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The store could not be accessed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl From<rusqlite::Error> for TrashError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Cache(CacheError::Database(e))
    }
}

/// A file held in the trash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrashRecord {
    /// Opaque id (16 hex characters)
    pub id: String,
    /// Where the file lived before it was trashed
    pub original_path: PathBuf,
    /// Where the file lives now
    pub trashed_path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Modification time of the original
    pub modified: SystemTime,
    /// Content hash, carried over from the file record
    pub hash: Option<Hash>,
    /// When the file was trashed
    pub deleted_at: DateTime<Utc>,
    /// Root of the volume holding the trash directory
    pub volume_root: PathBuf,
}

/// Result of a successful move to trash.
#[derive(Debug, Clone)]
pub struct MoveResult {
    /// The new trash record
    pub record: TrashRecord,
    /// Whether the move fell back to copy + delete
    pub copied: bool,
}

/// Outcome of a restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreResult {
    /// The file is back at its original path.
    Restored(PathBuf),
    /// The original path is occupied; nothing was touched.
    Conflict(PathBuf),
    /// The trashed file was gone; its record has been dropped.
    Orphaned,
}

/// Trash vault over a shared store.
pub struct TrashVault {
    store: Arc<Store>,
    resolver: Arc<dyn VolumeResolver>,
    dir_name: String,
}

impl std::fmt::Debug for TrashVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrashVault")
            .field("store", &self.store)
            .field("dir_name", &self.dir_name)
            .finish_non_exhaustive()
    }
}

impl TrashVault {
    /// Create a vault using [`DEFAULT_TRASH_DIR`].
    #[must_use]
    pub fn new(store: Arc<Store>, resolver: Arc<dyn VolumeResolver>) -> Self {
        Self {
            store,
            resolver,
            dir_name: DEFAULT_TRASH_DIR.to_string(),
        }
    }

    /// Set the trash directory name.
    #[must_use]
    pub fn with_dir_name(mut self, name: impl Into<String>) -> Self {
        self.dir_name = name.into();
        self
    }

    /// Name of the trash directory at each volume root.
    #[must_use]
    pub fn dir_name(&self) -> &str {
        &self.dir_name
    }

    /// Move a file into the trash of its volume.
    ///
    /// # Errors
    ///
    /// - [`TrashError::UnresolvableRoot`] if the volume cannot be determined
    /// - [`TrashError::NotFound`] / [`TrashError::NotAFile`] for bad input
    /// - [`TrashError::MoveFailed`] if neither rename nor copy succeeded
    /// - [`TrashError::PersistFailed`] if the database update failed after
    ///   the move
    pub fn move_to_trash(&self, path: &Path) -> Result<MoveResult, TrashError> {
        // Relative paths are pinned to the current directory now, so a later
        // restore from another directory returns the file to the same place.
        let absolute = std::path::absolute(path).map_err(|e| TrashError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let path = absolute.as_path();

        let metadata = match fs::symlink_metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(TrashError::NotFound(path.to_path_buf()))
            }
            Err(e) => {
                return Err(TrashError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        if !metadata.is_file() {
            return Err(TrashError::NotAFile(path.to_path_buf()));
        }

        let volume_root = self
            .resolver
            .volume_root(path)
            .ok_or_else(|| TrashError::UnresolvableRoot(path.to_path_buf()))?;
        let trash_dir = self.ensure_trash_dir(&volume_root)?;

        let modified = metadata.modified().map_err(|e| TrashError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let current = FileRecord::new(path, metadata.len(), modified, HashState::NotNeeded);

        let conn = self.store.lock()?;
        // The hash is carried over only if the cached record still matches.
        let hash = match get_record(&conn, &current.key)? {
            Some(cached) if Freshness::classify(&current, Some(&cached)) == Freshness::Fresh => {
                cached.digest().copied()
            }
            _ => None,
        };

        let id = new_trash_id(path);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let trashed_path = trash_dir.join(format!("{id}_{file_name}"));

        let copied = relocate_file(path, &trashed_path).map_err(|e| {
            log::error!("Failed to move {} to trash: {}", path.display(), e);
            TrashError::MoveFailed {
                from: path.to_path_buf(),
                to: trashed_path.clone(),
                source: e,
            }
        })?;

        let record = TrashRecord {
            id,
            original_path: path.to_path_buf(),
            trashed_path,
            size: current.size,
            modified,
            hash,
            deleted_at: Utc::now(),
            volume_root,
        };

        if let Err(e) = persist_trashed(&conn, &current.key, &record) {
            let rolled_back = relocate_file(&record.trashed_path, path).is_ok();
            log::error!(
                "Failed to record trashed file {} (rolled back: {}): {}",
                path.display(),
                rolled_back,
                e
            );
            return Err(TrashError::PersistFailed {
                path: path.to_path_buf(),
                rolled_back,
                source: CacheError::Database(e),
            });
        }

        log::info!("Moved {} to trash as {}", path.display(), record.id);
        Ok(MoveResult { record, copied })
    }

    /// Move a trashed file back to its original path.
    ///
    /// # Errors
    ///
    /// - [`TrashError::UnknownId`] if no record has this id
    /// - [`TrashError::MoveFailed`] if the file could not be moved back
    /// - [`TrashError::PersistFailed`] if the database update failed after
    ///   the move
    pub fn restore_from_trash(&self, id: &str) -> Result<RestoreResult, TrashError> {
        let conn = self.store.lock()?;
        let record =
            get_trash_record(&conn, id)?.ok_or_else(|| TrashError::UnknownId(id.to_string()))?;

        if !exists(&record.trashed_path) {
            delete_trash_record(&conn, id)?;
            log::warn!(
                "Trashed file {} is missing, dropping entry {}",
                record.trashed_path.display(),
                id
            );
            return Ok(RestoreResult::Orphaned);
        }
        if exists(&record.original_path) {
            log::warn!(
                "Cannot restore {}: original path is occupied",
                record.original_path.display()
            );
            return Ok(RestoreResult::Conflict(record.original_path));
        }

        if let Some(parent) = record.original_path.parent() {
            fs::create_dir_all(parent).map_err(|e| TrashError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        relocate_file(&record.trashed_path, &record.original_path).map_err(|e| {
            TrashError::MoveFailed {
                from: record.trashed_path.clone(),
                to: record.original_path.clone(),
                source: e,
            }
        })?;

        if let Err(e) = persist_restored(&conn, &record) {
            let rolled_back = relocate_file(&record.original_path, &record.trashed_path).is_ok();
            log::error!(
                "Failed to record restore of {} (rolled back: {}): {}",
                record.original_path.display(),
                rolled_back,
                e
            );
            return Err(TrashError::PersistFailed {
                path: record.original_path,
                rolled_back,
                source: CacheError::Database(e),
            });
        }

        log::info!("Restored {}", record.original_path.display());
        Ok(RestoreResult::Restored(record.original_path))
    }

    /// Remove a trashed file for good. A file already gone counts as
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns [`TrashError::UnknownId`] if no record has this id, or an I/O
    /// error if the file exists but cannot be removed.
    pub fn delete_permanently(&self, id: &str) -> Result<TrashRecord, TrashError> {
        let conn = self.store.lock()?;
        let record =
            get_trash_record(&conn, id)?.ok_or_else(|| TrashError::UnknownId(id.to_string()))?;
        remove_trashed_file(&record.trashed_path)?;
        delete_trash_record(&conn, id)?;
        log::info!("Permanently deleted {}", record.original_path.display());
        Ok(record)
    }

    /// Permanently delete every trash entry. Returns the number removed.
    ///
    /// Entries whose file cannot be removed are kept and logged.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn empty_trash(&self) -> Result<usize, TrashError> {
        let mut removed = 0;
        for record in self.entries()? {
            match self.delete_permanently(&record.id) {
                Ok(_) => removed += 1,
                Err(e) => log::warn!("Failed to empty trash entry {}: {}", record.id, e),
            }
        }
        log::info!("Emptied trash: {} entries removed", removed);
        Ok(removed)
    }

    /// All trash entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn entries(&self) -> Result<Vec<TrashRecord>, TrashError> {
        let conn = self.store.lock()?;
        let mut stmt =
            conn.prepare_cached(&format!("{SELECT_TRASH} ORDER BY deleted_at DESC, rowid DESC"))?;
        let rows = stmt.query_map([], trash_from_row)?;
        let records = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Fetch one trash entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, id: &str) -> Result<Option<TrashRecord>, TrashError> {
        let conn = self.store.lock()?;
        Ok(get_trash_record(&conn, id)?)
    }

    fn ensure_trash_dir(&self, volume_root: &Path) -> Result<PathBuf, TrashError> {
        let dir = volume_root.join(&self.dir_name);
        fs::create_dir_all(&dir).map_err(|e| TrashError::Io {
            path: dir.clone(),
            source: e,
        })?;
        let marker = dir.join(NOMEDIA_MARKER);
        if !marker.exists() {
            fs::write(&marker, b"").map_err(|e| TrashError::Io {
                path: marker.clone(),
                source: e,
            })?;
        }
        Ok(dir)
    }
}

/// Opaque id from the path, the current time and a process-local counter.
fn new_trash_id(path: &Path) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(path.to_string_lossy().as_bytes());
    hasher.update(&system_time_to_nanos(SystemTime::now()).to_le_bytes());
    hasher.update(&ID_COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    hasher.finalize().to_hex()[..16].to_string()
}

fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn is_cross_device_error(err: &io::Error) -> bool {
    #[cfg(unix)]
    const EXDEV: i32 = 18;
    #[cfg(windows)]
    const EXDEV: i32 = 17; // ERROR_NOT_SAME_DEVICE
    #[cfg(not(any(unix, windows)))]
    const EXDEV: i32 = -1;

    err.raw_os_error() == Some(EXDEV)
}

/// Rename `src` to `dest`, falling back to copy + delete across devices.
///
/// Returns whether the fallback was used. On fallback failure the partial
/// destination is removed and `src` is left in place.
fn relocate_file(src: &Path, dest: &Path) -> io::Result<bool> {
    match fs::rename(src, dest) {
        Ok(()) => Ok(false),
        Err(err) if is_cross_device_error(&err) => {
            log::debug!("Cross-device move, copying {}", src.display());
            copy_then_remove(src, dest)?;
            Ok(true)
        }
        Err(err) => Err(err),
    }
}

/// Copy `src` to `dest`, then remove `src`.
///
/// On any failure `dest` is removed again and `src` stays in place.
fn copy_then_remove(src: &Path, dest: &Path) -> io::Result<()> {
    let result = copy_preserving_mtime(src, dest).and_then(|()| fs::remove_file(src));
    if let Err(err) = result {
        match fs::remove_file(dest) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove partial copy {}: {}", dest.display(), e),
        }
        return Err(err);
    }
    Ok(())
}

fn copy_preserving_mtime(src: &Path, dest: &Path) -> io::Result<()> {
    let metadata = fs::metadata(src)?;
    fs::copy(src, dest)?;
    fs::File::open(dest)?.sync_all()?;
    let mtime = filetime::FileTime::from_last_modification_time(&metadata);
    filetime::set_file_mtime(dest, mtime)
}

fn remove_trashed_file(path: &Path) -> Result<(), TrashError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(TrashError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

fn persist_trashed(conn: &Connection, key: &str, record: &TrashRecord) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;
    delete_record(&tx, key)?;
    insert_trash_record(&tx, record)?;
    if let Some(hash) = record.hash {
        refresh_key(&tx, record.size, &hash_to_hex(&hash))?;
    }
    tx.commit()
}

fn persist_restored(conn: &Connection, record: &TrashRecord) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;
    let restored = FileRecord::new(
        &record.original_path,
        record.size,
        record.modified,
        HashState::from(record.hash),
    );
    upsert_record(&tx, &restored)?;
    delete_trash_record(&tx, &record.id)?;
    if let Some(hash) = record.hash {
        refresh_key(&tx, record.size, &hash_to_hex(&hash))?;
    }
    tx.commit()
}

fn insert_trash_record(conn: &Connection, record: &TrashRecord) -> rusqlite::Result<()> {
    conn.prepare_cached(
        "INSERT INTO trash_records
            (id, original_path, trashed_path, size, mtime_ns, hash, deleted_at, volume_root)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?
    .execute(params![
        record.id,
        record.original_path.to_string_lossy(),
        record.trashed_path.to_string_lossy(),
        to_sql_int(record.size),
        system_time_to_nanos(record.modified),
        record.hash.as_ref().map(hash_to_hex),
        record.deleted_at.timestamp_micros(),
        path_utils::path_key(&record.volume_root),
    ])?;
    Ok(())
}

fn get_trash_record(conn: &Connection, id: &str) -> rusqlite::Result<Option<TrashRecord>> {
    conn.prepare_cached(&format!("{SELECT_TRASH} WHERE id = ?1"))?
        .query_row([id], trash_from_row)
        .optional()
}

fn delete_trash_record(conn: &Connection, id: &str) -> rusqlite::Result<()> {
    conn.prepare_cached("DELETE FROM trash_records WHERE id = ?1")?
        .execute([id])?;
    Ok(())
}

fn trash_from_row(row: &Row<'_>) -> rusqlite::Result<TrashRecord> {
    let hash: Option<String> = row.get(5)?;
    let micros: i64 = row.get(6)?;
    let deleted_at = Utc
        .timestamp_opt(
            micros.div_euclid(1_000_000),
            u32::try_from(micros.rem_euclid(1_000_000) * 1_000).unwrap_or(0),
        )
        .single()
        .unwrap_or_default();

    Ok(TrashRecord {
        id: row.get(0)?,
        original_path: PathBuf::from(row.get::<_, String>(1)?),
        trashed_path: PathBuf::from(row.get::<_, String>(2)?),
        size: from_sql_int(row.get(3)?),
        modified: nanos_to_system_time(row.get(4)?),
        hash: hash.as_deref().and_then(hex_to_hash),
        deleted_at,
        volume_root: PathBuf::from(row.get::<_, String>(7)?),
    })
}
