//! SQLite store shared by the freshness cache, the duplicate group index
//! and the trash vault.
//!
//! One database file holds every persisted table:
//!
//! | table              | key                 | owner                     |
//! |--------------------|---------------------|---------------------------|
//! | `file_records`     | canonical path      | [`super::FreshnessCache`] |
//! | `duplicate_groups` | (size, hash)        | `duplicates::index`       |
//! | `trash_records`    | opaque id           | `actions::trash`          |
//! | `index_meta`       | key                 | `duplicates::index`       |
//!
//! The connection runs in WAL mode with a busy timeout and is guarded by a
//! mutex, so an `Arc<Store>` can be handed to every component.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::Connection;

/// Current schema version, tracked with `PRAGMA user_version`.
pub const SCHEMA_VERSION: i32 = 1;

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const SCHEMA_V1: &str = "
    CREATE TABLE IF NOT EXISTS file_records (
        path TEXT PRIMARY KEY NOT NULL,
        original_path TEXT NOT NULL,
        size INTEGER NOT NULL,
        mtime_ns INTEGER NOT NULL,
        hash TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_file_records_size_hash ON file_records(size, hash);

    CREATE TABLE IF NOT EXISTS duplicate_groups (
        size INTEGER NOT NULL,
        hash TEXT NOT NULL,
        member_count INTEGER NOT NULL,
        total_bytes INTEGER NOT NULL,
        version INTEGER NOT NULL,
        PRIMARY KEY (size, hash)
    );
    CREATE INDEX IF NOT EXISTS idx_duplicate_groups_version ON duplicate_groups(version);

    CREATE TABLE IF NOT EXISTS trash_records (
        id TEXT PRIMARY KEY NOT NULL,
        original_path TEXT NOT NULL,
        trashed_path TEXT NOT NULL,
        size INTEGER NOT NULL,
        mtime_ns INTEGER NOT NULL,
        hash TEXT,
        deleted_at INTEGER NOT NULL,
        volume_root TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_trash_records_deleted_at ON trash_records(deleted_at);

    CREATE TABLE IF NOT EXISTS index_meta (
        key TEXT PRIMARY KEY NOT NULL,
        value INTEGER NOT NULL
    );
";

/// Errors that can occur while opening or using the store.
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    /// The database file could not be opened.
    #[error("Failed to open database {path}: {source}")]
    Open {
        /// Database path
        path: PathBuf,
        /// Underlying SQLite error
        #[source]
        source: rusqlite::Error,
    },

    /// The parent directory of the database could not be created.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDir {
        /// Directory path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The database was written by a newer version of this program.
    #[error("Database schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema {
        /// Version found on disk
        found: i32,
        /// Highest version this build understands
        supported: i32,
    },

    /// A query failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A thread panicked while holding the connection.
    #[error("Database connection lock poisoned")]
    Poisoned,
}

/// Result type for store operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// The persistent store.
#[derive(Debug)]
pub struct Store {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Store {
    /// Open or create the database at `path`, creating parent directories
    /// as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created, or
    /// if the schema is newer than this build supports.
    pub fn open(path: &Path) -> CacheResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| CacheError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path).map_err(|source| CacheError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let journal_mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        log::debug!("Opened database {} (journal_mode={})", path.display(), journal_mode);

        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_in_memory() -> CacheResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, None)
    }

    fn init(mut conn: Connection, path: Option<PathBuf>) -> CacheResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Database file path, `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Lock the connection for exclusive use.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Poisoned`] if another thread panicked while
    /// holding the lock.
    pub fn lock(&self) -> CacheResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| CacheError::Poisoned)
    }

    /// Schema version stored in the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the pragma cannot be read.
    pub fn schema_version(&self) -> CacheResult<i32> {
        let conn = self.lock()?;
        Ok(user_version(&conn)?)
    }
}

fn user_version(conn: &Connection) -> rusqlite::Result<i32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

fn migrate(conn: &mut Connection) -> CacheResult<()> {
    let found = user_version(conn)?;
    if found > SCHEMA_VERSION {
        return Err(CacheError::UnsupportedSchema {
            found,
            supported: SCHEMA_VERSION,
        });
    }
    if found == SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    if found < 1 {
        tx.execute_batch(SCHEMA_V1)?;
    }
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tx.commit()?;

    log::info!("Database schema migrated from v{} to v{}", found, SCHEMA_VERSION);
    Ok(())
}

/// Clamp a `u64` into SQLite's signed integer range.
#[must_use]
pub(crate) fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Read back a size stored with [`to_sql_int`].
#[must_use]
pub(crate) fn from_sql_int(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
