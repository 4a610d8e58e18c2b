use dupevault::cache::{CacheError, FileRecord, Freshness, FreshnessCache, HashState, Store};
use dupevault::duplicates::GroupIndex;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::tempdir;

fn record(path: &str, size: u64, secs: u64, hash: Option<u8>) -> FileRecord {
    FileRecord::new(
        Path::new(path),
        size,
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs),
        hash.map_or(HashState::NotNeeded, |b| HashState::Computed([b; 32])),
    )
}

// ==================== Freshness Tests ====================

#[test]
fn test_freshness_classification() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let cache = FreshnessCache::new(store);

    let candidate = record("/photos/a.jpg", 100, 50, None);
    assert_eq!(cache.lookup(&candidate).unwrap().0, Freshness::Miss);

    cache.upsert(&record("/photos/a.jpg", 100, 50, Some(1))).unwrap();
    let (freshness, cached) = cache.lookup(&candidate).unwrap();
    assert_eq!(freshness, Freshness::Fresh);
    assert_eq!(cached.unwrap().hash, HashState::Computed([1; 32]));

    let resized = record("/photos/a.jpg", 101, 50, None);
    assert_eq!(cache.lookup(&resized).unwrap().0, Freshness::Stale);

    let touched = record("/photos/a.jpg", 100, 51, None);
    assert_eq!(cache.lookup(&touched).unwrap().0, Freshness::Stale);
}

#[test]
fn test_unnormalized_paths_share_a_record() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let cache = FreshnessCache::new(store);

    cache
        .upsert(&record("/docs/caf\u{e9}.txt", 10, 1, Some(2)))
        .unwrap();
    cache
        .upsert(&record("/docs/./cafe\u{301}.txt", 10, 1, Some(3)))
        .unwrap();

    assert_eq!(cache.len().unwrap(), 1);
    let stored = cache.get(&record("/docs/caf\u{e9}.txt", 0, 0, None).key).unwrap();
    assert_eq!(stored.unwrap().hash, HashState::Computed([3; 32]));
}

#[test]
fn test_prune_missing_respects_root_boundary() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let cache = FreshnessCache::new(store);
    cache
        .upsert_all(&[
            record("/data/a", 1, 1, None),
            record("/data/b", 1, 1, None),
            record("/data-other/c", 1, 1, None),
        ])
        .unwrap();

    let seen: HashSet<String> = [record("/data/a", 1, 1, None).key].into_iter().collect();
    assert_eq!(cache.prune_missing("/data", &seen).unwrap(), 1);
    assert_eq!(cache.len().unwrap(), 2);
    assert!(cache.get("/data-other/c").unwrap().is_some());
}

// ==================== Store Tests ====================

#[test]
fn test_store_creates_parent_directories() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("nested").join("deeper").join("cache.db");
    let store = Store::open(&db).unwrap();
    assert!(db.exists());
    assert_eq!(store.path(), Some(db.as_path()));
    assert_eq!(store.schema_version().unwrap(), 1);
}

#[test]
fn test_store_rejects_newer_schema() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("future.db");
    {
        let conn = rusqlite::Connection::open(&db).unwrap();
        conn.pragma_update(None, "user_version", 99).unwrap();
    }

    let err = Store::open(&db).unwrap_err();
    assert!(matches!(
        err,
        CacheError::UnsupportedSchema {
            found: 99,
            supported: 1
        }
    ));
}

#[test]
fn test_store_rejects_garbage_file() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("garbage.db");
    fs::write(&db, b"this is definitely not a sqlite database, just bytes").unwrap();

    assert!(Store::open(&db).is_err());
}

#[test]
fn test_shared_store_between_components() {
    let dir = tempdir().unwrap();
    let store = Arc::new(Store::open(&dir.path().join("shared.db")).unwrap());
    let cache = FreshnessCache::new(Arc::clone(&store));
    let index = GroupIndex::new(Arc::clone(&store));

    cache
        .upsert_all(&[record("/m/a", 4, 1, Some(5)), record("/m/b", 4, 1, Some(5))])
        .unwrap();
    assert_eq!(index.rebuild_all(1).unwrap(), 1);

    let reopened = Arc::new(Store::open(&dir.path().join("shared.db")).unwrap());
    drop(store);
    let index = GroupIndex::new(reopened);
    assert_eq!(index.installed_version().unwrap(), 1);
    assert_eq!(index.len().unwrap(), 1);
}
