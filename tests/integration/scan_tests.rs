use super::support::{counting_engine, write_file};
use dupevault::cache::{FreshnessCache, HashState, Store};
use dupevault::config::Config;
use dupevault::duplicates::{GroupIndex, ScanConfig};
use dupevault::scanner::{Hasher, WalkerConfig};
use filetime::FileTime;
use std::fs;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tempfile::tempdir;

// ==================== Worked Example ====================

#[test]
fn test_worked_example_end_to_end() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "a", b"0123456789");
    write_file(dir.path(), "b", b"0123456789");
    write_file(dir.path(), "c", b"01234567890123456789");

    let store = Arc::new(Store::open_in_memory().unwrap());
    let (engine, hasher) = counting_engine(&store, ScanConfig::default());
    let result = engine.scan(&[dir.path().to_path_buf()]).unwrap();

    // Only the two 10-byte files share a size.
    assert_eq!(hasher.count(), 2);
    assert_eq!(result.summary.total_files, 3);
    assert_eq!(result.summary.candidates, 2);
    assert_eq!(result.duplicate_groups.len(), 1);

    let h1 = Hasher::new().hash_bytes(b"0123456789");
    let group = &result.duplicate_groups[0];
    assert_eq!(group.size, 10);
    assert_eq!(group.hash, h1);
    assert_eq!(group.total_bytes(), 20);

    let index = GroupIndex::new(Arc::clone(&store));
    index.rebuild_all(index.next_version().unwrap()).unwrap();
    let row = index.get(10, &h1).unwrap().unwrap();
    assert_eq!(row.member_count, 2);
    assert_eq!(row.total_bytes, 20);
    assert_eq!(index.len().unwrap(), 1);
}

// ==================== Incremental Rescan Tests ====================

#[test]
fn test_unchanged_rescan_hashes_nothing() {
    let dir = tempdir().unwrap();
    for i in 0..5 {
        write_file(dir.path(), &format!("dup{i}.bin"), b"same bytes");
    }
    write_file(dir.path(), "other.bin", b"different length");

    let store = Arc::new(Store::open_in_memory().unwrap());
    let (engine, hasher) = counting_engine(&store, ScanConfig::default());

    engine.scan(&[dir.path().to_path_buf()]).unwrap();
    assert_eq!(hasher.count(), 5);
    hasher.reset();

    let result = engine.scan(&[dir.path().to_path_buf()]).unwrap();
    assert_eq!(hasher.count(), 0);
    assert_eq!(result.summary.reused_hashes, 5);
    assert_eq!(result.duplicate_groups.len(), 1);
    assert_eq!(result.duplicate_groups[0].len(), 5);
}

#[test]
fn test_modified_file_is_the_only_rehash() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "a.bin", b"0123456789");
    let b = write_file(dir.path(), "b.bin", b"0123456789");

    let store = Arc::new(Store::open_in_memory().unwrap());
    let (engine, hasher) = counting_engine(&store, ScanConfig::default());
    engine.scan(&[dir.path().to_path_buf()]).unwrap();
    hasher.reset();

    fs::write(&b, b"9876543210").unwrap();
    filetime::set_file_mtime(&b, FileTime::from_unix_time(2_000_000_000, 0)).unwrap();

    let result = engine.scan(&[dir.path().to_path_buf()]).unwrap();
    assert_eq!(hasher.hashed(), vec![b.clone()]);
    assert!(result.duplicate_groups.is_empty());
}

#[test]
fn test_mtime_change_alone_forces_rehash() {
    let dir = tempdir().unwrap();
    let a = write_file(dir.path(), "a.bin", b"xyz");
    write_file(dir.path(), "b.bin", b"xyz");

    let store = Arc::new(Store::open_in_memory().unwrap());
    let (engine, hasher) = counting_engine(&store, ScanConfig::default());
    engine.scan(&[dir.path().to_path_buf()]).unwrap();
    hasher.reset();

    filetime::set_file_mtime(&a, FileTime::from_unix_time(1_500_000_000, 123)).unwrap();
    let result = engine.scan(&[dir.path().to_path_buf()]).unwrap();

    assert_eq!(hasher.count(), 1);
    assert_eq!(result.summary.hashed_files, 1);
    assert_eq!(result.summary.reused_hashes, 1);
    assert_eq!(result.duplicate_groups.len(), 1);
}

#[test]
fn test_singleton_gains_partner_later() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "a.bin", b"lonely");

    let store = Arc::new(Store::open_in_memory().unwrap());
    let (engine, hasher) = counting_engine(&store, ScanConfig::default());
    let first = engine.scan(&[dir.path().to_path_buf()]).unwrap();
    assert_eq!(hasher.count(), 0);
    assert_eq!(first.files[0].hash, HashState::NotNeeded);

    write_file(dir.path(), "b.bin", b"lonely");
    let second = engine.scan(&[dir.path().to_path_buf()]).unwrap();
    assert_eq!(hasher.count(), 2);
    assert_eq!(second.duplicate_groups.len(), 1);
}

#[test]
fn test_cache_survives_reopen() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data");
    write_file(&data, "a.bin", b"persisted");
    write_file(&data, "b.bin", b"persisted");
    let db = dir.path().join("db").join("dupevault.db");

    {
        let store = Arc::new(Store::open(&db).unwrap());
        let (engine, hasher) = counting_engine(&store, ScanConfig::default());
        engine.scan(&[data.clone()]).unwrap();
        assert_eq!(hasher.count(), 2);
    }

    let store = Arc::new(Store::open(&db).unwrap());
    let (engine, hasher) = counting_engine(&store, ScanConfig::default());
    let result = engine.scan(&[data]).unwrap();
    assert_eq!(hasher.count(), 0);
    assert_eq!(result.duplicate_groups.len(), 1);
}

// ==================== Walk Policy Tests ====================

#[test]
fn test_ignore_patterns_and_trash_dir_are_skipped() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "keep/a.txt", b"payload");
    write_file(dir.path(), "keep/b.tmp", b"payload");
    write_file(dir.path(), ".dupevault-trash/0123456789abcdef_a.txt", b"payload");

    let config = Config {
        ignore_patterns: vec!["*.tmp".to_string()],
        ..Config::default()
    };
    let store = Arc::new(Store::open_in_memory().unwrap());
    let (engine, hasher) = counting_engine(&store, config.scan_config());
    let result = engine.scan(&[dir.path().to_path_buf()]).unwrap();

    assert_eq!(result.summary.total_files, 1);
    assert_eq!(hasher.count(), 0);
    assert!(result.duplicate_groups.is_empty());
}

#[test]
fn test_caller_predicate_excludes_files() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "a.raw", b"12345");
    write_file(dir.path(), "b.raw", b"12345");
    write_file(dir.path(), "c.jpg", b"12345");

    let walker = WalkerConfig::default()
        .with_ignore(|path, _is_dir| path.extension().is_some_and(|e| e == "raw"));
    let store = Arc::new(Store::open_in_memory().unwrap());
    let (engine, _) = counting_engine(&store, ScanConfig::default().with_walker_config(walker));
    let result = engine.scan(&[dir.path().to_path_buf()]).unwrap();

    assert_eq!(result.summary.total_files, 1);
}

#[test]
fn test_multiple_roots_find_cross_root_duplicates() {
    let dir = tempdir().unwrap();
    let left = dir.path().join("left");
    let right = dir.path().join("right");
    write_file(&left, "photo.jpg", b"jpeg bytes");
    write_file(&right, "photo copy.jpg", b"jpeg bytes");

    let store = Arc::new(Store::open_in_memory().unwrap());
    let (engine, _) = counting_engine(&store, ScanConfig::default());
    let result = engine.scan(&[left, right]).unwrap();

    assert_eq!(result.duplicate_groups.len(), 1);
    assert_eq!(result.duplicate_groups[0].len(), 2);
}

#[test]
fn test_cancelled_scan_leaves_cache_untouched() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "a", b"same");
    write_file(dir.path(), "b", b"same");

    let store = Arc::new(Store::open_in_memory().unwrap());
    let flag = Arc::new(AtomicBool::new(true));
    let (engine, hasher) =
        counting_engine(&store, ScanConfig::default().with_shutdown_flag(flag));
    let result = engine.scan(&[dir.path().to_path_buf()]).unwrap();

    assert!(result.summary.interrupted);
    assert!(result.files.is_empty());
    assert_eq!(hasher.count(), 0);
    assert!(FreshnessCache::new(store).is_empty().unwrap());
}
