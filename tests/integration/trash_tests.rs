use super::support::{counting_engine, write_file};
use dupevault::actions::{RestoreResult, TrashError, TrashVault};
use dupevault::cache::{FreshnessCache, Store};
use dupevault::config::Config;
use dupevault::duplicates::GroupIndex;
use dupevault::scanner::{path_utils, FixedRootsResolver, Hasher};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn vault_for(store: &Arc<Store>, root: &Path) -> TrashVault {
    let resolver = FixedRootsResolver::new(vec![root.to_path_buf()]);
    TrashVault::new(Arc::clone(store), Arc::new(resolver))
}

// ==================== Move / Restore Lifecycle ====================

#[test]
fn test_trash_lifecycle_keeps_index_consistent() {
    let dir = tempdir().unwrap();
    let a = write_file(dir.path(), "a.jpg", b"0123456789");
    write_file(dir.path(), "b.jpg", b"0123456789");
    let hash = Hasher::new().hash_bytes(b"0123456789");

    let store = Arc::new(Store::open_in_memory().unwrap());
    let (engine, hasher) = counting_engine(&store, Config::default().scan_config());
    engine.scan(&[dir.path().to_path_buf()]).unwrap();
    let index = GroupIndex::new(Arc::clone(&store));
    index.rebuild_all(index.next_version().unwrap()).unwrap();
    assert_eq!(index.get(10, &hash).unwrap().unwrap().member_count, 2);

    let vault = vault_for(&store, dir.path());
    let moved = vault.move_to_trash(&a).unwrap();
    assert_eq!(moved.record.hash, Some(hash));
    assert!(index.get(10, &hash).unwrap().is_none());

    // The trash directory is invisible to scans.
    hasher.reset();
    let result = engine.scan(&[dir.path().to_path_buf()]).unwrap();
    assert_eq!(result.summary.total_files, 1);
    assert!(result.duplicate_groups.is_empty());

    assert_eq!(
        vault.restore_from_trash(&moved.record.id).unwrap(),
        RestoreResult::Restored(a.clone())
    );
    assert_eq!(index.get(10, &hash).unwrap().unwrap().member_count, 2);

    // The restored record is fresh, so nothing is rehashed.
    hasher.reset();
    let result = engine.scan(&[dir.path().to_path_buf()]).unwrap();
    assert_eq!(hasher.count(), 0);
    assert_eq!(result.duplicate_groups.len(), 1);
}

#[test]
fn test_restore_into_missing_directory() {
    let dir = tempdir().unwrap();
    let nested = write_file(dir.path(), "albums/2024/a.jpg", b"img");
    let store = Arc::new(Store::open_in_memory().unwrap());
    let vault = vault_for(&store, dir.path());

    let moved = vault.move_to_trash(&nested).unwrap();
    fs::remove_dir_all(dir.path().join("albums")).unwrap();

    let result = vault.restore_from_trash(&moved.record.id).unwrap();
    assert_eq!(result, RestoreResult::Restored(nested.clone()));
    assert_eq!(fs::read(&nested).unwrap(), b"img");
}

#[test]
fn test_relative_path_restores_to_original_directory() {
    // Jail serializes tests that change the working directory and restores it.
    figment::Jail::expect_with(|_jail| {
        let base = std::env::current_dir().unwrap();
        let work = base.join("work");
        let other = base.join("other");
        write_file(&work, "a.txt", b"keep me");
        fs::create_dir_all(&other).unwrap();

        let store = Arc::new(Store::open_in_memory().unwrap());
        let vault = vault_for(&store, &base);

        std::env::set_current_dir(&work).unwrap();
        let moved = vault.move_to_trash(Path::new("a.txt")).unwrap();
        assert_eq!(moved.record.original_path, work.join("a.txt"));

        std::env::set_current_dir(&other).unwrap();
        assert_eq!(
            vault.restore_from_trash(&moved.record.id).unwrap(),
            RestoreResult::Restored(work.join("a.txt"))
        );
        assert_eq!(fs::read(work.join("a.txt")).unwrap(), b"keep me");
        assert!(!other.join("a.txt").exists());

        let cache = FreshnessCache::new(store);
        assert!(cache
            .get(&path_utils::path_key(&work.join("a.txt")))
            .unwrap()
            .is_some());
        Ok(())
    });
}

#[test]
fn test_conflict_then_resolve() {
    let dir = tempdir().unwrap();
    let path = write_file(dir.path(), "doc.txt", b"v1");
    let store = Arc::new(Store::open_in_memory().unwrap());
    let vault = vault_for(&store, dir.path());

    let moved = vault.move_to_trash(&path).unwrap();
    fs::write(&path, b"v2").unwrap();
    assert_eq!(
        vault.restore_from_trash(&moved.record.id).unwrap(),
        RestoreResult::Conflict(path.clone())
    );

    fs::remove_file(&path).unwrap();
    assert_eq!(
        vault.restore_from_trash(&moved.record.id).unwrap(),
        RestoreResult::Restored(path.clone())
    );
    assert_eq!(fs::read(&path).unwrap(), b"v1");
}

#[test]
fn test_move_without_cache_record() {
    let dir = tempdir().unwrap();
    let path = write_file(dir.path(), "never-scanned.bin", b"data");
    let store = Arc::new(Store::open_in_memory().unwrap());
    let vault = vault_for(&store, dir.path());

    let moved = vault.move_to_trash(&path).unwrap();
    assert_eq!(moved.record.hash, None);
    assert_eq!(moved.record.size, 4);

    vault.restore_from_trash(&moved.record.id).unwrap();
    let cache = FreshnessCache::new(store);
    let record = cache.get(&path_utils::absolute_key(&path)).unwrap().unwrap();
    assert!(!record.hash.is_computed());
}

#[test]
fn test_move_directory_rejected() {
    let dir = tempdir().unwrap();
    let sub = dir.path().join("sub");
    fs::create_dir(&sub).unwrap();
    let store = Arc::new(Store::open_in_memory().unwrap());

    let err = vault_for(&store, dir.path()).move_to_trash(&sub).unwrap_err();
    assert!(matches!(err, TrashError::NotAFile(_)));
}

#[test]
fn test_path_outside_fixed_roots_is_unresolvable() {
    let root = tempdir().unwrap();
    let elsewhere = tempdir().unwrap();
    let path = write_file(elsewhere.path(), "x.bin", b"x");
    let store = Arc::new(Store::open_in_memory().unwrap());

    let err = vault_for(&store, root.path()).move_to_trash(&path).unwrap_err();
    assert!(matches!(err, TrashError::UnresolvableRoot(_)));
    assert!(path.exists());
}

#[test]
fn test_empty_trash_removes_files() {
    let dir = tempdir().unwrap();
    let store = Arc::new(Store::open_in_memory().unwrap());
    let vault = vault_for(&store, dir.path());

    let mut trashed = Vec::new();
    for i in 0..3 {
        let path = write_file(dir.path(), &format!("f{i}"), b"bytes");
        trashed.push(vault.move_to_trash(&path).unwrap().record.trashed_path);
    }
    assert_eq!(vault.entries().unwrap().len(), 3);

    assert_eq!(vault.empty_trash().unwrap(), 3);
    assert!(trashed.iter().all(|p| !p.exists()));
    assert!(vault.entries().unwrap().is_empty());
}
