use super::support::{counting_engine, write_file};
use dupevault::cache::Store;
use dupevault::duplicates::{
    GroupIndex, PageRequest, PagerError, ScanConfig, SnapshotPager, SortDirection, SortKey,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

/// Write `groups` duplicate sets; set `i` has `i + 2` copies of `i + 1` bytes.
fn populate(dir: &Path, groups: usize) {
    for i in 0..groups {
        let content = vec![b'a' + i as u8; i + 1];
        for copy in 0..i + 2 {
            write_file(dir, &format!("g{i}/copy{copy}.bin"), &content);
        }
    }
}

fn scan_and_index(store: &Arc<Store>, dir: &Path) -> u64 {
    let (engine, _) = counting_engine(store, ScanConfig::default());
    engine.scan(&[dir.to_path_buf()]).unwrap();
    let index = GroupIndex::new(Arc::clone(store));
    let version = index.next_version().unwrap();
    index.rebuild_all(version).unwrap();
    version
}

// ==================== Paging Tests ====================

#[test]
fn test_pages_cover_index_exactly_once() {
    let dir = tempdir().unwrap();
    populate(dir.path(), 7);
    let store = Arc::new(Store::open_in_memory().unwrap());
    scan_and_index(&store, dir.path());

    let pager = SnapshotPager::new(store);
    let session = pager.begin().unwrap();
    assert_eq!(session.total, 7);

    for sort in [SortKey::Count, SortKey::TotalBytes, SortKey::Size] {
        for direction in [SortDirection::Ascending, SortDirection::Descending] {
            let full = pager
                .page(
                    session.version,
                    PageRequest::new(100).sorted_by(sort, direction),
                )
                .unwrap();
            let mut paged = Vec::new();
            for offset in (0..session.total).step_by(3) {
                let request = PageRequest::new(3).sorted_by(sort, direction).at(offset);
                paged.extend(pager.page(session.version, request).unwrap());
            }
            assert_eq!(paged, full, "{sort:?} {direction:?}");
        }
    }
}

#[test]
fn test_sort_by_count_descending() {
    let dir = tempdir().unwrap();
    populate(dir.path(), 4);
    let store = Arc::new(Store::open_in_memory().unwrap());
    scan_and_index(&store, dir.path());

    let pager = SnapshotPager::new(store);
    let session = pager.begin().unwrap();
    let rows = pager.page(session.version, PageRequest::new(10)).unwrap();
    let counts: Vec<u64> = rows.iter().map(|r| r.member_count).collect();
    assert_eq!(counts, vec![5, 4, 3, 2]);
}

#[test]
fn test_rescan_rebuild_expires_reader() {
    let dir = tempdir().unwrap();
    populate(dir.path(), 3);
    let store = Arc::new(Store::open_in_memory().unwrap());
    let first = scan_and_index(&store, dir.path());

    let pager = SnapshotPager::new(Arc::clone(&store));
    let session = pager.begin().unwrap();
    assert_eq!(session.version, first);
    pager.page(session.version, PageRequest::new(1)).unwrap();

    let second = scan_and_index(&store, dir.path());
    assert!(second > first);

    let err = pager
        .page(session.version, PageRequest::new(1).at(1))
        .unwrap_err();
    assert!(matches!(err, PagerError::SnapshotExpired { .. }));

    let fresh = pager.begin().unwrap();
    assert_eq!(fresh.version, second);
    assert_eq!(fresh.total, 3);
}

#[test]
fn test_hide_empty_groups() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "e1", b"");
    write_file(dir.path(), "e2", b"");
    write_file(dir.path(), "x1", b"x");
    write_file(dir.path(), "x2", b"x");

    let store = Arc::new(Store::open_in_memory().unwrap());
    // Empty files are cached only when explicitly included.
    let (engine, _) = counting_engine(
        &store,
        ScanConfig::default().with_exclude_empty_from_cache(false),
    );
    engine.scan(&[dir.path().to_path_buf()]).unwrap();
    GroupIndex::new(Arc::clone(&store)).rebuild_all(1).unwrap();

    let shown = SnapshotPager::new(Arc::clone(&store)).begin().unwrap();
    assert_eq!(shown.total, 2);

    let pager = SnapshotPager::new(store).with_hide_empty(true);
    let hidden = pager.begin().unwrap();
    assert_eq!(hidden.total, 1);
    let rows = pager.page(hidden.version, PageRequest::new(10)).unwrap();
    assert!(rows.iter().all(|r| r.size > 0));
}
