use proptest::prelude::*;
use dupevault::cache::{FileRecord, FreshnessCache, HashState, Store};
use dupevault::duplicates::{
    group_by_hash, group_by_size, GroupIndex, PageRequest, SnapshotPager, SortDirection, SortKey,
};
use dupevault::scanner::hasher::Hasher;
use dupevault::scanner::path_utils::{normalize_path_str, path_key};
use dupevault::scanner::FileEntry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn sort_strategy() -> impl Strategy<Value = (SortKey, SortDirection)> {
    (
        prop_oneof![
            Just(SortKey::Count),
            Just(SortKey::TotalBytes),
            Just(SortKey::Size)
        ],
        prop_oneof![Just(SortDirection::Ascending), Just(SortDirection::Descending)],
    )
}

proptest! {
    #[test]
    fn test_hash_determinism(content in "\\PC*") {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.bin");
        std::fs::write(&path, content.as_bytes()).unwrap();

        let hasher = Hasher::new();
        let hash1 = hasher.full_hash(&path).unwrap();
        let hash2 = hasher.full_hash(&path).unwrap();

        prop_assert_eq!(hash1, hash2);
        prop_assert_eq!(hash1, hasher.hash_bytes(content.as_bytes()));
    }

    #[test]
    fn test_normalization_idempotent(
        absolute in any::<bool>(),
        segments in prop::collection::vec("[a-zCé\u{301}.:\\\\]{1,6}", 1..6),
    ) {
        let joined = segments.join("/");
        let path = if absolute { format!("/{joined}") } else { joined };
        let once = normalize_path_str(&path);
        prop_assert_eq!(normalize_path_str(&once), once.clone());
        prop_assert!(!once.ends_with('/') || once == "/" || once.ends_with(":/"));
    }

    #[test]
    fn test_backslashes_match_forward_slashes(segments in prop::collection::vec("[a-zA-Z0-9.:_-]{1,8}", 1..6)) {
        let forward = segments.join("/");
        let backward = forward.replace('/', "\\");
        prop_assert_eq!(normalize_path_str(&forward), normalize_path_str(&backward));
    }

    #[test]
    fn test_redundant_separators_do_not_change_key(segments in prop::collection::vec("[a-z0-9]{1,8}", 1..6)) {
        let clean = format!("/{}", segments.join("/"));
        let noisy = format!("//{}/", segments.join("//./"));
        prop_assert_eq!(path_key(Path::new(&clean)), path_key(Path::new(&noisy)));
    }

    #[test]
    fn test_group_by_size_invariants(sizes in prop::collection::vec(0u64..1000, 0..50)) {
        let entries: Vec<FileEntry> = sizes.iter().enumerate().map(|(i, &size)| {
            FileEntry::new(PathBuf::from(format!("/fake/path/{i}")), size, SystemTime::now())
        }).collect();

        let (buckets, stats) = group_by_size(entries.clone());

        // Invariant: all files in a bucket have the bucket size
        for (size, files) in &buckets {
            for file in files {
                prop_assert_eq!(file.size, *size);
            }
        }
        prop_assert_eq!(stats.total_files, entries.len());

        // Invariant: candidates = files in buckets of two or more
        let candidates: usize = buckets.values().filter(|v| v.len() > 1).map(Vec::len).sum();
        prop_assert_eq!(stats.candidates, candidates);
    }

    #[test]
    fn test_group_by_hash_only_multi_member_sets(specs in prop::collection::vec((1u64..4, 0u8..3), 0..30)) {
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1);
        let records: Vec<FileRecord> = specs.iter().enumerate().map(|(i, &(size, h))| {
            FileRecord::new(Path::new(&format!("/r/{i}")), size, mtime, HashState::Computed([h; 32]))
        }).collect();

        let groups = group_by_hash(&records);
        let grouped: usize = groups.iter().map(|g| g.len()).sum();
        for group in &groups {
            prop_assert!(group.len() >= 2);
            prop_assert!(group.files.iter().all(|f| f.size == group.size && f.digest() == Some(&group.hash)));
        }
        prop_assert!(grouped <= records.len());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_page_concatenation_matches_full_fetch(
        specs in prop::collection::vec((0u64..5, 0u8..6), 0..60),
        page_sizes in prop::collection::vec(1usize..7, 1..5),
        (sort, direction) in sort_strategy(),
    ) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1);
        let records: Vec<FileRecord> = specs.iter().enumerate().map(|(i, &(size, h))| {
            FileRecord::new(Path::new(&format!("/p/{i}")), size, mtime, HashState::Computed([h; 32]))
        }).collect();
        FreshnessCache::new(Arc::clone(&store)).upsert_all(&records).unwrap();
        GroupIndex::new(Arc::clone(&store)).rebuild_all(1).unwrap();

        let pager = SnapshotPager::new(store);
        let session = pager.begin().unwrap();
        let full = pager
            .page(session.version, PageRequest::new(session.total).sorted_by(sort, direction))
            .unwrap();
        prop_assert_eq!(full.len(), session.total);

        let mut paged = Vec::new();
        // Page sizes vary from one request to the next.
        let mut sizes = page_sizes.iter().copied().cycle();
        let mut offset = 0;
        loop {
            let page_size = sizes.next().unwrap_or(1);
            let request = PageRequest::new(page_size).sorted_by(sort, direction).at(offset);
            let page = pager.page(session.version, request).unwrap();
            if page.is_empty() {
                break;
            }
            offset += page.len();
            paged.extend(page);
        }
        prop_assert_eq!(paged, full);
    }
}
