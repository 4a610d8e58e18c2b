//! Shared fixtures for integration tests.

use dupevault::cache::{FreshnessCache, Store};
use dupevault::duplicates::{ScanConfig, ScanEngine};
use dupevault::scanner::{ContentHasher, Hash, HashError, Hasher};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Hasher wrapper recording every path it hashes.
pub struct CountingHasher {
    inner: Hasher,
    calls: Mutex<Vec<PathBuf>>,
}

impl CountingHasher {
    pub fn new() -> Self {
        Self {
            inner: Hasher::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn hashed(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }

    pub fn reset(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl ContentHasher for CountingHasher {
    fn hash_file(&self, path: &Path) -> Result<Hash, HashError> {
        self.calls.lock().unwrap().push(path.to_path_buf());
        self.inner.hash_file(path)
    }
}

/// Engine over `store` that counts hash work.
pub fn counting_engine(store: &Arc<Store>, config: ScanConfig) -> (ScanEngine, Arc<CountingHasher>) {
    let hasher = Arc::new(CountingHasher::new());
    let engine = ScanEngine::new(
        FreshnessCache::new(Arc::clone(store)),
        Arc::clone(&hasher) as Arc<dyn ContentHasher>,
        config,
    );
    (engine, hasher)
}

pub fn write_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}
