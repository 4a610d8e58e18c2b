//! Storage volume root resolution.
//!
//! The trash vault keeps one trash directory per storage volume so that a
//! move to trash is a cheap rename rather than a cross-device copy. A
//! [`VolumeResolver`] maps any file path to the top-level directory of the
//! volume holding it.

use std::path::{Path, PathBuf};

use super::path_utils;

/// Resolve the owning volume root of a path.
pub trait VolumeResolver: Send + Sync {
    /// Return the root of the volume holding `path`, or `None` if it cannot
    /// be determined.
    fn volume_root(&self, path: &Path) -> Option<PathBuf>;
}

/// Resolver that walks up from a path while the device id stays the same.
///
/// On non-Unix platforms the path prefix (drive or share) is used.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceBoundaryResolver;

impl DeviceBoundaryResolver {
    /// Create a new resolver.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl VolumeResolver for DeviceBoundaryResolver {
    #[cfg(unix)]
    fn volume_root(&self, path: &Path) -> Option<PathBuf> {
        use std::os::unix::fs::MetadataExt;

        let path = std::fs::canonicalize(path).ok()?;
        let device = std::fs::metadata(&path).ok()?.dev();

        let mut root = path.clone();
        for ancestor in path.ancestors().skip(1) {
            match std::fs::metadata(ancestor) {
                Ok(m) if m.dev() == device => root = ancestor.to_path_buf(),
                _ => break,
            }
        }
        // A plain file can never be a volume root.
        if root.is_file() {
            return root.parent().map(Path::to_path_buf);
        }
        Some(root)
    }

    #[cfg(not(unix))]
    fn volume_root(&self, path: &Path) -> Option<PathBuf> {
        use std::path::Component;

        let path = std::path::absolute(path).ok()?;
        let mut root = PathBuf::new();
        for component in path.components() {
            match component {
                Component::Prefix(_) | Component::RootDir => root.push(component.as_os_str()),
                _ => break,
            }
        }
        (!root.as_os_str().is_empty()).then_some(root)
    }
}

/// Resolver over an explicit list of volume roots.
///
/// The longest root that contains the path wins. Paths outside every root
/// are unresolvable.
#[derive(Debug, Clone, Default)]
pub struct FixedRootsResolver {
    roots: Vec<(String, PathBuf)>,
}

impl FixedRootsResolver {
    /// Create a resolver from a list of root directories.
    #[must_use]
    pub fn new(roots: Vec<PathBuf>) -> Self {
        let mut roots: Vec<(String, PathBuf)> = roots
            .into_iter()
            .map(|root| {
                let resolved = std::fs::canonicalize(&root).unwrap_or(root);
                (path_utils::absolute_key(&resolved), resolved)
            })
            .collect();
        roots.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { roots }
    }

    /// Number of configured roots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// Whether no roots are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

impl VolumeResolver for FixedRootsResolver {
    fn volume_root(&self, path: &Path) -> Option<PathBuf> {
        let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let key = path_utils::absolute_key(&resolved);
        self.roots
            .iter()
            .find(|(root_key, _)| path_utils::key_is_under(&key, root_key))
            .map(|(_, root)| root.clone())
    }
}
