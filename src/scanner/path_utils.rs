//! Path canonicalization for cache keys.
//!
//! Every path that reaches the freshness cache, the duplicate index or the
//! trash tables is reduced to a canonical string first, so that the same file
//! seen through slightly different spellings maps to one record.
//!
//! # Rules
//!
//! - Backslashes become forward slashes.
//! - The string is normalized to Unicode NFC. macOS reports file names in NFD
//!   (decomposed) form while Linux and Windows usually use NFC, so the same
//!   visual name can have two byte representations:
//!   - NFC: `café.txt` - 'é' is U+00E9 (single code point)
//!   - NFD: `café.txt` - 'e' U+0065 + combining acute accent U+0301
//! - Empty and `.` segments are dropped, `..` is resolved lexically.
//! - Trailing separators are removed (except for the root itself).
//!
//! Canonicalization is purely lexical: it never touches the filesystem and
//! never resolves symlinks. It is idempotent.
//!
//! # Example
//!
//! ```
//! use dupevault::scanner::path_utils::{normalize_path_str, paths_equal};
//!
//! assert_eq!(normalize_path_str("C:\\photos\\.\\2024\\"), "C:/photos/2024");
//! assert!(paths_equal("/data/cafe\u{0301}.txt", "/data//café.txt"));
//! ```

use std::path::{Path, PathBuf};
use unicode_normalization::UnicodeNormalization;

/// Normalize a path string to its canonical form.
///
/// # Example
///
/// ```
/// use dupevault::scanner::path_utils::normalize_path_str;
///
/// let once = normalize_path_str("/a/b/../c/./d.txt");
/// assert_eq!(once, "/a/c/d.txt");
/// assert_eq!(normalize_path_str(&once), once);
/// ```
#[must_use]
pub fn normalize_path_str(s: &str) -> String {
    let slashed = s.replace('\\', "/");
    let composed: String = slashed.nfc().collect();

    let absolute = composed.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    // A leading drive letter ("C:") behaves like a root that `..` cannot pop.
    // It counts as leading if nothing is kept before it, so "./C:" and "C:"
    // agree.
    let mut prefix: Option<&str> = None;

    for segment in composed.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if absolute || prefix.is_some() => {}
                _ => segments.push(".."),
            },
            s if !absolute
                && prefix.is_none()
                && segments.is_empty()
                && is_drive_prefix(s) =>
            {
                prefix = Some(s);
            }
            s => segments.push(s),
        }
    }

    let body = segments.join("/");
    match (prefix, absolute) {
        (Some(drive), _) if body.is_empty() => format!("{drive}/"),
        (Some(drive), _) => format!("{drive}/{body}"),
        (None, true) => format!("/{body}"),
        (None, false) if body.is_empty() => ".".to_string(),
        (None, false) => body,
    }
}

fn is_drive_prefix(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Normalize a [`Path`] into a canonical [`PathBuf`].
///
/// Paths that are not valid UTF-8 are converted lossily first.
#[must_use]
pub fn normalize_pathbuf(path: &Path) -> PathBuf {
    PathBuf::from(path_key(path))
}

/// Check if two path strings name the same canonical path.
#[must_use]
pub fn paths_equal(a: &str, b: &str) -> bool {
    normalize_path_str(a) == normalize_path_str(b)
}

/// Check if a string is already in NFC form.
#[must_use]
pub fn is_nfc(s: &str) -> bool {
    unicode_normalization::is_nfc(s)
}

/// Canonical cache key for a path.
///
/// This is the key used by every persisted table.
///
/// # Example
///
/// ```
/// use std::path::Path;
/// use std::collections::HashSet;
/// use dupevault::scanner::path_utils::path_key;
///
/// let mut seen = HashSet::new();
/// seen.insert(path_key(Path::new("/data/café.txt")));
/// assert!(seen.contains(&path_key(Path::new("/data/./cafe\u{0301}.txt"))));
/// ```
#[must_use]
pub fn path_key(path: &Path) -> String {
    normalize_path_str(&path.to_string_lossy())
}

/// Canonical key of `path` made absolute against the current directory.
///
/// Falls back to the plain lexical key when the working directory cannot be
/// determined.
#[must_use]
pub fn absolute_key(path: &Path) -> String {
    match std::path::absolute(path) {
        Ok(abs) => path_key(&abs),
        Err(e) => {
            log::debug!("Could not absolutize {}: {}", path.display(), e);
            path_key(path)
        }
    }
}

/// Whether canonical key `key` lies at or below canonical key `root`.
#[must_use]
pub fn key_is_under(key: &str, root: &str) -> bool {
    if key == root {
        return true;
    }
    let root = root.trim_end_matches('/');
    key.len() > root.len() && key.starts_with(root) && key.as_bytes()[root.len()] == b'/'
}
