//! Directory walker with an explicit work stack.
//!
//! # Overview
//!
//! This module provides the [`Walker`] struct for traversing directories and
//! collecting raw file metadata (path, size, mtime) for the scan engine.
//! Directories are pushed onto a heap-allocated stack instead of being
//! descended recursively, so very deep trees cannot exhaust the call stack.
//!
//! # Features
//!
//! - Cancellation polled at every popped node via an atomic flag
//! - Gitignore-style pattern matching via the `ignore` crate
//! - Caller-supplied ignore predicate
//! - Hidden file filtering
//! - Symlinked files optionally followed; symlinked directories never descended
//!
//! # Example
//!
//! ```no_run
//! use dupevault::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("/home/user/Downloads"), WalkerConfig::default());
//! let mut iter = walker.walk();
//! let files: Vec<_> = iter.by_ref().filter_map(Result::ok).collect();
//! if iter.was_interrupted() {
//!     eprintln!("walk cancelled after {} files", files.len());
//! }
//! ```

use std::collections::VecDeque;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use super::{FileEntry, ScanError, WalkerConfig};

/// Directory walker for file discovery.
#[derive(Debug)]
pub struct Walker {
    /// Root path to walk
    root: PathBuf,
    /// Walker configuration
    config: WalkerConfig,
    /// Optional shutdown flag for graceful termination
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Walker {
    /// Create a new walker for the given path.
    ///
    /// # Arguments
    ///
    /// * `path` - Root directory (or single file) to scan
    /// * `config` - Walker configuration options
    #[must_use]
    pub fn new(path: &Path, config: WalkerConfig) -> Self {
        Self {
            root: path.to_path_buf(),
            config,
            shutdown_flag: None,
        }
    }

    /// Set the shutdown flag for graceful termination.
    ///
    /// The flag is checked before every node is visited.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Check if shutdown has been requested.
    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Build gitignore matcher from config patterns and .gitignore file.
    fn build_gitignore(&self) -> Option<Gitignore> {
        let mut builder = GitignoreBuilder::new(&self.root);

        let gitignore_path = self.root.join(".gitignore");
        if gitignore_path.is_file() {
            if let Some(e) = builder.add(&gitignore_path) {
                log::warn!(
                    "Failed to load .gitignore from {}: {}",
                    gitignore_path.display(),
                    e
                );
            } else {
                log::debug!("Loaded .gitignore from {}", gitignore_path.display());
            }
        }

        for pattern in &self.config.ignore_patterns {
            if let Err(e) = builder.add_line(None, pattern) {
                log::warn!("Invalid ignore pattern '{}': {}", pattern, e);
            }
        }

        match builder.build() {
            Ok(gitignore) if gitignore.is_empty() => None,
            Ok(gitignore) => Some(gitignore),
            Err(e) => {
                log::warn!("Failed to build ignore patterns: {}", e);
                None
            }
        }
    }

    /// Check if a path should be ignored by patterns, name rules or the
    /// caller predicate.
    fn should_ignore(&self, path: &Path, is_dir: bool, gitignore: Option<&Gitignore>) -> bool {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if self.config.skip_hidden && name.starts_with('.') {
            return true;
        }

        if is_dir
            && self
                .config
                .excluded_dir_names
                .iter()
                .any(|excluded| excluded.as_str() == name)
        {
            return true;
        }

        if let Some(gi) = gitignore {
            // Gitignore matching expects forward-slash paths relative to the root.
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            let relative = relative.to_string_lossy().replace('\\', "/");
            if gi.matched_path_or_any_parents(&relative, is_dir).is_ignore() {
                return true;
            }
        }

        self.config
            .ignore
            .as_ref()
            .is_some_and(|predicate| predicate(path, is_dir))
    }

    /// Walk the tree, yielding file entries.
    ///
    /// Errors on individual entries are yielded as [`ScanError`] values
    /// rather than stopping iteration. Children are visited in file name
    /// order.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dupevault::scanner::{Walker, WalkerConfig};
    /// use std::path::Path;
    ///
    /// let walker = Walker::new(Path::new("."), WalkerConfig::default());
    /// let files: Vec<_> = walker.walk().filter_map(Result::ok).collect();
    /// println!("Found {} files", files.len());
    /// ```
    pub fn walk(&self) -> WalkIter<'_> {
        let mut stack = Vec::new();
        stack.push(self.root.clone());
        WalkIter {
            walker: self,
            gitignore: self.build_gitignore(),
            stack,
            pending: VecDeque::new(),
            interrupted: false,
            visited_root: false,
        }
    }

    fn file_entry(path: PathBuf, metadata: &Metadata) -> FileEntry {
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        FileEntry::new(path, metadata.len(), modified)
    }

    fn io_error(path: &Path, error: std::io::Error) -> ScanError {
        match error.kind() {
            std::io::ErrorKind::NotFound => {
                log::debug!("Vanished during walk: {}", path.display());
            }
            _ => log::warn!("Cannot access {}: {}", path.display(), error),
        }
        ScanError::from_io(path, error)
    }
}

/// Lazy iterator over the files under a [`Walker`]'s root.
pub struct WalkIter<'a> {
    walker: &'a Walker,
    gitignore: Option<Gitignore>,
    stack: Vec<PathBuf>,
    pending: VecDeque<Result<FileEntry, ScanError>>,
    interrupted: bool,
    visited_root: bool,
}

impl WalkIter<'_> {
    /// Whether iteration stopped because shutdown was requested.
    #[must_use]
    pub fn was_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Visit one directory, queueing its files and pushing subdirectories.
    fn expand(&mut self, dir: PathBuf) {
        let walker = self.walker;
        let read_dir = match fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(e) => {
                self.pending.push_back(Err(Walker::io_error(&dir, e)));
                return;
            }
        };

        let mut children = Vec::new();
        for entry in read_dir {
            match entry {
                Ok(entry) => children.push(entry),
                Err(e) => self.pending.push_back(Err(Walker::io_error(&dir, e))),
            }
        }
        children.sort_by_key(fs::DirEntry::file_name);

        let mut subdirs = Vec::new();
        for child in children {
            let path = child.path();
            let file_type = match child.file_type() {
                Ok(ft) => ft,
                Err(e) => {
                    self.pending.push_back(Err(Walker::io_error(&path, e)));
                    continue;
                }
            };

            if file_type.is_dir() {
                if walker.should_ignore(&path, true, self.gitignore.as_ref()) {
                    log::trace!("Ignoring directory: {}", path.display());
                } else {
                    subdirs.push(path);
                }
                continue;
            }

            if walker.should_ignore(&path, false, self.gitignore.as_ref()) {
                log::trace!("Ignoring file: {}", path.display());
                continue;
            }

            let metadata = if file_type.is_symlink() {
                if !walker.config.follow_symlinks {
                    log::trace!("Skipping symlink: {}", path.display());
                    continue;
                }
                fs::metadata(&path)
            } else {
                child.metadata()
            };

            match metadata {
                Ok(m) if m.is_file() => self.pending.push_back(Ok(Walker::file_entry(path, &m))),
                Ok(_) => log::trace!("Skipping non-regular entry: {}", path.display()),
                Err(e) => self.pending.push_back(Err(Walker::io_error(&path, e))),
            }
        }

        // Reverse so the first subdirectory in name order is popped first.
        self.stack.extend(subdirs.into_iter().rev());
    }

    /// Handle the root node, which may be a file rather than a directory.
    fn visit_root(&mut self, root: PathBuf) {
        match fs::metadata(&root) {
            Ok(m) if m.is_dir() => self.expand(root),
            Ok(m) if m.is_file() => self.pending.push_back(Ok(Walker::file_entry(root, &m))),
            Ok(_) => {}
            Err(e) => self.pending.push_back(Err(Walker::io_error(&root, e))),
        }
    }
}

impl Iterator for WalkIter<'_> {
    type Item = Result<FileEntry, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.interrupted {
                return None;
            }
            if self.walker.is_shutdown_requested() {
                log::debug!("Walker: Shutdown requested, stopping iteration");
                self.interrupted = true;
                self.pending.clear();
                self.stack.clear();
                return None;
            }
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }
            let dir = self.stack.pop()?;
            if self.visited_root {
                self.expand(dir);
            } else {
                self.visited_root = true;
                self.visit_root(dir);
            }
        }
    }
}
