//! Command-line interface definitions for dupevault.
//!
//! This module defines all CLI arguments, subcommands, and options using the clap derive API.
//! Global options (verbosity, color, config and database paths) apply to every subcommand.
//!
//! # Example
//!
//! ```bash
//! # Scan two directories and rebuild the duplicate index
//! dupevault scan ~/Pictures /mnt/backup/Pictures
//!
//! # List duplicate groups by reclaimable bytes, smallest first
//! dupevault groups --sort bytes --asc
//!
//! # Move a copy to the trash of its volume, then restore it
//! dupevault trash move ~/Pictures/copy.jpg
//! dupevault trash restore 3f2a9c0d11e4b7a8
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::duplicates::{SortDirection, SortKey};

/// Incremental duplicate file finder with a pageable duplicate index.
///
/// dupevault finds duplicate files using content hashing (BLAKE3), reuses
/// hashes across scans while files are unchanged, and moves unwanted copies
/// to a per-volume trash that can be restored.
#[derive(Debug, Parser)]
#[command(name = "dupevault")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Print errors as JSON objects on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Path to the configuration file
    ///
    /// If not specified, a default platform-specific path is used.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Path to the database
    ///
    /// Overrides `database_path` from the configuration.
    #[arg(long, global = true, value_name = "FILE")]
    pub db: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands for dupevault.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan directories for duplicate files and rebuild the index
    Scan(ScanArgs),
    /// List duplicate groups from the index
    Groups(GroupsArgs),
    /// Manage the per-volume trash
    #[command(subcommand)]
    Trash(TrashCommand),
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Directories to scan
    #[arg(value_name = "ROOT", required = true)]
    pub roots: Vec<PathBuf>,

    /// Glob patterns to ignore (can be specified multiple times)
    ///
    /// These patterns are added to the configured patterns and to any
    /// .gitignore found at a root.
    #[arg(short, long = "ignore", value_name = "PATTERN")]
    pub ignore_patterns: Vec<String>,

    /// Skip hidden files and directories (starting with .)
    #[arg(long)]
    pub skip_hidden: bool,

    /// Follow symbolic links to files
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Number of I/O threads for hashing (default: 4)
    ///
    /// Lower values reduce disk thrashing on HDDs.
    #[arg(long, value_name = "N")]
    pub io_threads: Option<usize>,

    /// Abort on the first unreadable entry instead of skipping it
    #[arg(long)]
    pub strict: bool,

    /// Also cache records for empty files
    #[arg(long)]
    pub include_empty: bool,

    /// Remove cached records for files that no longer exist under the roots
    #[arg(long)]
    pub prune: bool,
}

/// Arguments for the groups subcommand.
#[derive(Debug, Args)]
pub struct GroupsArgs {
    /// Sort column
    #[arg(long, value_enum, default_value = "count")]
    pub sort: SortArg,

    /// Sort ascending instead of descending
    #[arg(long)]
    pub asc: bool,

    /// Number of groups fetched per page
    #[arg(long, value_name = "N", default_value = "50")]
    pub page_size: usize,

    /// Stop after this many groups
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    /// Include groups of empty files
    #[arg(long)]
    pub show_empty: bool,
}

impl GroupsArgs {
    /// Sort direction selected by `--asc`.
    #[must_use]
    pub fn direction(&self) -> SortDirection {
        if self.asc {
            SortDirection::Ascending
        } else {
            SortDirection::Descending
        }
    }
}

/// Trash subcommands.
#[derive(Debug, Subcommand)]
pub enum TrashCommand {
    /// Move files to the trash of their volume
    Move {
        /// Files to move
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,
    },
    /// Restore a trashed file to its original path
    Restore {
        /// Trash entry id
        #[arg(value_name = "ID")]
        id: String,
    },
    /// List trash entries, newest first
    List,
    /// Permanently delete one trash entry
    Delete {
        /// Trash entry id
        #[arg(value_name = "ID")]
        id: String,
    },
    /// Permanently delete every trash entry
    Empty,
}

/// Sort column for the groups listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortArg {
    /// Number of files in the group
    Count,
    /// Total bytes across the group
    Bytes,
    /// Size of one file
    Size,
}

impl From<SortArg> for SortKey {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Count => SortKey::Count,
            SortArg::Bytes => SortKey::TotalBytes,
            SortArg::Size => SortKey::Size,
        }
    }
}

impl std::fmt::Display for SortArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortArg::Count => write!(f, "count"),
            SortArg::Bytes => write!(f, "bytes"),
            SortArg::Size => write!(f, "size"),
        }
    }
}
