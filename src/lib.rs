//! dupevault - Incremental Duplicate File Finder
//!
//! Finds duplicate files by size and BLAKE3 content hash while reusing
//! hashes across scans for files whose size and mtime are unchanged. Results
//! are persisted as a duplicate group index that can be paged at a pinned
//! version, and unwanted copies can be moved to a per-volume trash.

pub mod actions;
pub mod cache;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod progress;
pub mod scanner;
pub mod signal;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytesize::ByteSize;
use yansi::Paint;

use crate::actions::{RestoreResult, TrashVault};
use crate::cache::{FreshnessCache, Store};
use crate::cli::{Cli, Commands, GroupsArgs, ScanArgs, TrashCommand};
use crate::config::Config;
use crate::duplicates::{GroupIndex, PageRequest, PagerError, ScanEngine, SnapshotPager};
use crate::error::ExitCode;
use crate::progress::Progress;

/// Run the application for parsed CLI arguments.
///
/// # Errors
///
/// Returns an error if configuration, the database, or the command fails.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    if cli.no_color {
        yansi::disable();
    }

    let mut config =
        Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(db) = cli.db {
        config.database_path = Some(db);
    }
    let db_path = config.database_path()?;
    let store = Arc::new(
        Store::open(&db_path)
            .with_context(|| format!("Failed to open database {}", db_path.display()))?,
    );
    log::debug!("Using database {}", db_path.display());

    match cli.command {
        Commands::Scan(args) => run_scan(args, config, store, cli.quiet),
        Commands::Groups(args) => run_groups(&args, &config, store),
        Commands::Trash(command) => run_trash(command, &config, store),
    }
}

fn run_scan(args: ScanArgs, mut config: Config, store: Arc<Store>, quiet: bool) -> Result<ExitCode> {
    if let Some(threads) = args.io_threads {
        config.io_threads = threads;
    }
    config.skip_hidden |= args.skip_hidden;
    config.follow_symlinks |= args.follow_symlinks;
    config.prune_vanished |= args.prune;
    if args.include_empty {
        config.exclude_empty_from_cache = false;
    }
    config.ignore_patterns.extend(args.ignore_patterns);

    let handler = signal::install_handler();
    let scan_config = config
        .scan_config()
        .with_strict(args.strict)
        .with_shutdown_flag(handler.get_flag())
        .with_progress_callback(Arc::new(Progress::new(quiet)));

    let engine =
        ScanEngine::with_default_hasher(FreshnessCache::new(Arc::clone(&store)), scan_config);
    let result = engine.scan(&args.roots).context("Scan failed")?;
    let summary = &result.summary;

    if summary.interrupted {
        println!("{}", "Scan interrupted; nothing was saved.".yellow());
        return Ok(ExitCode::Interrupted);
    }

    let index = GroupIndex::new(store);
    let version = index.next_version()?;
    let groups = index
        .rebuild_all(version)
        .context("Failed to rebuild duplicate index")?;

    println!(
        "Scanned {} files ({}) in {:.2?}",
        summary.total_files.bold(),
        summary.total_size_display(),
        summary.scan_duration
    );
    println!(
        "  {} candidates: {} hashed, {} reused, {} unreadable",
        summary.candidates, summary.hashed_files, summary.reused_hashes, summary.failed_files
    );
    println!(
        "  {} duplicate groups, {} redundant files, {} reclaimable",
        summary.duplicate_groups.bold(),
        summary.duplicate_files,
        summary.reclaimable_display().green()
    );
    println!("  Index version {version}: {groups} groups");
    for err in &summary.scan_errors {
        eprintln!("  {} {}", "skipped:".yellow(), err);
    }

    if summary.has_errors() {
        Ok(ExitCode::PartialSuccess)
    } else if result.duplicate_groups.is_empty() {
        Ok(ExitCode::NoDuplicates)
    } else {
        Ok(ExitCode::Success)
    }
}

fn run_groups(args: &GroupsArgs, config: &Config, store: Arc<Store>) -> Result<ExitCode> {
    let pager =
        SnapshotPager::new(store).with_hide_empty(config.hide_empty_files && !args.show_empty);
    let session = pager.begin()?;
    if session.total == 0 {
        println!("No duplicate groups. Run `dupevault scan` first.");
        return Ok(ExitCode::NoDuplicates);
    }

    let wanted = args.limit.map_or(session.total, |l| l.min(session.total));
    let page_size = args.page_size.max(1);
    println!(
        "{:>6}  {:>12}  {:>12}  {}",
        "FILES".bold(),
        "SIZE".bold(),
        "TOTAL".bold(),
        "HASH".bold()
    );

    let mut offset = 0;
    while offset < wanted {
        let request = PageRequest::new(page_size.min(wanted - offset))
            .sorted_by(args.sort.into(), args.direction())
            .at(offset);
        let rows = match pager.page(session.version, request) {
            Ok(rows) => rows,
            Err(e @ PagerError::SnapshotExpired { .. }) => {
                return Err(e).context("The index was rebuilt while listing; run again");
            }
            Err(e) => return Err(e.into()),
        };
        if rows.is_empty() {
            break;
        }
        offset += rows.len();
        for row in rows {
            println!(
                "{:>6}  {:>12}  {:>12}  {}",
                row.member_count,
                ByteSize::b(row.size).to_string(),
                ByteSize::b(row.total_bytes).to_string(),
                &row.hash_hex()[..16]
            );
        }
    }
    println!("{offset} of {} groups at version {}", session.total, session.version);
    Ok(ExitCode::Success)
}

fn run_trash(command: TrashCommand, config: &Config, store: Arc<Store>) -> Result<ExitCode> {
    let vault = TrashVault::new(store, config.volume_resolver())
        .with_dir_name(config.trash.dir_name.clone());

    match command {
        TrashCommand::Move { paths } => move_paths(&vault, &paths),
        TrashCommand::Restore { id } => match vault.restore_from_trash(&id)? {
            RestoreResult::Restored(path) => {
                println!("Restored {}", path.display());
                Ok(ExitCode::Success)
            }
            RestoreResult::Conflict(path) => {
                eprintln!(
                    "{} {} already exists; entry {} kept in trash",
                    "Conflict:".red(),
                    path.display(),
                    id
                );
                Ok(ExitCode::RestoreConflict)
            }
            RestoreResult::Orphaned => {
                println!("Trashed file for {id} was missing; entry removed");
                Ok(ExitCode::Success)
            }
        },
        TrashCommand::List => {
            let entries = vault.entries()?;
            if entries.is_empty() {
                println!("Trash is empty");
            }
            for entry in entries {
                println!(
                    "{}  {}  {:>10}  {}",
                    entry.id.bold(),
                    entry.deleted_at.format("%Y-%m-%d %H:%M:%S"),
                    ByteSize::b(entry.size).to_string(),
                    entry.original_path.display()
                );
            }
            Ok(ExitCode::Success)
        }
        TrashCommand::Delete { id } => {
            let record = vault.delete_permanently(&id)?;
            println!("Permanently deleted {}", record.original_path.display());
            Ok(ExitCode::Success)
        }
        TrashCommand::Empty => {
            let removed = vault.empty_trash()?;
            println!("Removed {removed} trash entries");
            Ok(ExitCode::Success)
        }
    }
}

fn move_paths(vault: &TrashVault, paths: &[PathBuf]) -> Result<ExitCode> {
    let mut failures = Vec::new();
    for path in paths {
        match vault.move_to_trash(path) {
            Ok(moved) => println!("{}  {}", moved.record.id.bold(), path.display()),
            Err(e) => {
                eprintln!("{} {}: {}", "Failed:".red(), path.display(), e);
                failures.push(e);
            }
        }
    }

    if failures.is_empty() {
        Ok(ExitCode::Success)
    } else if failures.len() == paths.len() {
        let first = failures.swap_remove(0);
        Err(first).context("No file was moved to trash")
    } else {
        Ok(ExitCode::PartialSuccess)
    }
}
