//! File actions module.
//!
//! # Trash
//!
//! The trash module relocates files into a hidden directory at the root
//! of their volume and keeps the cache and duplicate index consistent:
//! - Move to trash (rename, or copy + delete across devices)
//! - Restore with conflict detection
//! - Permanent deletion and emptying
//!
//! ```no_run
//! use dupevault::actions::{RestoreResult, TrashVault};
//! use dupevault::cache::Store;
//! use dupevault::scanner::DeviceBoundaryResolver;
//! use std::sync::Arc;
//!
//! let store = Arc::new(Store::open_in_memory().unwrap());
//! let vault = TrashVault::new(store, Arc::new(DeviceBoundaryResolver::new()));
//! match vault.restore_from_trash("3f2a9c0d11e4b7a8") {
//!     Ok(RestoreResult::Conflict(path)) => eprintln!("{} is occupied", path.display()),
//!     Ok(_) => {}
//!     Err(e) => eprintln!("Restore failed: {}", e),
//! }
//! ```

pub mod trash;

pub use trash::{MoveResult, RestoreResult, TrashError, TrashRecord, TrashVault, DEFAULT_TRASH_DIR};
