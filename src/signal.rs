//! Signal handling for graceful shutdown.
//!
//! Ctrl+C sets a shared `AtomicBool`. The scan engine, walker and hasher
//! poll that flag, so a cancelled scan stops at the next file or directory
//! and never persists partial results.
//!
//! ```rust,no_run
//! use dupevault::duplicates::ScanConfig;
//! use dupevault::signal::install_handler;
//!
//! let handler = install_handler();
//! let config = ScanConfig::default().with_shutdown_flag(handler.get_flag());
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Shared shutdown flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandler {
    /// Create a handler with no shutdown requested.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if shutdown has been requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Request a shutdown.
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Get a clone of the flag for the scan engine and its workers.
    #[must_use]
    pub fn get_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Clear the flag.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

static GLOBAL_HANDLER: OnceLock<ShutdownHandler> = OnceLock::new();

/// Install the Ctrl+C hook once per process and return its handler.
///
/// Later calls return the same handler with the flag cleared. If the hook
/// cannot be installed (another one is registered, as in tests), an
/// unhooked handler is returned; it still honours `request_shutdown`.
pub fn install_handler() -> ShutdownHandler {
    let handler = GLOBAL_HANDLER
        .get_or_init(|| {
            let handler = ShutdownHandler::new();
            let flag = handler.get_flag();
            let installed = ctrlc::set_handler(move || {
                flag.store(true, Ordering::SeqCst);
                let _ = writeln!(std::io::stderr(), "\nInterrupted. Cleaning up...");
                let _ = std::io::stderr().flush();
                log::info!("Shutdown signal received");
            });
            if let Err(e) = installed {
                log::debug!("Ctrl+C handler not installed, using unhooked handler: {}", e);
            }
            handler
        })
        .clone();
    handler.reset();
    handler
}
