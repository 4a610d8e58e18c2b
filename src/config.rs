//! Application configuration management.
//!
//! Settings are layered with figment, later layers winning:
//!
//! 1. Built-in defaults ([`Config::default`])
//! 2. TOML file (`<config dir>/config.toml`, or `--config`)
//! 3. Environment variables prefixed `DUPEVAULT_` (`__` separates nested keys,
//!    e.g. `DUPEVAULT_TRASH__DIR_NAME`)
//! 4. CLI flags, applied by the caller
//!
//! The core never reads settings itself; the values here are turned into
//! a [`ScanConfig`] and a volume resolver and injected.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::actions::DEFAULT_TRASH_DIR;
use crate::duplicates::ScanConfig;
use crate::scanner::{DeviceBoundaryResolver, FixedRootsResolver, VolumeResolver, WalkerConfig};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "DUPEVAULT_";

/// Errors from loading or saving configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// A layer could not be parsed or extracted.
    #[error("Invalid configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// The platform directories could not be determined.
    #[error("Failed to determine project directories")]
    NoProjectDirs,

    /// The configuration could not be serialized.
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The configuration file could not be written.
    #[error("Failed to write {path}: {source}")]
    Write {
        /// File path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Trash settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrashConfig {
    /// Name of the trash directory at each volume root.
    pub dir_name: String,
    /// Explicit volume roots. Empty means detect device boundaries.
    pub volume_roots: Vec<PathBuf>,
}

impl Default for TrashConfig {
    fn default() -> Self {
        Self {
            dir_name: DEFAULT_TRASH_DIR.to_string(),
            volume_roots: Vec::new(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database location. Defaults to the platform data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
    /// Number of hashing threads.
    pub io_threads: usize,
    /// Do not cache records for empty files.
    pub exclude_empty_from_cache: bool,
    /// Hide groups of empty files when listing.
    pub hide_empty_files: bool,
    /// Remove cached records for files that vanished from a scanned root.
    pub prune_vanished: bool,
    /// Skip hidden files and directories.
    pub skip_hidden: bool,
    /// Follow symbolic links to files.
    pub follow_symlinks: bool,
    /// Gitignore-style patterns applied to every scan.
    pub ignore_patterns: Vec<String>,
    /// Trash settings.
    pub trash: TrashConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            io_threads: 4,
            exclude_empty_from_cache: true,
            hide_empty_files: true,
            prune_vanished: false,
            skip_hidden: false,
            follow_symlinks: false,
            ignore_patterns: Vec::new(),
            trash: TrashConfig::default(),
        }
    }
}

impl Config {
    /// Load defaults, then the TOML file, then the environment.
    ///
    /// `path` overrides the default file location. A missing file is not
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if the file or an environment variable
    /// cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_config_path(),
        };
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(ref file) = file {
            log::debug!("Loading configuration from {}", file.display());
            figment = figment.merge(Toml::file(file));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        figment.extract().map_err(|e| ConfigError::Load(Box::new(e)))
    }

    /// Write the configuration as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Default platform-specific configuration file.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Database location: the configured path, else the platform data
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoProjectDirs`] if no path is configured and
    /// the platform directories are unknown.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref path) = self.database_path {
            return Ok(path.clone());
        }
        project_dirs()
            .map(|dirs| dirs.data_dir().join("dupevault.db"))
            .ok_or(ConfigError::NoProjectDirs)
    }

    /// Walker settings. The trash directory is always excluded.
    #[must_use]
    pub fn walker_config(&self) -> WalkerConfig {
        WalkerConfig {
            follow_symlinks: self.follow_symlinks,
            ..WalkerConfig::default()
        }
        .with_skip_hidden(self.skip_hidden)
        .with_ignore_patterns(self.ignore_patterns.clone())
        .with_excluded_dir_name(self.trash.dir_name.clone())
    }

    /// Scan engine settings.
    #[must_use]
    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig::default()
            .with_io_threads(self.io_threads)
            .with_walker_config(self.walker_config())
            .with_exclude_empty_from_cache(self.exclude_empty_from_cache)
            .with_prune_vanished(self.prune_vanished)
    }

    /// Volume resolver for the trash vault.
    #[must_use]
    pub fn volume_resolver(&self) -> Arc<dyn VolumeResolver> {
        if self.trash.volume_roots.is_empty() {
            Arc::new(DeviceBoundaryResolver::new())
        } else {
            Arc::new(FixedRootsResolver::new(self.trash.volume_roots.clone()))
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "dupevault", "dupevault")
}
