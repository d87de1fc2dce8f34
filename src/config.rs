//! Cache configuration
//!
//! Defaults come from the XDG cache directory and the built-in TTL; command
//! line flags override them.

use directories::ProjectDirs;
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::{FileStore, DEFAULT_TTL, STORAGE_KEY};
use crate::cli::Cli;

/// Where and how long the response cache keeps its entries
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Directory holding the snapshot file, `None` when no home directory exists
    pub cache_dir: Option<PathBuf>,
    /// Storage key the snapshot is written under
    pub storage_key: String,
    /// TTL applied by `set` when the caller does not pass one
    pub default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: ProjectDirs::from("", "", "datescape")
                .map(|dirs| dirs.cache_dir().to_path_buf()),
            storage_key: STORAGE_KEY.to_string(),
            default_ttl: DEFAULT_TTL,
        }
    }
}

impl CacheConfig {
    /// Applies `--cache-dir` and `--ttl-secs` on top of the defaults
    pub fn from_cli(cli: &Cli) -> Self {
        let mut config = Self::default();
        if let Some(dir) = &cli.cache_dir {
            config.cache_dir = Some(dir.clone());
        }
        if let Some(secs) = cli.ttl_secs {
            config.default_ttl = Duration::from_secs(secs);
        }
        config
    }

    /// File-backed store for the configured directory
    pub fn file_store(&self) -> Option<FileStore> {
        self.cache_dir.clone().map(FileStore::with_dir)
    }
}
