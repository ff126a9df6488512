//! # tdg-config
//!
//! Settings for treedigest.
//!
//! Resolution order: built-in defaults → `~/.treedigest/config.toml` (if
//! present) → command-line flags. The file carries the same knobs the flags
//! do, so a machine-wide digest selection or exclusion list only has to be
//! written down once.

pub mod logging;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const REPORT_PREFIX: &str = "treedigest";
pub const REPORT_EXT: &str = "thd";

pub const DEFAULT_BLOCK_SIZE_MB: u64 = 16;
pub const DEFAULT_BUFFERS: usize = 4;

pub const DEFAULT_DIGESTS: &[&str] = &["md5", "sha1", "sha256", "sha3_256"];

pub const DEFAULT_EXCLUDED_FILES: &[&str] = &["/pagefile.sys", "/hiberfil.sys"];

pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    "/$Recycle.Bin",
    "/Recycled",
    "/Recycler",
    "/System Volume Information",
    "/Temp",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("block size must be >= 1 MB and < 1024 MB (got {0})")]
    BlockSize(u64),

    #[error("number of buffers must be >= 2 and <= 32 (got {0})")]
    Buffers(usize),

    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Tunables shared by the config file and the command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Digests to run, in report order.
    pub digests: Vec<String>,
    /// Block size in megabytes (1..1024).
    pub blocksize_mb: u64,
    /// Buffer-pool size (2..=32).
    pub buffers: usize,
    /// Back the pool with shared-memory mappings.
    pub shm: bool,
    /// Case-insensitive exclusion matching.
    pub nocase: bool,
    pub excluded_files: Vec<String>,
    pub excluded_dirs: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            digests: DEFAULT_DIGESTS.iter().map(|s| s.to_string()).collect(),
            blocksize_mb: DEFAULT_BLOCK_SIZE_MB,
            buffers: DEFAULT_BUFFERS,
            shm: true,
            nocase: false,
            excluded_files: DEFAULT_EXCLUDED_FILES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            excluded_dirs: DEFAULT_EXCLUDED_DIRS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Settings {
    /// Defaults overlaid with the global config file, when one exists.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::global_config_path() {
            Some(path) if path.exists() => {
                tracing::debug!(path = %path.display(), "loading global config");
                let contents = std::fs::read_to_string(&path)?;
                Ok(toml::from_str(&contents)?)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".treedigest").join("config.toml"))
    }

    /// Range checks mirrored from the invocation surface.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..1024).contains(&self.blocksize_mb) {
            return Err(ConfigError::BlockSize(self.blocksize_mb));
        }
        if !(2..=32).contains(&self.buffers) {
            return Err(ConfigError::Buffers(self.buffers));
        }
        Ok(())
    }

    pub fn block_size_bytes(&self) -> usize {
        self.blocksize_mb as usize * 1024 * 1024
    }
}
