mod loader;
mod schema;

pub use loader::{load_config, parse_config, validate_config, MAX_RATE_LIMIT_DELAY_MS};
pub use schema::*;

use anyhow::Result;
use std::path::{Path, PathBuf};

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        loader::load_config(path)
    }

    /// Load from `path` if given, else from the default location, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(default_path) if default_path.exists() => Self::load(default_path),
            _ => Ok(Self::default()),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".redteam-kit").join("config.yaml"))
    }
}
