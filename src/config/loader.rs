use std::path::{Path, PathBuf};

use super::error::ConfigError;
use super::Config;

/// Loads and resolves a [`Config`] from a YAML file on disk. Split out from
/// [`Config::from_yaml`] so callers (the CLI, tests) can point at a path
/// without caring how the bytes got read.
pub struct ConfigLoaderFile {
    path: PathBuf,
}

impl ConfigLoaderFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self) -> Result<Config, ConfigError> {
        let raw = std::fs::read_to_string(&self.path)?;
        Config::from_yaml(&raw)
    }
}
