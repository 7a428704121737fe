//! Configuration: the external-loader contract the engine is built around.
//!
//! A [`Config`] is the fully resolved, ready-to-run form of a YAML file on
//! disk: child commands with signal names and user/group already resolved,
//! and the process-wide `global` settings alongside them.

pub mod child;
pub mod error;
pub mod global;
pub mod listen;
pub mod loader;
pub mod signal;

use std::collections::HashMap;

use child::{ChildConfig, ChildEntry};
use error::ConfigError;
use global::GlobalConfig;

/// The supervisor's fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub children: HashMap<String, ChildConfig>,
    pub global: GlobalConfig,
}

/// The as-written shape of a config file: `run` (mandatory, non-empty) and
/// an optional `global` block.
#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    run: HashMap<String, ChildEntry>,
    #[serde(default)]
    global: GlobalConfig,
}

impl Config {
    /// Parses and resolves a config file's contents. Fails fast: an empty
    /// `run`, an unresolvable user/group, an unknown signal name, or a
    /// malformed `global.listen` all surface here rather than at the
    /// engine's first use of the offending field.
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(raw)?;
        if raw.run.is_empty() {
            return Err(ConfigError::EmptyRun);
        }

        let mut children = HashMap::with_capacity(raw.run.len());
        for (name, entry) in raw.run {
            let resolved = ChildConfig::resolve(name.clone(), entry)?;
            children.insert(name, resolved);
        }

        Ok(Config {
            children,
            global: raw.global,
        })
    }
}
