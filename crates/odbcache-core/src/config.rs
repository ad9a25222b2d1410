//! Dev-server settings
//!
//! Defaults match the layout of the front-end project: an environment table
//! and the working `conf.json` under `public/`, the default config under
//! `conf/`, and an optional developer override at the project root. Settings
//! may be overridden from a TOML file; relative paths resolve against the
//! project root.

use crate::cache::CacheConfig;
use crate::error::{CoreError, Result};
use crate::propagate::WatchSet;
use crate::watcher::WatcherConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File locations used by the cache and the propagator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Environment table (`hostName` -> `odbRestURI`)
    pub environments: PathBuf,

    /// Authoritative default config
    pub default_config: PathBuf,

    /// Optional developer override; preferred when present
    pub local_override: PathBuf,

    /// Copy the running server actually serves
    pub working_config: PathBuf,

    /// Directory served as static files
    pub public_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            environments: PathBuf::from("public/environments.conf.json"),
            default_config: PathBuf::from("conf/dev.conf.json"),
            local_override: PathBuf::from("local.conf.json"),
            working_config: PathBuf::from("public/conf.json"),
            public_dir: PathBuf::from("public"),
        }
    }
}

impl PathsConfig {
    /// Make every relative path absolute with respect to `root`
    pub fn resolve_against(&self, root: &Path) -> Self {
        let abs = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                root.join(p)
            }
        };

        Self {
            environments: abs(&self.environments),
            default_config: abs(&self.default_config),
            local_override: abs(&self.local_override),
            working_config: abs(&self.working_config),
            public_dir: abs(&self.public_dir),
        }
    }

    /// The authoritative configuration sources
    pub fn watch_set(&self) -> WatchSet {
        WatchSet::new([self.local_override.clone(), self.default_config.clone()])
    }
}

/// Top-level dev-server settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DevServerConfig {
    pub paths: PathsConfig,
    pub cache: CacheConfig,
    pub watcher: WatcherConfig,
}

impl DevServerConfig {
    /// Parse settings from TOML text; missing keys keep their defaults
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| CoreError::InvalidConfig {
            message: e.to_string(),
        })
    }

    /// Load settings from `path`, or defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let text = std::fs::read_to_string(path).map_err(|e| CoreError::InvalidConfig {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;

        let config = Self::from_toml(&text)?;
        debug!(path = %path.display(), "Loaded settings file");
        Ok(config)
    }

    /// Resolve all paths against the project root
    pub fn rooted_at(mut self, root: &Path) -> Self {
        self.paths = self.paths.resolve_against(root);
        self
    }
}
