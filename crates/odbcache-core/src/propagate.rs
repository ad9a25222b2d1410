//! Config propagation: keep the served working copy in sync with its source
//!
//! On a change to a watched path the propagator picks the authoritative file
//! (the local override when it exists, else the default config), copies it
//! over the working copy, invalidates the metadata cache and only then tells
//! every client to reload. A failed copy aborts the reaction before any
//! invalidation or broadcast.

use crate::cache::MetadataCache;
use crate::config::PathsConfig;
use crate::error::{CoreError, Result};
use crate::event::{DevEvent, EventBus};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, trace};

/// Fixed set of authoritative configuration paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSet {
    paths: Vec<PathBuf>,
}

impl WatchSet {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut unique: Vec<PathBuf> = Vec::new();
        for path in paths {
            if !unique.contains(&path) {
                unique.push(path);
            }
        }
        Self { paths: unique }
    }

    /// Resolve symlinks in each path's parent directory so the set compares
    /// equal to the paths the OS reports in change notifications
    pub fn canonicalized(&self) -> Self {
        Self::new(self.paths.iter().map(|p| canonicalize_parent(p)))
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Distinct parent directories, in watch-set order
    pub fn directories(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = Vec::new();
        for dir in self.paths.iter().filter_map(|p| p.parent()) {
            if !dirs.iter().any(|d| d == dir) {
                dirs.push(dir.to_path_buf());
            }
        }
        dirs
    }
}

fn canonicalize_parent(path: &Path) -> PathBuf {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => parent
            .canonicalize()
            .map(|p| p.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

/// Outcome of handling one change notification
#[derive(Debug)]
pub enum Propagation {
    /// Path is not in the watch set
    Ignored,
    /// Working copy refreshed from `source`, cache invalidated, reload sent
    Propagated { source: PathBuf, clients: usize },
    /// Copy failed; nothing was invalidated or broadcast
    Failed(CoreError),
}

/// Copies the authoritative config into place and keeps dependents coherent
pub struct ConfigPropagator {
    watch_set: WatchSet,
    local_override: PathBuf,
    default_config: PathBuf,
    working_config: PathBuf,
    cache: Arc<MetadataCache>,
    event_bus: EventBus,
}

impl ConfigPropagator {
    pub fn new(paths: &PathsConfig, cache: Arc<MetadataCache>, event_bus: EventBus) -> Self {
        Self {
            watch_set: paths.watch_set().canonicalized(),
            local_override: paths.local_override.clone(),
            default_config: paths.default_config.clone(),
            working_config: paths.working_config.clone(),
            cache,
            event_bus,
        }
    }

    pub fn watch_set(&self) -> &WatchSet {
        &self.watch_set
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn working_config(&self) -> &Path {
        &self.working_config
    }

    /// The local override if it exists right now, else the default config
    pub async fn authoritative_source(&self) -> &Path {
        let override_present = tokio::fs::try_exists(&self.local_override)
            .await
            .unwrap_or(false);

        if override_present {
            &self.local_override
        } else {
            &self.default_config
        }
    }

    /// React to a filesystem change at `path`
    pub async fn on_change(&self, path: &Path) -> Propagation {
        if !self.watch_set.contains(path) {
            trace!(path = %path.display(), "Ignoring change outside watch set");
            return Propagation::Ignored;
        }

        info!(path = %path.display(), "Watched config changed");

        let source = match self.sync_now().await {
            Ok(source) => source,
            Err(e) => {
                error!(error = %e, "Config propagation aborted, keeping previous working copy");
                return Propagation::Failed(e);
            }
        };

        let clients = self.event_bus.publish(DevEvent::FullReload {
            trigger: path.to_path_buf(),
        });
        info!(clients, "Full reload broadcast");

        Propagation::Propagated { source, clients }
    }

    /// Copy the authoritative config over the working copy and invalidate the
    /// metadata cache, without notifying clients
    pub async fn sync_now(&self) -> Result<PathBuf> {
        let source = self.authoritative_source().await.to_path_buf();

        let bytes = tokio::fs::copy(&source, &self.working_config)
            .await
            .map_err(|e| CoreError::ConfigCopy {
                from: source.clone(),
                to: self.working_config.clone(),
                source: e,
            })?;

        debug!(
            from = %source.display(),
            to = %self.working_config.display(),
            bytes,
            "Copied authoritative config"
        );

        self.cache.invalidate();
        Ok(source)
    }
}
