//! File watcher for authoritative config changes
//!
//! Uses notify-debouncer-mini so a burst of editor writes produces a single
//! propagation.

use crate::error::Result;
use crate::event::DevEvent;
use crate::propagate::{ConfigPropagator, WatchSet};
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEvent, Debouncer};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Configuration for the file watcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Quiet period before a burst of events is delivered, in milliseconds
    pub debounce_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self { debounce_ms: 200 }
    }
}

impl WatcherConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// File watcher that drives a [`ConfigPropagator`]
pub struct FileWatcher {
    /// Debouncer owning the notify watcher; dropping it stops notifications
    _debouncer: Debouncer<RecommendedWatcher>,

    /// Shutdown signal
    shutdown_tx: mpsc::Sender<()>,
}

impl FileWatcher {
    /// Start watching the propagator's watch set
    ///
    /// Parent directories are watched rather than the files themselves, since
    /// the local override may be created or deleted while the server runs.
    pub async fn start(propagator: Arc<ConfigPropagator>, config: WatcherConfig) -> Result<Self> {
        let (event_tx, mut event_rx) = mpsc::channel::<DebounceEventResult>(100);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let mut debouncer = new_debouncer(config.debounce(), move |res: DebounceEventResult| {
            let _ = event_tx.blocking_send(res);
        })?;

        for dir in propagator.watch_set().directories() {
            if !dir.is_dir() {
                warn!(path = %dir.display(), "Config directory does not exist, not watching");
                continue;
            }
            debouncer.watcher().watch(&dir, RecursiveMode::NonRecursive)?;
            debug!(path = %dir.display(), "Watching directory");
        }

        info!(
            paths = ?propagator.watch_set().paths(),
            debounce_ms = config.debounce_ms,
            "Config watcher started"
        );

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(result) = event_rx.recv() => {
                        match result {
                            Ok(events) => {
                                if let Some(path) = Self::trigger_path(&events, propagator.watch_set()) {
                                    propagator.on_change(&path).await;
                                }
                            }
                            Err(e) => {
                                error!(error = %e, "File watcher error");
                                propagator
                                    .event_bus()
                                    .publish(DevEvent::WatcherError(e.to_string()));
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Config watcher shutting down");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            _debouncer: debouncer,
            shutdown_tx,
        })
    }

    /// First watched path in a debounced batch; a batch yields at most one reaction
    fn trigger_path(events: &[DebouncedEvent], watch_set: &WatchSet) -> Option<PathBuf> {
        events
            .iter()
            .map(|e| &e.path)
            .find(|p| watch_set.contains(p))
            .cloned()
    }

    /// Stop the watcher
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}
