//! odbcache-core - Core library for odbcache
//!
//! Provides the TTL enum-metadata cache, the environment table, config
//! propagation and the file watcher that drives it.

pub mod cache;
pub mod clock;
pub mod config;
pub mod environment;
pub mod error;
pub mod event;
pub mod propagate;
pub mod watcher;

pub use cache::{CacheConfig, CacheStatus, Metadata, MetadataCache, METADATA_CONTENT_TYPE};
pub use config::{DevServerConfig, PathsConfig};
pub use environment::{Environment, EnvironmentTable};
pub use error::{CoreError, ErrorKind};
pub use event::{DevEvent, EventBus};
pub use propagate::{ConfigPropagator, Propagation, WatchSet};
pub use watcher::{FileWatcher, WatcherConfig};
