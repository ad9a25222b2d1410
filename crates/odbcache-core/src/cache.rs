//! TTL cache for the upstream enum metadata module
//!
//! Holds at most one entry. A fresh entry is served without touching disk or
//! network; a stale or invalidated one triggers an environment-table lookup
//! and a single upstream GET. Failures leave the cache untouched and are
//! never retried or papered over with stale data.

use crate::clock::{Clock, SystemClock};
use crate::environment::EnvironmentTable;
use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Content type of the served metadata module
pub const METADATA_CONTENT_TYPE: &str = "application/javascript";

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum age of a served entry, in seconds
    pub ttl_secs: u64,

    /// Upper bound on a single upstream request, in milliseconds
    pub upstream_timeout_ms: u64,

    /// Path appended to the resolved upstream URI
    pub metadata_path: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            upstream_timeout_ms: 5_000,
            metadata_path: "/export/enumMetadata".to_string(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }
}

/// Payload returned by [`MetadataCache::get`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// Module source, shared with the cache entry
    pub data: Arc<str>,
    pub content_type: &'static str,
}

impl Metadata {
    fn new(data: Arc<str>) -> Self {
        Self {
            data,
            content_type: METADATA_CONTENT_TYPE,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    data: Arc<str>,
    timestamp: Instant,
    fetched_at: DateTime<Utc>,
    source: String,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    upstream_requests: AtomicU64,
    failures: AtomicU64,
    invalidations: AtomicU64,
}

/// Snapshot of the cache for health reporting
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub cached: bool,
    pub fresh: bool,
    pub age_secs: Option<u64>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub source: Option<String>,
    pub ttl_secs: u64,
    pub hits: u64,
    pub misses: u64,
    pub upstream_requests: u64,
    pub failures: u64,
    pub invalidations: u64,
}

/// Single-entry metadata cache shared by the request path and the propagator
pub struct MetadataCache {
    entry: RwLock<Option<CacheEntry>>,
    environments: PathBuf,
    config: CacheConfig,
    client: reqwest::Client,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

impl MetadataCache {
    /// Create a cache backed by the environment table at `environments`
    pub fn new(environments: PathBuf, config: CacheConfig) -> Result<Self> {
        Self::with_clock(environments, config, Arc::new(SystemClock))
    }

    /// Create a cache with a custom time source
    pub fn with_clock(
        environments: PathBuf,
        config: CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.upstream_timeout())
            .build()
            .map_err(|e| CoreError::InvalidConfig {
                message: format!("cannot build HTTP client: {}", e),
            })?;

        Ok(Self {
            entry: RwLock::new(None),
            environments,
            config,
            client,
            clock,
            counters: Counters::default(),
        })
    }

    /// Serve the metadata module for `host_key`
    ///
    /// Returns the cached payload while it is younger than the TTL; otherwise
    /// resolves the upstream for `host_key`, fetches, and replaces the entry.
    pub async fn get(&self, host_key: &str) -> Result<Metadata> {
        if let Some(data) = self.fresh_entry() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            trace!(host = host_key, "Metadata cache hit");
            return Ok(Metadata::new(data));
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        debug!(host = host_key, "Metadata cache miss");

        match self.refresh(host_key).await {
            Ok(data) => Ok(Metadata::new(data)),
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                warn!(host = host_key, error = %e, "Failed to refresh enum metadata");
                Err(e)
            }
        }
    }

    /// Drop the cached entry so the next `get` re-fetches
    pub fn invalidate(&self) {
        let previous = self.entry.write().take();
        self.counters.invalidations.fetch_add(1, Ordering::Relaxed);

        if previous.is_some() {
            info!("Metadata cache invalidated");
        }
    }

    /// Whether an entry is held, fresh or not
    pub fn is_cached(&self) -> bool {
        self.entry.read().is_some()
    }

    pub fn status(&self) -> CacheStatus {
        let now = self.clock.now();
        let entry = self.entry.read().clone();
        let age = entry.as_ref().map(|e| now.duration_since(e.timestamp));

        CacheStatus {
            cached: entry.is_some(),
            fresh: age.is_some_and(|a| a < self.config.ttl()),
            age_secs: age.map(|a| a.as_secs()),
            fetched_at: entry.as_ref().map(|e| e.fetched_at),
            source: entry.map(|e| e.source),
            ttl_secs: self.config.ttl_secs,
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            upstream_requests: self.counters.upstream_requests.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
        }
    }

    fn fresh_entry(&self) -> Option<Arc<str>> {
        let now = self.clock.now();
        let ttl = self.config.ttl();

        self.entry
            .read()
            .as_ref()
            .filter(|e| now.duration_since(e.timestamp) < ttl)
            .map(|e| Arc::clone(&e.data))
    }

    async fn refresh(&self, host_key: &str) -> Result<Arc<str>> {
        let table = EnvironmentTable::load(&self.environments).await?;
        let upstream = table.resolve(host_key)?;
        let url = metadata_url(upstream, &self.config.metadata_path);

        let body = self.fetch(&url).await?;
        let data: Arc<str> = body.into();

        // Overwrites unconditionally, including an entry invalidated mid-fetch
        *self.entry.write() = Some(CacheEntry {
            data: Arc::clone(&data),
            timestamp: self.clock.now(),
            fetched_at: Utc::now(),
            source: url.clone(),
        });

        info!(url = %url, bytes = data.len(), "Cached enum metadata");
        Ok(data)
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        self.counters
            .upstream_requests
            .fetch_add(1, Ordering::Relaxed);
        debug!(url = %url, "Fetching enum metadata from upstream");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.upstream_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::UpstreamStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| self.upstream_error(url, e))
    }

    fn upstream_error(&self, url: &str, source: reqwest::Error) -> CoreError {
        if source.is_timeout() {
            CoreError::UpstreamTimeout {
                url: url.to_string(),
                timeout_ms: self.config.upstream_timeout_ms,
            }
        } else {
            CoreError::UpstreamRequest {
                url: url.to_string(),
                source,
            }
        }
    }
}

/// Join the upstream base URI and the metadata path
pub fn metadata_url(upstream: &str, metadata_path: &str) -> String {
    format!(
        "{}/{}",
        upstream.trim_end_matches('/'),
        metadata_path.trim_start_matches('/')
    )
}
