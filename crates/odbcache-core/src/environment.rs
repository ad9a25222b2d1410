//! Environment table: maps dev-server host names to upstream ODB endpoints
//!
//! The table is a JSON array of `{ "hostName": ..., "odbRestURI": ... }`
//! records. It is re-read on every cache miss so edits take effect without a
//! restart.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Host name matching any host without an exact entry
pub const WILDCARD_HOST: &str = "*";

/// A single environment record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    #[serde(rename = "hostName")]
    pub host_name: String,

    #[serde(rename = "odbRestURI", alias = "upstreamURI")]
    pub upstream_uri: String,
}

/// Ordered sequence of environment records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentTable {
    entries: Vec<Environment>,
}

impl EnvironmentTable {
    pub fn new(entries: Vec<Environment>) -> Self {
        Self { entries }
    }

    /// Parse a table from its JSON text; `path` is only used for error context
    pub fn parse(json: &str, path: &Path) -> Result<Self> {
        serde_json::from_str(json).map_err(|source| CoreError::EnvironmentParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read and parse the table from disk
    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CoreError::EnvironmentRead {
                path: path.to_path_buf(),
                source,
            })?;

        let table = Self::parse(&json, path)?;
        debug!(path = %path.display(), entries = table.entries.len(), "Loaded environment table");
        Ok(table)
    }

    /// Resolve the upstream URI for `host`
    ///
    /// Exact host name match wins; otherwise the first wildcard record is used.
    pub fn resolve(&self, host: &str) -> Result<&str> {
        self.entries
            .iter()
            .find(|e| e.host_name == host)
            .or_else(|| self.entries.iter().find(|e| e.host_name == WILDCARD_HOST))
            .map(|e| e.upstream_uri.as_str())
            .ok_or_else(|| CoreError::NoMatchingHost {
                host: host.to_string(),
            })
    }

    pub fn entries(&self) -> &[Environment] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
