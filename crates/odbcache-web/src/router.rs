//! Web router using Axum

use crate::error::ApiError;
use crate::sse;
use anyhow::{bail, Result};
use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use odbcache_core::{EventBus, MetadataCache};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::debug;

/// Route prefix of the enum metadata module
pub const DEFAULT_METADATA_PREFIX: &str = "/api/enumMetadata";

/// Host key used when a request carries no usable `Host` header
const FALLBACK_HOST: &str = "localhost";

/// Shared handles for request handlers
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<MetadataCache>,
    pub event_bus: EventBus,
}

/// Router options
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// Requests under this prefix are answered by the metadata cache
    pub metadata_prefix: String,

    /// Directory served for all other paths
    pub public_dir: Option<PathBuf>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            metadata_prefix: DEFAULT_METADATA_PREFIX.to_string(),
            public_dir: None,
        }
    }
}

/// Canonical form of a metadata route prefix: one leading slash, no
/// trailing slash, at least one segment
pub fn normalize_prefix(prefix: &str) -> Result<String> {
    let trimmed = prefix.trim().trim_matches('/');

    if trimmed.is_empty() {
        bail!("Metadata prefix '{}' must contain at least one path segment", prefix);
    }
    if trimmed.contains(['{', '}']) {
        bail!("Metadata prefix '{}' must not contain route captures", prefix);
    }

    Ok(format!("/{}", trimmed))
}

/// Create the web router
pub fn create_router(state: AppState, config: &WebConfig) -> Result<Router> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let prefix = normalize_prefix(&config.metadata_prefix)?;

    let mut router = Router::new()
        .route(&prefix, get(metadata_handler))
        .route(&format!("{}/{{*rest}}", prefix), get(metadata_handler))
        .route("/api/events", get(sse_handler))
        .route("/api/health", get(health_handler))
        .route("/__reload.js", get(reload_client_handler));

    if let Some(public_dir) = &config.public_dir {
        router = router.fallback_service(ServeDir::new(public_dir));
    }

    Ok(router.layer(cors).with_state(state))
}

/// Serve the enum metadata module through the TTL cache
async fn metadata_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let host = host_key(&headers);
    debug!(host = %host, "Enum metadata requested");

    let metadata = state.cache.get(&host).await?;

    Ok((
        [
            (header::CONTENT_TYPE, metadata.content_type),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        metadata.data.to_string(),
    ))
}

async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "cache": state.cache.status(),
        "reload_clients": state.event_bus.subscriber_count(),
    }))
}

/// SSE endpoint for live reload
async fn sse_handler(
    State(state): State<AppState>,
) -> axum::response::Sse<
    impl futures::stream::Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>>,
> {
    sse::create_sse_stream(state.event_bus.clone())
}

async fn reload_client_handler() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/javascript"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        sse::RELOAD_CLIENT_JS,
    )
}

/// Host name from the `Host` header, without port
fn host_key(headers: &HeaderMap) -> String {
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(strip_port)
        .filter(|h| !h.is_empty())
        .unwrap_or(FALLBACK_HOST)
        .to_string()
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literal, e.g. [::1]:8080
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }

    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("local.lucuma.xyz:8080"), "local.lucuma.xyz");
        assert_eq!(strip_port("local.lucuma.xyz"), "local.lucuma.xyz");
        assert_eq!(strip_port("[::1]:8080"), "::1");
        assert_eq!(strip_port("localhost:"), "localhost");
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("/api/enumMetadata").unwrap(), "/api/enumMetadata");
        assert_eq!(normalize_prefix("/api/enumMetadata/").unwrap(), "/api/enumMetadata");
        assert_eq!(normalize_prefix("api/x").unwrap(), "/api/x");
        assert_eq!(normalize_prefix(" //meta// ").unwrap(), "/meta");
    }

    #[test]
    fn test_normalize_prefix_rejects_unroutable() {
        for prefix in ["", "/", "//", "  ", "/api/{id}"] {
            assert!(normalize_prefix(prefix).is_err(), "accepted {:?}", prefix);
        }
    }

    #[test]
    fn test_host_key_fallback() {
        let mut headers = HeaderMap::new();
        assert_eq!(host_key(&headers), "localhost");

        headers.insert(header::HOST, HeaderValue::from_static("explore.example.com:443"));
        assert_eq!(host_key(&headers), "explore.example.com");
    }
}
