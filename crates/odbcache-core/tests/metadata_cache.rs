//! Integration tests for the metadata cache against a mocked upstream

use odbcache_core::clock::ManualClock;
use odbcache_core::{CacheConfig, CoreError, MetadataCache, METADATA_CONTENT_TYPE};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HOUR: Duration = Duration::from_secs(3600);

fn write_table(dir: &Path, json: &str) -> PathBuf {
    let table = dir.join("environments.conf.json");
    std::fs::write(&table, json).unwrap();
    table
}

fn wildcard_table(dir: &Path, upstream: &str) -> PathBuf {
    write_table(
        dir,
        &format!(r#"[{{"hostName":"*","odbRestURI":"{}"}}]"#, upstream),
    )
}

fn cache_with_clock(table: PathBuf) -> (MetadataCache, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let cache = MetadataCache::with_clock(table, CacheConfig::default(), clock.clone()).unwrap();
    (cache, clock)
}

async fn mount_metadata(server: &MockServer, body: &str, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/export/enumMetadata"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_wildcard_scenario_serves_module_for_an_hour() {
    let server = MockServer::start().await;
    mount_metadata(&server, "MODULE", 1).await;

    let dir = TempDir::new().unwrap();
    let (cache, clock) = cache_with_clock(wildcard_table(dir.path(), &server.uri()));

    let first = cache.get("local.lucuma.xyz").await.unwrap();
    assert_eq!(&*first.data, "MODULE");
    assert_eq!(first.content_type, METADATA_CONTENT_TYPE);

    for _ in 0..10 {
        clock.advance(Duration::from_secs(355));
        let again = cache.get("local.lucuma.xyz").await.unwrap();
        assert_eq!(&*again.data, "MODULE");
    }

    let status = cache.status();
    assert_eq!(status.upstream_requests, 1);
    assert_eq!(status.hits, 10);
    assert_eq!(
        status.source.as_deref(),
        Some(format!("{}/export/enumMetadata", server.uri()).as_str())
    );
    // MockServer verifies the single upstream call on drop
}

#[tokio::test]
async fn test_fresh_cache_skips_disk() {
    let server = MockServer::start().await;
    mount_metadata(&server, "MODULE", 1).await;

    let dir = TempDir::new().unwrap();
    let table = wildcard_table(dir.path(), &server.uri());
    let (cache, _clock) = cache_with_clock(table.clone());

    cache.get("localhost").await.unwrap();

    // A broken table is never read while the entry is fresh
    std::fs::write(&table, "not json").unwrap();
    let cached = cache.get("localhost").await.unwrap();
    assert_eq!(&*cached.data, "MODULE");
}

#[tokio::test]
async fn test_expiry_triggers_exactly_one_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/export/enumMetadata"))
        .respond_with(ResponseTemplate::new(200).set_body_string("V1"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/export/enumMetadata"))
        .respond_with(ResponseTemplate::new(200).set_body_string("V2"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (cache, clock) = cache_with_clock(wildcard_table(dir.path(), &server.uri()));

    assert_eq!(&*cache.get("localhost").await.unwrap().data, "V1");

    clock.advance(HOUR);

    for _ in 0..5 {
        assert_eq!(&*cache.get("localhost").await.unwrap().data, "V2");
    }
    assert_eq!(cache.status().upstream_requests, 2);
}

#[tokio::test]
async fn test_invalidate_forces_refetch_within_ttl() {
    let server = MockServer::start().await;
    mount_metadata(&server, "MODULE", 2).await;

    let dir = TempDir::new().unwrap();
    let (cache, clock) = cache_with_clock(wildcard_table(dir.path(), &server.uri()));

    cache.get("localhost").await.unwrap();
    clock.advance(Duration::from_secs(60));

    cache.invalidate();
    assert!(!cache.is_cached());

    cache.get("localhost").await.unwrap();
    assert!(cache.is_cached());
    assert_eq!(cache.status().upstream_requests, 2);
}

#[tokio::test]
async fn test_exact_host_entry_selects_upstream() {
    let exact = MockServer::start().await;
    let fallback = MockServer::start().await;
    mount_metadata(&exact, "EXACT", 1).await;
    mount_metadata(&fallback, "FALLBACK", 1).await;

    let dir = TempDir::new().unwrap();
    let table = write_table(
        dir.path(),
        &format!(
            r#"[{{"hostName":"a","odbRestURI":"{}"}},{{"hostName":"*","odbRestURI":"{}"}}]"#,
            exact.uri(),
            fallback.uri()
        ),
    );

    let cache = MetadataCache::new(table.clone(), CacheConfig::default()).unwrap();
    assert_eq!(&*cache.get("a").await.unwrap().data, "EXACT");

    let cache = MetadataCache::new(table, CacheConfig::default()).unwrap();
    assert_eq!(&*cache.get("b").await.unwrap().data, "FALLBACK");
}

#[tokio::test]
async fn test_no_matching_host_is_configuration_error() {
    let dir = TempDir::new().unwrap();
    let table = write_table(dir.path(), r#"[{"hostName":"a","odbRestURI":"http://127.0.0.1:9"}]"#);
    let cache = MetadataCache::new(table, CacheConfig::default()).unwrap();

    let err = cache.get("b").await.unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(cache.status().upstream_requests, 0);
}

#[tokio::test]
async fn test_non_success_status_is_upstream_error_and_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/export/enumMetadata"))
        .respond_with(ResponseTemplate::new(503).set_body_string("down"))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let cache = MetadataCache::new(wildcard_table(dir.path(), &server.uri()), CacheConfig::default())
        .unwrap();

    let err = cache.get("localhost").await.unwrap_err();
    assert!(err.is_upstream());
    assert!(matches!(err, CoreError::UpstreamStatus { status: 503, .. }));
    assert!(!cache.is_cached());

    // No retry inside a call; the next request tries again
    assert!(cache.get("localhost").await.is_err());
    assert_eq!(cache.status().failures, 2);
}

#[tokio::test]
async fn test_stale_entry_not_served_when_refresh_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/export/enumMetadata"))
        .respond_with(ResponseTemplate::new(200).set_body_string("MODULE"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/export/enumMetadata"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (cache, clock) = cache_with_clock(wildcard_table(dir.path(), &server.uri()));

    cache.get("localhost").await.unwrap();
    clock.advance(HOUR + Duration::from_secs(1));

    let err = cache.get("localhost").await.unwrap_err();
    assert!(err.is_upstream());

    // The stale entry is left in place but never served
    let status = cache.status();
    assert!(status.cached);
    assert!(!status.fresh);
}

#[tokio::test]
async fn test_slow_upstream_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/export/enumMetadata"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("MODULE")
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = CacheConfig {
        upstream_timeout_ms: 100,
        ..CacheConfig::default()
    };
    let cache = MetadataCache::new(wildcard_table(dir.path(), &server.uri()), config).unwrap();

    let err = cache.get("localhost").await.unwrap_err();
    assert!(err.is_upstream());
    assert!(matches!(err, CoreError::UpstreamTimeout { timeout_ms: 100, .. }));
    assert!(!cache.is_cached());
}

#[tokio::test]
async fn test_unreachable_upstream_is_upstream_error() {
    let dir = TempDir::new().unwrap();
    // Port 9 (discard) is not listening in test environments
    let cache = MetadataCache::new(
        wildcard_table(dir.path(), "http://127.0.0.1:9"),
        CacheConfig::default(),
    )
    .unwrap();

    let err = cache.get("localhost").await.unwrap_err();
    assert!(err.is_upstream());

    // The transport cause reaches the message shown to the browser
    match &err {
        CoreError::UpstreamRequest { source, .. } => {
            let message = err.to_string();
            assert!(message.starts_with("Upstream request to http://127.0.0.1:9/export/enumMetadata failed: "));
            assert!(message.ends_with(&source.to_string()));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}
