//! Server-Sent Events for live reload

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use odbcache_core::{DevEvent, EventBus};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Name of the SSE event instructing clients to reload
pub const FULL_RELOAD_EVENT: &str = "full-reload";

/// Client script: reload the page whenever the server says so
pub const RELOAD_CLIENT_JS: &str = r#"(() => {
  const source = new EventSource('/api/events');
  source.addEventListener('full-reload', () => window.location.reload());
})();
"#;

/// Map a bus event to its SSE name and JSON payload
pub fn to_sse_parts(event: &DevEvent) -> (&'static str, String) {
    match event {
        DevEvent::FullReload { trigger } => (
            FULL_RELOAD_EVENT,
            serde_json::json!({
                "type": FULL_RELOAD_EVENT,
                "path": trigger.display().to_string(),
            })
            .to_string(),
        ),
        DevEvent::WatcherError(message) => (
            "watcher-error",
            serde_json::json!({ "message": message }).to_string(),
        ),
    }
}

/// Create an SSE stream from the event bus
///
/// Takes EventBus by value (cheap clone). Lagged receivers skip the missed
/// events; a later reload still arrives.
pub fn create_sse_stream(event_bus: EventBus) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(event_bus.subscribe());

    let sse_stream = stream.filter_map(|result| {
        result.ok().map(|event: DevEvent| {
            let (name, data) = to_sse_parts(&event);
            Ok(Event::default().event(name).data(data))
        })
    });

    Sse::new(sse_stream).keep_alive(KeepAlive::default())
}
