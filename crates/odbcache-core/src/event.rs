//! Event bus for odbcache using tokio::broadcast
//!
//! Carries reload signals from the config propagator to every connected client.

use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Events pushed to connected dev-server clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DevEvent {
    /// Clients must discard their state and reload from scratch
    FullReload {
        /// Watched path whose change triggered the reload
        trigger: PathBuf,
    },
    /// Watcher encountered an error
    WatcherError(String),
}

/// Synchronous listener run inside [`EventBus::publish`]
type Listener = Arc<dyn Fn(&DevEvent) + Send + Sync>;

/// Event bus for broadcasting dev-server events
///
/// Uses tokio::broadcast so every subscriber sees every event.
/// The web layer subscribes once per SSE connection.
pub struct EventBus {
    sender: broadcast::Sender<DevEvent>,
    listeners: Arc<RwLock<Vec<Listener>>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            listeners: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Create with default capacity (64 events)
    pub fn default_capacity() -> Self {
        Self::new(64)
    }

    /// Register a listener that runs on the publishing task, before any
    /// subscriber can observe the event
    pub fn on_publish(&self, listener: impl Fn(&DevEvent) + Send + Sync + 'static) {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Publish an event to all subscribers, returning how many received it
    pub fn publish(&self, event: DevEvent) -> usize {
        for listener in self.listeners.read().iter() {
            listener(&event);
        }

        // No subscribers is not an error: nobody is connected yet
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<DevEvent> {
        self.sender.subscribe()
    }

    /// Get current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::default_capacity()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            listeners: Arc::clone(&self.listeners),
        }
    }
}
