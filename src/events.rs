//! Dev-mode event bus.
//!
//! Stage runs publish [`DevEvent`]s; the dev server subscribes and forwards
//! them to browsers as Server-Sent Events.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default number of buffered events per subscriber.
pub const DEFAULT_CAPACITY: usize = 64;

/// Events in the dev server lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DevEvent {
    /// A stage finished and wrote its outputs
    Rebuilt { stage: String },

    /// A stage failed
    BuildFailed { stage: String, error: String },
}

impl DevEvent {
    /// SSE event name sent to the browser.
    pub fn name(&self) -> &'static str {
        match self {
            DevEvent::Rebuilt { .. } => "reload",
            DevEvent::BuildFailed { .. } => "build-error",
        }
    }

    /// Encode as one SSE frame.
    pub fn to_sse(&self) -> String {
        let data = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("event: {}\ndata: {}\n\n", self.name(), data)
    }
}

/// Broadcast channel carrying [`DevEvent`]s.
///
/// Cloning shares the same channel. Publishing never blocks and succeeds with
/// no subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DevEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event, returning how many subscribers received it.
    pub fn publish(&self, event: DevEvent) -> usize {
        tracing::debug!(event = ?event, "publishing dev event");
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DevEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
