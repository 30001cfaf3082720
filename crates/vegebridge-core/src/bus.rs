// ── Publisher seam ──
//
// The core never talks to a broker directly. It hands topics and payloads
// to a `Publisher`, which the binary backs with an MQTT client, or with
// `NullPublisher` when no broker is reachable.

use std::sync::{Mutex, PoisonError};

/// Outbound side of the message bus.
pub trait Publisher: Send + Sync {
    /// Publish `payload` at `topic`. Fire-and-forget; delivery failures are
    /// the implementation's to log.
    fn publish(&self, topic: &str, payload: &str);
}

/// Drops everything. Used when the bus is unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPublisher;

impl Publisher for NullPublisher {
    fn publish(&self, topic: &str, _payload: &str) {
        tracing::trace!(topic, "bus unavailable, publication dropped");
    }
}

/// Keeps every publication in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The most recent payload published at `topic`.
    pub fn last(&self, topic: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|(t, _)| t == topic)
            .map(|(_, p)| p.clone())
    }

    pub fn clear(&self) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, topic: &str, payload: &str) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((topic.to_owned(), payload.to_owned()));
    }
}

/// `<prefix><hub>/<path>`. The prefix conventionally ends in `/`.
pub fn topic(prefix: &str, hub: &str, path: &str) -> String {
    format!("{prefix}{hub}/{path}")
}
