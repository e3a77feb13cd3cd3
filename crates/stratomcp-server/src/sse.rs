//! SSE framing and the per-process stream registry.
//!
//! Frame grammar: `id: {digits}\ndata: {JSON}\n\n` for events, the
//! comment line `: heartbeat\n\n` for keep-alives. Event IDs come from
//! the session store's atomic counter — never from local state — so
//! replay and cross-instance fan-out agree on numbering.
//!
//! Streams are process-local: the registry maps a session id to the
//! senders of the SSE connections this instance holds. Dead senders are
//! pruned on write; the last stream closing makes the session eligible
//! for per-session topic unsubscription.

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

/// One outbound SSE frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// `id:`/`data:` event carrying a JSON envelope
    Event {
        /// Per-session event id
        event_id: u64,
        /// JSON payload (already serialized)
        data: String,
    },
    /// Keep-alive comment
    Heartbeat,
}

impl SseFrame {
    /// Event frame for a JSON envelope
    pub fn event(event_id: u64, payload: &Value) -> Self {
        Self::Event {
            event_id,
            data: payload.to_string(),
        }
    }

    /// Wire encoding of the frame
    pub fn to_wire(&self) -> String {
        match self {
            Self::Event { event_id, data } => format!("id: {event_id}\ndata: {data}\n\n"),
            Self::Heartbeat => ": heartbeat\n\n".to_string(),
        }
    }
}

/// Process-local registry of open SSE streams keyed by session id
#[derive(Debug, Default)]
pub struct StreamRegistry {
    streams: DashMap<String, Vec<mpsc::UnboundedSender<SseFrame>>>,
}

impl StreamRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new stream to a session; the receiver feeds one SSE
    /// response body
    pub fn attach(&self, session_id: &str) -> mpsc::UnboundedReceiver<SseFrame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.streams.entry(session_id.to_string()).or_default().push(tx);
        debug!(session_id = %session_id, "stream attached");
        rx
    }

    /// Write a frame to every live stream of a session, pruning dead
    /// ones; `true` when at least one stream took it
    pub fn send(&self, session_id: &str, frame: &SseFrame) -> bool {
        let Some(mut senders) = self.streams.get_mut(session_id) else {
            return false;
        };
        senders.retain(|sender| sender.send(frame.clone()).is_ok());
        let delivered = !senders.is_empty();
        if !delivered {
            drop(senders);
            self.streams.remove(session_id);
        }
        delivered
    }

    /// Whether this process holds any live stream for the session
    pub fn has_streams(&self, session_id: &str) -> bool {
        self.streams
            .get(session_id)
            .is_some_and(|senders| !senders.is_empty())
    }

    /// Drop closed senders for a session; `true` when no streams remain
    /// (the caller should then unsubscribe the per-session topic)
    pub fn prune(&self, session_id: &str) -> bool {
        let remaining = {
            let Some(mut senders) = self.streams.get_mut(session_id) else {
                return true;
            };
            senders.retain(|sender| !sender.is_closed());
            senders.len()
        };
        if remaining == 0 {
            self.streams.remove(session_id);
            debug!(session_id = %session_id, "last stream closed");
            true
        } else {
            false
        }
    }

    /// Session ids with at least one live stream
    pub fn session_ids(&self) -> Vec<String> {
        self.streams.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Destroy every stream (server shutdown)
    pub fn close_all(&self) {
        self.streams.clear();
    }
}
