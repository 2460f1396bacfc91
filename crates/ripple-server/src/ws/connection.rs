//! Per-connection handle.
//!
//! A [`ClientConnection`] owns the sending half of the connection's
//! bounded outbound queue. Writers (`send`) never block: a full queue
//! counts a drop, and a connection whose lifetime drops cross
//! [`MAX_TOTAL_DROPS`] is forcibly disconnected by its session so one
//! slow client can never stall a topic's other subscribers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::mpsc;

/// Maximum total lifetime message drops before a slow client is
/// forcibly disconnected.
pub const MAX_TOTAL_DROPS: u64 = 100;

/// Connection lifecycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Upgrade accepted, session not yet assembled.
    Connecting,
    /// Registered with the hub, topic resolved.
    Upgraded,
    /// Read loop blocking on inbound frames.
    ReadLoopActive,
    /// Tearing down: deregistering, stopping the relay task.
    Closing,
    /// Fully torn down.
    Closed,
}

/// One connected client.
pub struct ClientConnection {
    /// Connection id (UUID v7).
    pub id: String,
    outbound: mpsc::Sender<Arc<String>>,
    topic: RwLock<Option<String>>,
    session_id: RwLock<Option<String>>,
    drops: AtomicU64,
    state: RwLock<SessionState>,
    connected_at: DateTime<Utc>,
}

impl ClientConnection {
    /// Wrap the sending half of a connection's outbound queue.
    #[must_use]
    pub fn new(id: String, outbound: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            outbound,
            topic: RwLock::new(None),
            session_id: RwLock::new(None),
            drops: AtomicU64::new(0),
            state: RwLock::new(SessionState::Connecting),
            connected_at: Utc::now(),
        }
    }

    /// When the connection was accepted.
    #[must_use]
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Queue a serialized message without blocking.
    ///
    /// Returns `false` (and counts a drop) when the queue is full or the
    /// writer half is gone.
    pub fn send(&self, payload: Arc<String>) -> bool {
        match self.outbound.try_send(payload) {
            Ok(()) => true,
            Err(_) => {
                let _ = self.drops.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Lifetime count of dropped messages.
    #[must_use]
    pub fn drop_count(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }

    /// Whether the drop threshold has been crossed.
    #[must_use]
    pub fn is_saturated(&self) -> bool {
        self.drop_count() >= MAX_TOTAL_DROPS
    }

    /// Register the connection under a topic. A connection belongs to at
    /// most one topic at a time; binding replaces any previous topic.
    pub fn bind_topic(&self, topic: impl Into<String>) {
        *self.topic.write() = Some(topic.into());
    }

    /// Remove the topic binding.
    pub fn clear_topic(&self) {
        *self.topic.write() = None;
    }

    /// Current topic.
    #[must_use]
    pub fn topic(&self) -> Option<String> {
        self.topic.read().clone()
    }

    /// Bind the opaque session id.
    pub fn bind_session(&self, session_id: impl Into<String>) {
        *self.session_id.write() = Some(session_id.into());
    }

    /// Current session id.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().clone()
    }

    /// Move to a new lifecycle state.
    pub fn set_state(&self, state: SessionState) {
        *self.state.write() = state;
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }
}
