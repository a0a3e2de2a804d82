//! The per-network status machine and its listener fan-out.

use parking_lot::RwLock;
use tokio::sync::broadcast;

/// A network session's lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    New,
    Connecting,
    Started,
    Reconnecting,
    Stopped,
}

impl Status {
    /// Whether `to` is a legal transition from `self`, per the documented
    /// status machine.
    pub fn can_transition_to(self, to: Status) -> bool {
        use Status::*;
        matches!(
            (self, to),
            (New, Connecting)
                | (Connecting, Started)
                | (Connecting, Stopped)
                | (Started, Stopped)
                | (Started, Reconnecting)
                | (Reconnecting, Connecting)
                | (Reconnecting, Stopped)
        )
    }
}

/// Tracks the current status and broadcasts every transition to subscribed
/// listeners, in order, once each.
pub struct StatusTracker {
    current: RwLock<Status>,
    tx: broadcast::Sender<Status>,
}

impl Default for StatusTracker {
    fn default() -> StatusTracker {
        let (tx, _rx) = broadcast::channel(32);
        StatusTracker {
            current: RwLock::new(Status::New),
            tx,
        }
    }
}

impl StatusTracker {
    pub fn new() -> StatusTracker {
        StatusTracker::default()
    }

    pub fn current(&self) -> Status {
        *self.current.read()
    }

    /// Transitions to `to`, logging and broadcasting it. Returns `false`
    /// (and does not transition) if `to` is not reachable from the current
    /// status.
    pub fn transition(&self, network_id: &str, to: Status) -> bool {
        let mut current = self.current.write();
        if !current.can_transition_to(to) {
            return false;
        }
        log::info!("network {network_id}: {current:?} -> {to:?}");
        *current = to;
        let _ = self.tx.send(to);
        true
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Status> {
        self.tx.subscribe()
    }
}
