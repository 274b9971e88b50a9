//! Connection state bookkeeping shared by voice transports.

use parking_lot::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::trace;

use spotcast_common::models::voice::{ConnectionState, StateTransition};

type Listener = UnboundedSender<StateTransition<ConnectionState>>;

struct Inner {
    state: ConnectionState,
    listeners: Vec<Listener>,
}

/// Current connection state plus the listeners that want to hear about changes.
///
/// Listeners are owned by whoever subscribed: dropping the receiver detaches
/// it, and the tracker prunes it on the next transition.
pub struct ConnectionStateTracker {
    inner: Mutex<Inner>,
}

impl ConnectionStateTracker {
    pub fn new(initial: ConnectionState) -> Self {
        Self {
            inner: Mutex::new(Inner { state: initial, listeners: Vec::new() }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn subscribe(&self) -> UnboundedReceiver<StateTransition<ConnectionState>> {
        let (tx, rx) = unbounded_channel();
        let mut inner = self.inner.lock();
        inner.listeners.retain(|l| !l.is_closed());
        inner.listeners.push(tx);
        rx
    }

    /// Moves to `new` and notifies listeners. Returns `false` when nothing
    /// changed. `Destroyed` is terminal.
    pub fn transition(&self, new: ConnectionState) -> bool {
        let mut inner = self.inner.lock();
        let old = inner.state;
        if old == new || old == ConnectionState::Destroyed {
            return false;
        }
        inner.state = new;
        let change = StateTransition { old, new };
        inner.listeners.retain(|l| l.send(change).is_ok());
        trace!("connection transition {} ({} listeners)", change, inner.listeners.len());
        true
    }

    /// Live listeners, not counting ones whose receiver was dropped.
    pub fn listener_count(&self) -> usize {
        self.inner
            .lock()
            .listeners
            .iter()
            .filter(|l| !l.is_closed())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_only_real_changes() {
        let tracker = ConnectionStateTracker::new(ConnectionState::Connecting);
        let mut rx = tracker.subscribe();

        assert!(tracker.transition(ConnectionState::Ready));
        assert!(!tracker.transition(ConnectionState::Ready));
        assert!(tracker.transition(ConnectionState::Disconnected));

        let first = rx.try_recv().unwrap();
        assert_eq!(first.old, ConnectionState::Connecting);
        assert_eq!(first.new, ConnectionState::Ready);
        let second = rx.try_recv().unwrap();
        assert_eq!(second.new, ConnectionState::Disconnected);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_listeners_are_detached() {
        let tracker = ConnectionStateTracker::new(ConnectionState::Ready);
        let a = tracker.subscribe();
        let _b = tracker.subscribe();
        assert_eq!(tracker.listener_count(), 2);

        drop(a);
        assert_eq!(tracker.listener_count(), 1);
        tracker.transition(ConnectionState::Disconnected);
        assert_eq!(tracker.inner.lock().listeners.len(), 1);
    }

    #[test]
    fn destroyed_is_terminal() {
        let tracker = ConnectionStateTracker::new(ConnectionState::Ready);
        assert!(tracker.transition(ConnectionState::Destroyed));
        assert!(!tracker.transition(ConnectionState::Ready));
        assert_eq!(tracker.state(), ConnectionState::Destroyed);
    }
}
