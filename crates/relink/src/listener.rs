//! Connector event listener
//!
//! A connector holds at most one listener, and only weakly: dropping the last
//! strong reference unregisters it. Callbacks run on the connector's worker
//! task, never while an internal lock is held, so a listener may call back
//! into the connector.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::error::ConnectorError;

/// Observer of connection lifecycle events and command completions.
///
/// `connected` and `disconnected` are paired per established session; a failed
/// connect attempt produces `disconnected` followed by `exception`.
pub trait ConnectorListener: Send + Sync {
    /// A session was established
    fn connected(&self);

    /// A session ended or a connect attempt failed
    fn disconnected(&self);

    /// A connect attempt failed, or a session ended with an error while the
    /// connector was not being stopped
    fn exception(&self, error: &ConnectorError);

    /// An exec command completed
    fn exec_done(&self, _id: i32) {}

    /// A channel read completed
    fn read_done(&self, _result: i32, _name: &str, _values: &[f32]) {}

    /// A channel write completed
    fn write_done(&self, _result: i32, _name: &str) {}

    /// The session hit a fatal fault (including a panic).
    ///
    /// The worker keeps running; persistent connectors reconnect as usual.
    fn fault(&self, _description: &str) {}
}

/// Weakly-held listener registration shared by the connector and its sessions
#[derive(Default)]
pub(crate) struct ListenerSlot {
    inner: RwLock<Option<Weak<dyn ConnectorListener>>>,
}

impl ListenerSlot {
    pub(crate) fn set(&self, listener: &Arc<dyn ConnectorListener>) {
        *self.inner.write() = Some(Arc::downgrade(listener));
    }

    pub(crate) fn clear(&self) {
        *self.inner.write() = None;
    }

    /// Upgrade the registration; `None` if unset or the listener was dropped
    pub(crate) fn get(&self) -> Option<Arc<dyn ConnectorListener>> {
        self.inner.read().as_ref().and_then(Weak::upgrade)
    }

    /// Invoke `f` on the listener, if one is alive
    pub(crate) fn notify(&self, f: impl FnOnce(&dyn ConnectorListener)) {
        if let Some(listener) = self.get() {
            f(listener.as_ref());
        }
    }
}

impl std::fmt::Debug for ListenerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSlot")
            .field("registered", &self.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        connected: AtomicUsize,
    }

    impl ConnectorListener for Counter {
        fn connected(&self) {
            self.connected.fetch_add(1, Ordering::SeqCst);
        }
        fn disconnected(&self) {}
        fn exception(&self, _error: &ConnectorError) {}
    }

    #[test]
    fn test_unset_slot_is_noop() {
        let slot = ListenerSlot::default();
        let mut called = false;
        slot.notify(|_| called = true);
        assert!(!called);
    }

    #[test]
    fn test_notify_reaches_listener() {
        let slot = ListenerSlot::default();
        let counter = Arc::new(Counter::default());
        let listener: Arc<dyn ConnectorListener> = counter.clone();
        slot.set(&listener);

        slot.notify(|l| l.connected());
        slot.notify(|l| l.connected());
        assert_eq!(counter.connected.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dropped_listener_unregisters() {
        let slot = ListenerSlot::default();
        let listener: Arc<dyn ConnectorListener> = Arc::new(Counter::default());
        slot.set(&listener);
        assert!(slot.get().is_some());

        drop(listener);
        assert!(slot.get().is_none());
    }

    #[test]
    fn test_clear() {
        let slot = ListenerSlot::default();
        let listener: Arc<dyn ConnectorListener> = Arc::new(Counter::default());
        slot.set(&listener);
        slot.clear();
        assert!(slot.get().is_none());
    }
}
