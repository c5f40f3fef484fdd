//! Multi-subscriber notifications raised by collaborators.
//!
//! A [`Signal`] is owned by the collaborator that raises it and may be
//! emitted from any thread: OS callbacks, timers or tokio tasks. Subscribers
//! must not do any real work inside the handler; the supervisor's handlers
//! only capture the payload and push a task onto its serial queue.

use std::sync::{Arc, Mutex, PoisonError};

type Slot<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// A named notification with any number of subscribers.
pub struct Signal<E> {
    slots: Arc<Mutex<Vec<Slot<E>>>>,
}

impl<E> Signal<E> {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register a handler. Handlers run in registration order on the
    /// emitting thread.
    pub fn connect<F>(&self, handler: F)
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(handler));
    }

    /// Invoke every handler with `event`.
    pub fn emit(&self, event: &E) {
        // Snapshot so a handler may connect or disconnect without deadlocking.
        let slots: Vec<Slot<E>> = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for slot in slots {
            slot(event);
        }
    }

    /// Drop every handler. Later emits are no-ops.
    pub fn disconnect_all(&self) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl<E> Clone for Signal<E> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<E> Default for Signal<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for Signal<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn every_subscriber_receives_the_event() {
        let signal = Signal::<u32>::new();
        let total = Arc::new(AtomicU32::new(0));
        for _ in 0..3 {
            let total = Arc::clone(&total);
            signal.connect(move |v| {
                total.fetch_add(*v, Ordering::SeqCst);
            });
        }
        signal.emit(&5);
        assert_eq!(total.load(Ordering::SeqCst), 15);
    }

    #[test]
    fn clones_share_subscribers() {
        let signal = Signal::<()>::new();
        let hits = Arc::new(AtomicU32::new(0));
        let h = Arc::clone(&hits);
        signal.connect(move |()| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        let emitter = signal.clone();
        std::thread::spawn(move || emitter.emit(&())).join().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disconnected_signal_is_silent() {
        let signal = Signal::<()>::new();
        let hits = Arc::new(AtomicU32::new(0));
        let h = Arc::clone(&hits);
        signal.connect(move |()| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        signal.disconnect_all();
        signal.emit(&());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn handler_may_connect_during_emit() {
        let signal = Signal::<()>::new();
        let inner = signal.clone();
        signal.connect(move |()| inner.connect(|()| {}));
        signal.emit(&());
        assert_eq!(signal.subscriber_count(), 2);
    }
}
