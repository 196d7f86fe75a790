//! A broadcast-style event bus built on flume channels, generic over any
//! `Clone + Send` message so the same bus shape backs both the `TaskEvent`
//! and `WorkerEvent` streams fanned out over `/events/ws`.

use std::sync::{Arc, Mutex};

/// Each call to [`EventBus::subscribe`] creates a new receiver that will
/// receive all messages published after the subscription was created. The
/// bus is thread-safe and can be cloned cheaply (it wraps its internals in
/// an `Arc`).
#[derive(Clone)]
pub struct EventBus<T> {
    inner: Arc<Mutex<Vec<flume::Sender<T>>>>,
}

impl<T: Clone + Send + 'static> EventBus<T> {
    /// Create a new, empty event bus with no subscribers.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register a new subscriber and return its receiving end.
    pub fn subscribe(&self) -> flume::Receiver<T> {
        let (tx, rx) = flume::unbounded();
        let mut senders = self.inner.lock().expect("EventBus lock poisoned");
        senders.push(tx);
        rx
    }

    /// Publish a message to all current subscribers. Disconnected
    /// subscribers (whose receivers have been dropped) are pruned.
    pub fn publish(&self, msg: T) {
        let mut senders = self.inner.lock().expect("EventBus lock poisoned");
        senders.retain(|tx| tx.send(msg.clone()).is_ok());
    }

    /// Return the number of currently active subscribers.
    pub fn subscriber_count(&self) -> usize {
        let senders = self.inner.lock().expect("EventBus lock poisoned");
        senders.len()
    }
}

impl<T: Clone + Send + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_fans_out_to_all_subscribers() {
        let bus: EventBus<i32> = EventBus::new();
        let rx1 = bus.subscribe();
        let rx2 = bus.subscribe();
        bus.publish(7);
        assert_eq!(rx1.try_recv().unwrap(), 7);
        assert_eq!(rx2.try_recv().unwrap(), 7);
    }

    #[test]
    fn dropped_subscriber_is_pruned_on_next_publish() {
        let bus: EventBus<i32> = EventBus::new();
        let rx = bus.subscribe();
        drop(rx);
        bus.publish(1);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
