//! # Broadcast channel for lifecycle events.
//!
//! [`EventBus`] wraps [`tokio::sync::broadcast`]:
//! - `publish()` never blocks and drops the event when nobody listens;
//! - a single ring buffer of `capacity` events is shared by all receivers;
//! - a receiver that falls behind gets `RecvError::Lagged(n)` and skips `n` events.

use tokio::sync::broadcast;

use super::event::Event;

/// Cloneable handle to the lifecycle event channel.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Creates a bus with the given ring capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all current receivers.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn receivers_only_see_later_events() {
        let bus = EventBus::new(8);
        bus.publish(Event::new(EventKind::WorkerAdded).with_worker("early"));

        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::WorkerAdded).with_worker("late"));

        let ev = rx.recv().await.expect("event");
        assert_eq!(ev.worker.as_deref(), Some("late"));
    }
}
