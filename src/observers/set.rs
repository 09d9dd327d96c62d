//! # Non-blocking fan-out to observers.
//!
//! ```text
//! emit(event)
//!     ├──► [queue 1] ──► worker 1 ──► observer1.on_event()   (panic → ObserverPanicked)
//!     └──► [queue N] ──► worker N ──► observerN.on_event()
//! ```
//!
//! `emit()` uses `try_send` and returns immediately. Overflow drops the event
//! for that observer and publishes `ObserverOverflow`, except when the event
//! being dropped is itself an overflow report.

use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::error::panic_message;
use crate::events::{Event, EventBus, EventKind};
use crate::observers::Observe;

struct ObserverChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Per-observer queues and worker tasks.
pub struct ObserverSet {
    channels: Vec<ObserverChannel>,
    workers: Vec<JoinHandle<()>>,
    bus: EventBus,
}

impl ObserverSet {
    /// Spawns one worker task per observer.
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn Observe>>, bus: EventBus) -> Self {
        let mut channels = Vec::with_capacity(observers.len());
        let mut workers = Vec::with_capacity(observers.len());

        for obs in observers {
            let name = obs.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(obs.queue_capacity().max(1));
            let bus_for_worker = bus.clone();

            let handle = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let fut = obs.on_event(ev.as_ref());
                    if let Err(panic) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        bus_for_worker
                            .publish(Event::observer_panicked(name, panic_message(panic.as_ref())));
                    }
                }
            });
            channels.push(ObserverChannel { name, sender: tx });
            workers.push(handle);
        }
        Self {
            channels,
            workers,
            bus,
        }
    }

    /// Number of observers in the set.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// True when no observers are registered.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Queues `event` for every observer without waiting.
    pub fn emit(&self, event: Event) {
        let is_overflow = matches!(event.kind, EventKind::ObserverOverflow);
        let event = Arc::new(event);

        for channel in &self.channels {
            let reason = match channel.sender.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            if !is_overflow {
                self.bus.publish(Event::observer_overflow(channel.name, reason));
            }
        }
    }

    /// Closes all queues and waits for the workers to drain them.
    pub async fn shutdown(self) {
        drop(self.channels);
        for h in self.workers {
            let _ = h.await;
        }
    }
}
