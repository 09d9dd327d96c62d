//! Subscriber handles and their inboxes.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::Payload;

static NEXT_SUBSCRIBER: AtomicU64 = AtomicU64::new(1);

/// One message delivered to a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Topic the payload was broadcast on.
    pub topic: Arc<str>,
    /// Broadcast payload.
    pub payload: Payload,
}

/// Sending half of a subscription; cloneable, equality by id.
#[derive(Clone)]
pub struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Delivery>,
}

/// Receiving half of a subscription. Dropping it terminates the subscriber.
pub struct Inbox {
    id: u64,
    rx: mpsc::Receiver<Delivery>,
}

impl Subscriber {
    /// Creates a subscriber with a queue of `capacity` deliveries (min 1).
    pub fn new(capacity: usize) -> (Subscriber, Inbox) {
        let id = NEXT_SUBSCRIBER.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Subscriber { id, tx }, Inbox { id, rx })
    }

    /// Process-unique id.
    /// Id of the subscriber this inbox belongs to.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// False once the inbox is gone.
    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }

    pub(crate) fn try_deliver(&self, d: Delivery) -> Result<(), mpsc::error::TrySendError<Delivery>> {
        self.tx.try_send(d)
    }

    /// Resolves when the inbox has been dropped.
    pub(crate) async fn closed(&self) {
        self.tx.closed().await
    }
}

impl PartialEq for Subscriber {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Subscriber {}

impl Hash for Subscriber {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl Inbox {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the next delivery.
    ///
    /// Returns `None` only when every [`Subscriber`] clone is gone.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    /// Takes a queued delivery without waiting.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }

    /// Number of deliveries waiting.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// True when no delivery is queued.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl fmt::Debug for Inbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inbox")
            .field("id", &self.id)
            .field("queued", &self.rx.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ids_are_unique_and_drop_closes() {
        let (a, inbox) = Subscriber::new(1);
        let (b, _keep) = Subscriber::new(1);
        assert_ne!(a, b);
        assert_eq!(a.id(), inbox.id());

        assert!(a.is_alive());
        drop(inbox);
        a.closed().await;
        assert!(!a.is_alive());
    }

    #[test]
    fn full_queue_rejects() {
        let (s, mut inbox) = Subscriber::new(1);
        let d = Delivery {
            topic: Arc::from("t"),
            payload: Payload::Null,
        };
        s.try_deliver(d.clone()).expect("first fits");
        assert!(matches!(
            s.try_deliver(d.clone()),
            Err(mpsc::error::TrySendError::Full(_))
        ));
        assert_eq!(inbox.try_recv(), Some(d));
    }
}
