//! Bus actor and its handle.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::Payload;
use crate::core::{Config, mailbox};
use crate::error::RuntimeError;
use crate::events::{Event, EventBus, EventKind};

use super::log::{LogEntry, MessageLog};
use super::subscriber::{Delivery, Inbox, Subscriber};

const COMPONENT: &str = "message_bus";

enum Command {
    Subscribe {
        topic: Arc<str>,
        sub: Subscriber,
        reply: oneshot::Sender<()>,
    },
    Unsubscribe {
        topic: Arc<str>,
        id: u64,
        reply: oneshot::Sender<()>,
    },
    Broadcast {
        topic: Arc<str>,
        payload: Payload,
        exclude: Vec<u64>,
    },
    Down {
        id: u64,
    },
    History {
        reply: oneshot::Sender<Vec<LogEntry>>,
    },
    SubscriberCount {
        topic: Arc<str>,
        reply: oneshot::Sender<usize>,
    },
    Topics {
        reply: oneshot::Sender<Vec<String>>,
    },
}

/// Address of the message bus actor.
#[derive(Clone)]
pub struct MessageBus {
    tx: mpsc::UnboundedSender<Command>,
    cfg: Arc<Config>,
}

impl MessageBus {
    /// Spawns the bus actor; it exits when `token` is cancelled.
    pub fn spawn(cfg: Arc<Config>, events: EventBus, token: CancellationToken) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = BusActor {
            topics: HashMap::new(),
            monitors: HashMap::new(),
            log: MessageLog::new(cfg.log_capacity),
            events,
            tx: tx.downgrade(),
            token: token.clone(),
        };
        let join = tokio::spawn(actor.run(rx));
        (Self { tx, cfg }, join)
    }

    /// Creates a subscriber sized with `Config::subscriber_capacity`.
    pub fn subscriber(&self) -> (Subscriber, Inbox) {
        Subscriber::new(self.cfg.subscriber_capacity)
    }

    /// Adds `sub` to `topic`. Subscribing twice is a no-op.
    pub async fn subscribe(&self, topic: &str, sub: &Subscriber) -> Result<(), RuntimeError> {
        let topic = Arc::from(topic);
        let sub = sub.clone();
        mailbox::call_unbounded(&self.tx, COMPONENT, "subscribe", self.cfg.call_timeout, |reply| {
            Command::Subscribe { topic, sub, reply }
        })
        .await
    }

    /// Removes `sub` from `topic`. Unknown pairs are ignored.
    pub async fn unsubscribe(&self, topic: &str, sub: &Subscriber) -> Result<(), RuntimeError> {
        let topic = Arc::from(topic);
        let id = sub.id();
        mailbox::call_unbounded(&self.tx, COMPONENT, "unsubscribe", self.cfg.call_timeout, |reply| {
            Command::Unsubscribe { topic, id, reply }
        })
        .await
    }

    /// Delivers `payload` to every subscriber of `topic` except `exclude`.
    ///
    /// Returns immediately; fails only when the bus has shut down.
    pub fn broadcast(&self, topic: &str, payload: Payload, exclude: &[Subscriber]) -> Result<(), RuntimeError> {
        self.tx
            .send(Command::Broadcast {
                topic: Arc::from(topic),
                payload,
                exclude: exclude.iter().map(Subscriber::id).collect(),
            })
            .map_err(|_| RuntimeError::Closed { component: COMPONENT })
    }

    /// [`broadcast`](Self::broadcast) with nobody excluded.
    pub fn publish(&self, topic: &str, payload: Payload) -> Result<(), RuntimeError> {
        self.broadcast(topic, payload, &[])
    }

    /// Recorded messages, oldest first.
    pub async fn history(&self) -> Result<Vec<LogEntry>, RuntimeError> {
        mailbox::call_unbounded(&self.tx, COMPONENT, "history", self.cfg.call_timeout, |reply| {
            Command::History { reply }
        })
        .await
    }

    /// Number of live subscribers on `topic`.
    pub async fn subscriber_count(&self, topic: &str) -> Result<usize, RuntimeError> {
        let topic = Arc::from(topic);
        mailbox::call_unbounded(&self.tx, COMPONENT, "subscriber_count", self.cfg.call_timeout, |reply| {
            Command::SubscriberCount { topic, reply }
        })
        .await
    }

    /// Topics with at least one subscriber, sorted.
    pub async fn topics(&self) -> Result<Vec<String>, RuntimeError> {
        mailbox::call_unbounded(&self.tx, COMPONENT, "topics", self.cfg.call_timeout, |reply| {
            Command::Topics { reply }
        })
        .await
    }
}

struct BusActor {
    topics: HashMap<Arc<str>, BTreeMap<u64, Subscriber>>,
    /// Liveness monitor per subscribed id.
    monitors: HashMap<u64, JoinHandle<()>>,
    log: MessageLog,
    events: EventBus,
    tx: mpsc::WeakUnboundedSender<Command>,
    token: CancellationToken,
}

impl BusActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        loop {
            select! {
                biased;
                _ = self.token.cancelled() => break,
                cmd = rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
            }
        }
        for (_, m) in self.monitors.drain() {
            m.abort();
        }
        debug!("message bus exited");
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Subscribe { topic, sub, reply } => {
                self.subscribe(topic, sub);
                let _ = reply.send(());
            }
            Command::Unsubscribe { topic, id, reply } => {
                self.unsubscribe(&topic, id);
                let _ = reply.send(());
            }
            Command::Broadcast {
                topic,
                payload,
                exclude,
            } => self.broadcast(topic, payload, &exclude),
            Command::Down { id } => {
                if self.forget(id) {
                    debug!(subscriber = id, "subscriber terminated, removed from all topics");
                    self.events
                        .publish(Event::new(EventKind::SubscriberDown).with_subscriber(id));
                }
            }
            Command::History { reply } => {
                let _ = reply.send(self.log.snapshot());
            }
            Command::SubscriberCount { topic, reply } => {
                let _ = reply.send(self.topics.get(&topic).map_or(0, BTreeMap::len));
            }
            Command::Topics { reply } => {
                let mut all: Vec<String> = self.topics.keys().map(|t| t.to_string()).collect();
                all.sort_unstable();
                let _ = reply.send(all);
            }
        }
    }

    fn subscribe(&mut self, topic: Arc<str>, sub: Subscriber) {
        let id = sub.id();
        if !self.monitors.contains_key(&id) {
            let m = self.monitor(sub.clone());
            self.monitors.insert(id, m);
        }
        trace!(subscriber = id, topic = %topic, "subscribed");
        self.topics.entry(topic).or_default().insert(id, sub);
    }

    fn unsubscribe(&mut self, topic: &str, id: u64) {
        if let Some(subs) = self.topics.get_mut(topic) {
            subs.remove(&id);
            if subs.is_empty() {
                self.topics.remove(topic);
            }
        }
        if !self.topics.values().any(|subs| subs.contains_key(&id)) {
            if let Some(m) = self.monitors.remove(&id) {
                m.abort();
            }
        }
    }

    /// Removes `id` from every topic. Returns false if it was unknown.
    fn forget(&mut self, id: u64) -> bool {
        let mut found = false;
        self.topics.retain(|_, subs| {
            found |= subs.remove(&id).is_some();
            !subs.is_empty()
        });
        if let Some(m) = self.monitors.remove(&id) {
            m.abort();
        }
        found
    }

    fn broadcast(&mut self, topic: Arc<str>, payload: Payload, exclude: &[u64]) {
        let mut dead = Vec::new();
        let mut delivered = 0usize;

        if let Some(subs) = self.topics.get(&topic) {
            for (id, sub) in subs {
                if exclude.contains(id) {
                    continue;
                }
                let d = Delivery {
                    topic: topic.clone(),
                    payload: payload.clone(),
                };
                match sub.try_deliver(d) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(subscriber = id, topic = %topic, "subscriber queue full, delivery dropped");
                        self.events.publish(
                            Event::new(EventKind::SubscriberOverflow)
                                .with_subscriber(*id)
                                .with_topic(topic.clone()),
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => dead.push(*id),
                }
            }
        }

        for id in dead {
            if self.forget(id) {
                self.events
                    .publish(Event::new(EventKind::SubscriberDown).with_subscriber(id));
            }
        }

        trace!(topic = %topic, delivered, "broadcast");
        self.log.push(LogEntry {
            at: SystemTime::now(),
            topic: topic.to_string(),
            payload,
        });
    }

    fn monitor(&self, sub: Subscriber) -> JoinHandle<()> {
        let tx = self.tx.clone();
        let token = self.token.clone();
        tokio::spawn(async move {
            select! {
                _ = sub.closed() => {
                    if let Some(tx) = tx.upgrade() {
                        let _ = tx.send(Command::Down { id: sub.id() });
                    }
                }
                _ = token.cancelled() => {}
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn bus(cfg: Config) -> (MessageBus, EventBus) {
        let events = EventBus::new(256);
        let (bus, _join) = MessageBus::spawn(Arc::new(cfg), events.clone(), CancellationToken::new());
        (bus, events)
    }

    #[tokio::test]
    async fn exclude_skips_sender() {
        let (bus, _) = bus(Config::default());
        let (a, mut a_in) = bus.subscriber();
        let (b, mut b_in) = bus.subscriber();
        bus.subscribe("t", &a).await.expect("subscribe");
        bus.subscribe("t", &b).await.expect("subscribe");

        bus.broadcast("t", json!(1), std::slice::from_ref(&a)).expect("broadcast");
        let got = b_in.recv().await.expect("delivery");
        assert_eq!(got.payload, json!(1));

        bus.history().await.expect("sync");
        assert!(a_in.try_recv().is_none());
    }

    #[tokio::test]
    async fn dropped_inbox_is_forgotten() {
        let (bus, events) = bus(Config::default());
        let mut rx = events.subscribe();
        let (s, inbox) = bus.subscriber();
        bus.subscribe("a", &s).await.expect("subscribe");
        bus.subscribe("b", &s).await.expect("subscribe");

        drop(inbox);
        let ev = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("in time")
            .expect("event");
        assert_eq!(ev.kind, EventKind::SubscriberDown);
        assert_eq!(ev.subscriber, Some(s.id()));
        assert!(bus.topics().await.expect("topics").is_empty());
    }

    #[tokio::test]
    async fn full_queue_drops_only_that_subscriber() {
        let (bus, _) = bus(Config::default());
        let (slow, mut slow_in) = Subscriber::new(1);
        let (fast, mut fast_in) = Subscriber::new(8);
        bus.subscribe("t", &slow).await.expect("subscribe");
        bus.subscribe("t", &fast).await.expect("subscribe");

        bus.publish("t", json!(1)).expect("publish");
        bus.publish("t", json!(2)).expect("publish");
        bus.history().await.expect("sync");

        assert_eq!(fast_in.len(), 2);
        assert_eq!(slow_in.try_recv().map(|d| d.payload), Some(json!(1)));
        assert!(slow_in.try_recv().is_none());
        assert_eq!(bus.subscriber_count("t").await.expect("count"), 2);
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let (bus, _) = bus(Config::default());
        let (s, _inbox) = bus.subscriber();
        bus.subscribe("t", &s).await.expect("subscribe");
        bus.unsubscribe("t", &s).await.expect("unsubscribe");
        bus.unsubscribe("t", &s).await.expect("unsubscribe again");
        assert_eq!(bus.subscriber_count("t").await.expect("count"), 0);
    }
}
