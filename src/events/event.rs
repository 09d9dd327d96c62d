//! # Runtime events emitted by the supervisor, workers, clusters, bus and router.
//!
//! Each [`Event`] carries a process-wide monotonic `seq`; use it to restore
//! order when events from different sources interleave.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use neurovisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::BackoffScheduled)
//!     .with_worker("cluster-1-neuron-7")
//!     .with_attempt(2)
//!     .with_delay(Duration::from_millis(400));
//!
//! assert_eq!(ev.kind, EventKind::BackoffScheduled);
//! assert_eq!(ev.delay_ms, Some(400));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Worker lifecycle ===
    /// Worker registered by the supervisor.
    ///
    /// Sets: `worker`, `cluster` (if tagged).
    WorkerAdded,

    /// Worker state was (re)built and its mailbox loop is running.
    ///
    /// Sets: `worker`, `attempt` (1 on first start, +1 per restart).
    WorkerStarted,

    /// Worker returned an error or panicked.
    ///
    /// Sets: `worker`, `attempt`, `reason`.
    WorkerFailed,

    /// Restart scheduled after a failure.
    ///
    /// Sets: `worker`, `attempt` (the failed one), `delay_ms`, `reason`.
    BackoffScheduled,

    /// Worker will not be restarted (policy forbids it or restart budget exhausted).
    ///
    /// Sets: `worker`, `attempt`, `reason`.
    WorkerDead,

    /// Worker removed from the registry.
    ///
    /// Sets: `worker`, `reason`: `"stopped"` (stop or shutdown), `"restart_all"`,
    /// `"dead"` (not restarted), or `"aborted"` (ignored cancellation past grace).
    WorkerRemoved,

    // === Clusters ===
    /// Cluster started.
    ///
    /// Sets: `cluster`, `count` (workers actually started).
    ClusterStarted,

    /// Cluster stopped.
    ///
    /// Sets: `cluster`, `count` (workers stopped).
    ClusterStopped,

    /// A cluster's load is outside the balanced band.
    ///
    /// Sets: `cluster`, `count` (its workers), `reason` (`"overloaded"`/`"underloaded"`).
    LoadImbalance,

    // === Message bus ===
    /// A subscriber terminated and was removed from all its topics.
    ///
    /// Sets: `subscriber`.
    SubscriberDown,

    /// A delivery was dropped because the subscriber's queue was full.
    ///
    /// Sets: `subscriber`, `topic`.
    SubscriberOverflow,

    // === Router ===
    /// A routed call failed (handler error, panic or timeout).
    ///
    /// Sets: `topic` (`"category/key"`), `reason`.
    RouteFailed,

    // === Observers ===
    /// Observer panicked while handling an event.
    ///
    /// Sets: `worker` (observer name), `reason`.
    ObserverPanicked,

    /// Observer queue was full or closed; the event was dropped for it.
    ///
    /// Sets: `worker` (observer name), `reason`.
    ObserverOverflow,

    // === Shutdown ===
    /// Shutdown requested (signal or explicit call).
    ShutdownRequested,

    /// All components stopped within the grace period.
    AllStoppedWithin,

    /// Grace period exceeded.
    GraceExceeded,
}

/// Runtime event with optional metadata; which fields are set depends on [`EventKind`].
#[derive(Clone, Debug)]
pub struct Event {
    /// Process-wide monotonic sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Worker id (or observer name for observer events).
    pub worker: Option<Arc<str>>,
    /// Cluster id.
    pub cluster: Option<u32>,
    /// Topic (or `category/key` for router events).
    pub topic: Option<Arc<str>>,
    /// Subscriber id.
    pub subscriber: Option<u64>,
    /// Human-readable reason.
    pub reason: Option<Arc<str>>,
    /// Start attempt, 1-based.
    pub attempt: Option<u32>,
    /// Restart delay in milliseconds.
    pub delay_ms: Option<u32>,
    /// Generic count (workers started/stopped, cluster load).
    pub count: Option<usize>,
}

impl Event {
    /// Creates an event stamped with the current time and the next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            worker: None,
            cluster: None,
            topic: None,
            subscriber: None,
            reason: None,
            attempt: None,
            delay_ms: None,
            count: None,
        }
    }

    #[inline]
    pub fn with_worker(mut self, worker: impl Into<Arc<str>>) -> Self {
        self.worker = Some(worker.into());
        self
    }

    #[inline]
    pub fn with_cluster(mut self, cluster: u32) -> Self {
        self.cluster = Some(cluster);
        self
    }

    #[inline]
    pub fn with_topic(mut self, topic: impl Into<Arc<str>>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    #[inline]
    pub fn with_subscriber(mut self, id: u64) -> Self {
        self.subscriber = Some(id);
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a delay (stored as milliseconds, saturating at `u32::MAX`).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(d.as_millis().min(u128::from(u32::MAX)) as u32);
        self
    }

    #[inline]
    pub fn with_count(mut self, n: usize) -> Self {
        self.count = Some(n);
        self
    }

    /// Observer panic event.
    pub fn observer_panicked(observer: &'static str, info: String) -> Self {
        Event::new(EventKind::ObserverPanicked)
            .with_worker(observer)
            .with_reason(info)
    }

    /// Observer overflow event.
    pub fn observer_overflow(observer: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::ObserverOverflow)
            .with_worker(observer)
            .with_reason(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic() {
        let a = Event::new(EventKind::WorkerAdded);
        let b = Event::new(EventKind::WorkerAdded);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn delay_saturates() {
        let ev = Event::new(EventKind::BackoffScheduled).with_delay(Duration::from_secs(u64::MAX / 2));
        assert_eq!(ev.delay_ms, Some(u32::MAX));
    }
}
