//! # LogWriter: events to `tracing`.
//!
//! Maps each [`Event`] to one `tracing` record with structured fields.
//! Failures and drops go to `warn`, lifecycle transitions to `info`,
//! per-delivery chatter to `debug`.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::observers::Observe;

/// Observer that writes every event through `tracing`.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Observe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let worker = e.worker.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::WorkerAdded => debug!(seq = e.seq, worker, cluster = ?e.cluster, "worker added"),
            EventKind::WorkerStarted => debug!(seq = e.seq, worker, attempt = ?e.attempt, "worker started"),
            EventKind::WorkerFailed => warn!(seq = e.seq, worker, attempt = ?e.attempt, reason, "worker failed"),
            EventKind::BackoffScheduled => info!(
                seq = e.seq,
                worker,
                delay_ms = ?e.delay_ms,
                after_attempt = ?e.attempt,
                "worker restart scheduled"
            ),
            EventKind::WorkerDead => warn!(seq = e.seq, worker, attempt = ?e.attempt, reason, "worker dead"),
            EventKind::WorkerRemoved => debug!(seq = e.seq, worker, reason, "worker removed"),
            EventKind::ClusterStarted => info!(cluster = ?e.cluster, workers = ?e.count, "cluster started"),
            EventKind::ClusterStopped => info!(cluster = ?e.cluster, workers = ?e.count, "cluster stopped"),
            EventKind::LoadImbalance => warn!(cluster = ?e.cluster, workers = ?e.count, reason, "cluster load imbalance"),
            EventKind::SubscriberDown => debug!(subscriber = ?e.subscriber, "subscriber down"),
            EventKind::SubscriberOverflow => warn!(
                subscriber = ?e.subscriber,
                topic = e.topic.as_deref().unwrap_or("-"),
                "delivery dropped, subscriber queue full"
            ),
            EventKind::RouteFailed => warn!(route = e.topic.as_deref().unwrap_or("-"), reason, "route failed"),
            EventKind::ObserverPanicked => warn!(observer = worker, reason, "observer panicked"),
            EventKind::ObserverOverflow => warn!(observer = worker, reason, "observer dropped event"),
            EventKind::ShutdownRequested => info!("shutdown requested"),
            EventKind::AllStoppedWithin => info!("all components stopped within grace"),
            EventKind::GraceExceeded => warn!("shutdown grace exceeded"),
        }
    }

    fn name(&self) -> &'static str {
        "log_writer"
    }
}
