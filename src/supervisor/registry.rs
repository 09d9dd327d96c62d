//! # Registry actor: owns the worker table.
//!
//! ```text
//! select! (biased)
//!   ├─ runtime token cancelled ─► stop everything, exit
//!   ├─ exit notice (instance) ─► drop entry if still current, WorkerRemoved
//!   └─ command ─► Start / Stop / Count / List / Get / RestartAll
//! ```
//!
//! Each entry remembers the instance number it was spawned with, so a late
//! exit notice from a previous worker with the same id is ignored.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::Config;
use crate::error::RuntimeError;
use crate::events::{Event, EventBus, EventKind};
use crate::workers::actor::{ExitReason, WorkerActor, WorkerExit};
use crate::workers::{WorkerHandle, WorkerSpec, WorkerStatus};

use super::handle::WorkerCount;

pub(super) enum Command {
    Start {
        spec: WorkerSpec,
        reply: oneshot::Sender<Result<WorkerHandle, RuntimeError>>,
    },
    Stop {
        id: String,
        reply: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Count {
        reply: oneshot::Sender<WorkerCount>,
    },
    List {
        reply: oneshot::Sender<Vec<WorkerHandle>>,
    },
    Get {
        id: String,
        reply: oneshot::Sender<Option<WorkerHandle>>,
    },
    RestartAll {
        reply: oneshot::Sender<usize>,
    },
}

struct Entry {
    handle: WorkerHandle,
    join: JoinHandle<ExitReason>,
    cancel: CancellationToken,
    instance: u64,
}

pub(super) struct Registry {
    cfg: Arc<Config>,
    bus: EventBus,
    token: CancellationToken,
    entries: HashMap<Arc<str>, Entry>,
    next_instance: u64,
    exits_tx: mpsc::UnboundedSender<WorkerExit>,
    exits_rx: mpsc::UnboundedReceiver<WorkerExit>,
}

impl Registry {
    pub(super) fn new(cfg: Arc<Config>, bus: EventBus, token: CancellationToken) -> Self {
        let (exits_tx, exits_rx) = mpsc::unbounded_channel();
        Self {
            cfg,
            bus,
            token,
            entries: HashMap::new(),
            next_instance: 0,
            exits_tx,
            exits_rx,
        }
    }

    pub(super) async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        loop {
            select! {
                biased;
                _ = self.token.cancelled() => break,
                Some(exit) = self.exits_rx.recv() => self.on_exit(exit),
                cmd = rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd).await,
                    None => break,
                },
            }
        }

        let stopped = self.stop_all("stopped").await;
        debug!(stopped, "supervisor exited");
    }

    async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Start { spec, reply } => {
                let _ = reply.send(self.start(spec));
            }
            Command::Stop { id, reply } => {
                let _ = reply.send(self.stop(&id).await);
            }
            Command::Count { reply } => {
                let active = self
                    .entries
                    .values()
                    .filter(|e| e.handle.status() == WorkerStatus::Running)
                    .count();
                let _ = reply.send(WorkerCount {
                    active,
                    total: self.entries.len(),
                });
            }
            Command::List { reply } => {
                let mut all: Vec<WorkerHandle> =
                    self.entries.values().map(|e| e.handle.clone()).collect();
                all.sort_unstable_by(|a, b| a.id().cmp(b.id()));
                let _ = reply.send(all);
            }
            Command::Get { id, reply } => {
                let _ = reply.send(self.entries.get(id.as_str()).map(|e| e.handle.clone()));
            }
            Command::RestartAll { reply } => {
                let n = self.stop_all("restart_all").await;
                info!(stopped = n, "all workers stopped for restart");
                let _ = reply.send(n);
            }
        }
    }

    fn start(&mut self, spec: WorkerSpec) -> Result<WorkerHandle, RuntimeError> {
        let id: Arc<str> = Arc::from(spec.id());
        if self.entries.contains_key(&id) {
            return Err(RuntimeError::DuplicateId { id: id.to_string() });
        }
        if let Some(limit) = self.cfg.worker_limit() {
            if self.entries.len() >= limit {
                return Err(RuntimeError::ResourceExhausted { limit });
            }
        }

        self.next_instance += 1;
        let instance = self.next_instance;
        let (tx, mailbox) = mpsc::channel(self.cfg.mailbox_capacity_clamped());
        let (status_tx, status_rx) = watch::channel(WorkerStatus::Running);
        let cancel = self.token.child_token();

        let handle = WorkerHandle::new(id.clone(), spec.config().cluster_id, tx, status_rx);
        let actor = WorkerActor {
            config: spec.config().clone(),
            factory: spec.factory().clone(),
            restart: spec.restart(),
            backoff: spec.backoff(),
            max_restarts: self.cfg.restart_limit(),
            bus: self.bus.clone(),
            status: status_tx,
            mailbox,
            exits: self.exits_tx.clone(),
            instance,
        };
        let join = tokio::spawn(actor.run(cancel.clone()));

        self.entries.insert(
            id.clone(),
            Entry {
                handle: handle.clone(),
                join,
                cancel,
                instance,
            },
        );
        let mut added = Event::new(EventKind::WorkerAdded).with_worker(id.clone());
        if let Some(cluster) = spec.config().cluster_id() {
            added = added.with_cluster(cluster);
        }
        self.bus.publish(added);
        debug!(worker = %id, instance, "worker started");
        Ok(handle)
    }

    async fn stop(&mut self, id: &str) -> Result<(), RuntimeError> {
        let Some((id, entry)) = self.entries.remove_entry(id) else {
            return Err(RuntimeError::NotFound { id: id.to_string() });
        };
        entry.cancel.cancel();
        self.join_within(&id, entry.join, self.cfg.grace, "stopped").await;
        Ok(())
    }

    /// Cancels every worker, then joins them within one shared grace period.
    async fn stop_all(&mut self, reason: &'static str) -> usize {
        let drained: Vec<(Arc<str>, Entry)> = self.entries.drain().collect();
        for (_, e) in &drained {
            e.cancel.cancel();
        }

        let n = drained.len();
        let deadline = time::Instant::now() + self.cfg.grace;
        for (id, e) in drained {
            let left = deadline.saturating_duration_since(time::Instant::now());
            self.join_within(&id, e.join, left, reason).await;
        }
        n
    }

    /// Joins a cancelled worker; one that outlives `grace` is aborted and
    /// reported as `"aborted"` instead of `reason`.
    async fn join_within(
        &self,
        id: &Arc<str>,
        mut join: JoinHandle<ExitReason>,
        grace: Duration,
        reason: &'static str,
    ) {
        let reason = match time::timeout(grace, &mut join).await {
            Ok(Ok(exit)) => {
                debug!(worker = %id, ?exit, "worker joined");
                reason
            }
            Ok(Err(e)) => {
                warn!(worker = %id, error = %e, "worker task failed to join");
                reason
            }
            Err(_) => {
                warn!(worker = %id, ?grace, "worker ignored cancellation, aborting");
                join.abort();
                "aborted"
            }
        };
        self.bus.publish(
            Event::new(EventKind::WorkerRemoved)
                .with_worker(id.clone())
                .with_reason(reason),
        );
    }

    fn on_exit(&mut self, exit: WorkerExit) {
        let current = self
            .entries
            .get(&exit.id)
            .is_some_and(|e| e.instance == exit.instance);
        if !current {
            return;
        }
        self.entries.remove(&exit.id);
        info!(worker = %exit.id, "dead worker removed");
        self.bus.publish(
            Event::new(EventKind::WorkerRemoved)
                .with_worker(exit.id)
                .with_reason("dead"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::super::WorkerSupervisor;
    use super::*;
    use crate::Payload;
    use crate::error::WorkerError;
    use crate::policies::{BackoffPolicy, RestartPolicy};
    use crate::workers::{Worker, WorkerConfig, WorkerContext, WorkerFn};
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl Worker for Echo {
        async fn handle(&mut self, msg: Payload, _ctx: &WorkerContext) -> Result<(), WorkerError> {
            if msg == "die" {
                return Err(WorkerError::fatal("asked to die"));
            }
            Ok(())
        }

        async fn state(&self, ctx: &WorkerContext) -> Result<Payload, WorkerError> {
            Ok(Payload::from(ctx.attempt))
        }
    }

    fn spec(id: &str) -> WorkerSpec {
        WorkerSpec::new(
            WorkerConfig::new(id),
            WorkerFn::arc(|_cfg: &WorkerConfig| Echo),
            RestartPolicy::OnFailure,
            BackoffPolicy::constant(Duration::from_millis(1)),
        )
    }

    fn supervisor(cfg: Config) -> (WorkerSupervisor, EventBus, CancellationToken) {
        let bus = EventBus::new(256);
        let token = CancellationToken::new();
        let (sup, _join) = WorkerSupervisor::spawn(Arc::new(cfg), bus.clone(), token.clone());
        (sup, bus, token)
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let (sup, _bus, _token) = supervisor(Config::default());
        let first = sup.start(spec("a")).await.expect("first start");
        let err = sup.start(spec("a")).await.unwrap_err();
        assert_eq!(err, RuntimeError::DuplicateId { id: "a".into() });

        assert_eq!(sup.count().await.expect("count"), WorkerCount { active: 1, total: 1 });
        assert!(first.is_alive());
        let state = first.query_state(Duration::from_secs(1)).await.expect("state");
        assert_eq!(state, Payload::from(1));
    }

    #[tokio::test]
    async fn worker_limit_is_enforced() {
        let cfg = Config {
            max_workers: 1,
            ..Config::default()
        };
        let (sup, _bus, _token) = supervisor(cfg);
        sup.start(spec("a")).await.expect("start");
        let err = sup.start(spec("b")).await.unwrap_err();
        assert_eq!(err, RuntimeError::ResourceExhausted { limit: 1 });
    }

    #[tokio::test]
    async fn second_stop_is_not_found() {
        let (sup, _bus, _token) = supervisor(Config::default());
        let h = sup.start(spec("a")).await.expect("start");
        sup.stop(&h).await.expect("stop");
        assert!(!h.is_alive());
        assert_eq!(
            sup.stop(&h).await.unwrap_err(),
            RuntimeError::NotFound { id: "a".into() }
        );
        assert_eq!(sup.count().await.expect("count").total, 0);
    }

    #[tokio::test]
    async fn dead_workers_leave_the_registry() {
        let (sup, bus, _token) = supervisor(Config::default());
        let mut events = bus.subscribe();
        let h = sup.start(spec("a")).await.expect("start");
        h.send("die".into()).expect("send");
        h.closed().await;

        loop {
            let ev = events.recv().await.expect("event");
            if ev.kind == EventKind::WorkerRemoved {
                break;
            }
        }
        assert!(sup.get("a").await.expect("get").is_none());
        // The id is free again.
        sup.start(spec("a")).await.expect("restart under same id");
    }

    #[tokio::test]
    async fn restart_all_reports_and_empties() {
        let (sup, _bus, _token) = supervisor(Config::default());
        for id in ["c", "a", "b"] {
            sup.start(spec(id)).await.expect("start");
        }
        let ids: Vec<String> = sup
            .list()
            .await
            .expect("list")
            .iter()
            .map(|h| h.id().to_string())
            .collect();
        assert_eq!(ids, ["a", "b", "c"]);

        assert_eq!(sup.restart_all().await.expect("restart_all"), 3);
        assert_eq!(sup.count().await.expect("count"), WorkerCount::default());
    }

    #[tokio::test]
    async fn removal_events_name_the_cause() {
        let (sup, bus, _token) = supervisor(Config::default());
        let mut events = bus.subscribe();
        let tagged = WorkerSpec::new(
            WorkerConfig::new("m").with_cluster(3),
            WorkerFn::arc(|_cfg: &WorkerConfig| Echo),
            RestartPolicy::OnFailure,
            BackoffPolicy::constant(Duration::from_millis(1)),
        );
        sup.start(tagged).await.expect("start");
        sup.start(spec("a")).await.expect("start");
        sup.stop_id("a").await.expect("stop");
        sup.restart_all().await.expect("restart_all");

        let mut added = Vec::new();
        let mut removed = Vec::new();
        while let Ok(ev) = events.try_recv() {
            let worker = ev.worker.as_deref().unwrap_or_default().to_string();
            match ev.kind {
                EventKind::WorkerAdded => added.push((worker, ev.cluster)),
                EventKind::WorkerRemoved => {
                    removed.push((worker, ev.reason.as_deref().unwrap_or_default().to_string()))
                }
                _ => {}
            }
        }
        assert_eq!(added, [("m".to_string(), Some(3)), ("a".to_string(), None)]);
        assert_eq!(
            removed,
            [
                ("a".to_string(), "stopped".to_string()),
                ("m".to_string(), "restart_all".to_string()),
            ]
        );
    }
}
