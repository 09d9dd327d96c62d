//! Manager actor and its handle.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::{Config, mailbox};
use crate::error::RuntimeError;
use crate::events::{Event, EventBus, EventKind};
use crate::pubsub::MessageBus;
use crate::supervisor::WorkerSupervisor;
use crate::workers::{WorkerConfig, WorkerFactory, WorkerHandle, WorkerSpec};

use super::report::{ClusterInfo, HealthReport, LoadReport};
use super::topology::{primes, wire, worker_name};

/// Topic carrying periodic [`HealthReport`]s.
pub const HEALTH_TOPIC: &str = "cluster.health";
/// Topic carrying [`LoadReport`]s from [`ClusterManager::balance_load`].
pub const BALANCE_TOPIC: &str = "cluster.balance";

const COMPONENT: &str = "cluster_manager";

/// Upper bound on `start_cluster` sizes when `max_workers` is unlimited.
pub const MAX_CLUSTER_SIZE: usize = 100_000;

enum Command {
    Reserve {
        cluster_id: u32,
        size: usize,
        reply: oneshot::Sender<Result<u64, RuntimeError>>,
    },
    Commit {
        cluster_id: u32,
        generation: u64,
        members: BTreeMap<String, WorkerHandle>,
        reply: oneshot::Sender<bool>,
    },
    Take {
        cluster_id: u32,
        reply: oneshot::Sender<Vec<WorkerHandle>>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<(u32, Vec<WorkerHandle>)>>,
    },
    Clusters {
        reply: oneshot::Sender<Vec<ClusterInfo>>,
    },
}

/// Frees a slot whose reservation was never committed.
struct Release {
    cluster_id: u32,
    generation: u64,
}

struct Cluster {
    generation: u64,
    target_size: usize,
    members: BTreeMap<String, WorkerHandle>,
}

/// Address of the cluster manager actor.
#[derive(Clone)]
pub struct ClusterManager {
    tx: mpsc::Sender<Command>,
    releases: mpsc::UnboundedSender<Release>,
    cfg: Arc<Config>,
    supervisor: WorkerSupervisor,
    bus: MessageBus,
    events: EventBus,
    factory: Arc<dyn WorkerFactory>,
}

impl ClusterManager {
    /// Spawns the manager actor and, with `health_interval > 0`, its health loop.
    ///
    /// `factory` builds every cluster member.
    pub fn spawn(
        cfg: Arc<Config>,
        supervisor: WorkerSupervisor,
        bus: MessageBus,
        events: EventBus,
        factory: Arc<dyn WorkerFactory>,
        token: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(cfg.mailbox_capacity_clamped());
        let (releases, releases_rx) = mpsc::unbounded_channel();
        let join = tokio::spawn(run(rx, releases_rx, cfg.max_clusters, token.clone()));
        let manager = Self {
            tx,
            releases,
            cfg,
            supervisor,
            bus,
            events,
            factory,
        };
        if let Some(period) = manager.cfg.health_period() {
            tokio::spawn(health_loop(manager.clone(), period, token));
        }
        (manager, join)
    }

    /// Starts `size` workers tagged with `cluster_id`, keyed by prime token.
    ///
    /// Workers that fail to start are logged and left out of the map; once the
    /// supervisor reports its worker limit, no further members are attempted.
    /// `size` above the worker limit (or [`MAX_CLUSTER_SIZE`] when unlimited)
    /// is rejected before the slot is claimed.
    ///
    /// If the call is abandoned before the members are recorded, the members
    /// started so far are stopped and the slot is freed again.
    pub async fn start_cluster(
        &self,
        cluster_id: u32,
        size: usize,
    ) -> Result<BTreeMap<u64, WorkerHandle>, RuntimeError> {
        self.check(cluster_id)?;
        let limit = self
            .cfg
            .worker_limit()
            .map_or(MAX_CLUSTER_SIZE, |l| l.min(MAX_CLUSTER_SIZE));
        if size > limit {
            return Err(RuntimeError::ResourceExhausted { limit });
        }

        let generation = mailbox::call(&self.tx, COMPONENT, "start_cluster", self.cfg.call_timeout, |reply| {
            Command::Reserve {
                cluster_id,
                size,
                reply,
            }
        })
        .await??;
        let mut reservation = Reservation {
            cluster_id,
            generation,
            started: Vec::new(),
            pending: None,
            supervisor: self.supervisor.clone(),
            releases: self.releases.clone(),
            armed: true,
        };

        let tokens = primes(size);
        let names: Vec<String> = tokens.iter().map(|&t| worker_name(cluster_id, t)).collect();
        let wiring = wire(cluster_id, &names, self.cfg.connections_per_worker);

        let mut started = BTreeMap::new();
        let mut members = BTreeMap::new();
        for ((token, name), peers) in tokens.into_iter().zip(names).zip(wiring) {
            let config = WorkerConfig::new(name.clone())
                .with_cluster(cluster_id)
                .with_connections(peers)
                .with_params(json!({ "token": token }));
            let spec = WorkerSpec::with_defaults(config, self.factory.clone(), &self.cfg);
            reservation.pending = Some(name.clone());
            let res = self.supervisor.start(spec).await;
            reservation.pending = None;
            match res {
                Ok(handle) => {
                    reservation.started.push(handle.clone());
                    members.insert(name, handle.clone());
                    started.insert(token, handle);
                }
                Err(e @ RuntimeError::ResourceExhausted { .. }) => {
                    warn!(cluster_id, worker = %name, error = %e, "worker limit reached, cluster left short");
                    break;
                }
                Err(e) => warn!(cluster_id, worker = %name, error = %e, "cluster member failed to start"),
            }
        }

        let count = started.len();
        let committed = mailbox::call(&self.tx, COMPONENT, "start_cluster", self.cfg.call_timeout, |reply| {
            Command::Commit {
                cluster_id,
                generation,
                members,
                reply,
            }
        })
        .await;

        match committed {
            Ok(true) => reservation.keep(),
            Ok(false) => {
                warn!(cluster_id, "cluster stopped while starting, releasing members");
                reservation.abandon().await;
                return Ok(BTreeMap::new());
            }
            Err(e) => {
                reservation.abandon().await;
                return Err(e);
            }
        }

        info!(cluster_id, started = count, requested = size, "cluster started");
        self.events.publish(
            Event::new(EventKind::ClusterStarted)
                .with_cluster(cluster_id)
                .with_count(count),
        );
        Ok(started)
    }

    /// [`start_cluster`](Self::start_cluster) with `Config::default_cluster_size`.
    pub async fn start_default_cluster(
        &self,
        cluster_id: u32,
    ) -> Result<BTreeMap<u64, WorkerHandle>, RuntimeError> {
        self.start_cluster(cluster_id, self.cfg.default_cluster_size).await
    }

    /// Stops every member, and any supervised worker tagged with the cluster.
    ///
    /// Returns how many workers were actually stopped.
    pub async fn stop_cluster(&self, cluster_id: u32) -> Result<usize, RuntimeError> {
        self.check(cluster_id)?;
        let members = mailbox::call(&self.tx, COMPONENT, "stop_cluster", self.cfg.call_timeout, |reply| {
            Command::Take { cluster_id, reply }
        })
        .await?;

        let mut ids: BTreeSet<String> = members.iter().map(|h| h.id().to_string()).collect();
        for h in self.supervisor.list().await? {
            if h.cluster_id() == Some(cluster_id) {
                ids.insert(h.id().to_string());
            }
        }

        let mut stopped = 0usize;
        for id in &ids {
            match self.supervisor.stop_id(id).await {
                Ok(()) => stopped += 1,
                Err(RuntimeError::NotFound { .. }) => {}
                Err(e) => warn!(cluster_id, worker = %id, error = %e, "failed to stop cluster member"),
            }
        }

        info!(cluster_id, stopped, "cluster stopped");
        self.events.publish(
            Event::new(EventKind::ClusterStopped)
                .with_cluster(cluster_id)
                .with_count(stopped),
        );
        Ok(stopped)
    }

    /// Health of every slot in `1..=max_clusters`.
    ///
    /// A member is healthy if it is alive and answers a state query within
    /// `health_timeout`. All members are queried concurrently.
    pub async fn health(&self) -> Result<HealthReport, RuntimeError> {
        let slots = self.snapshot().await?;
        let bound = self.cfg.health_timeout;

        let counts = join_all(slots.into_iter().map(|(cluster_id, members)| async move {
            let checks = join_all(members.iter().map(|h| async move {
                h.is_alive() && h.query_state(bound).await.is_ok()
            }))
            .await;
            let healthy = checks.into_iter().filter(|ok| *ok).count();
            (cluster_id, healthy, members.len())
        }))
        .await;

        Ok(HealthReport::from_counts(counts))
    }

    /// Classifies clusters against the average load and reports on
    /// [`BALANCE_TOPIC`]. No worker is moved.
    pub async fn balance_load(&self) -> Result<LoadReport, RuntimeError> {
        let loads = self
            .snapshot()
            .await?
            .into_iter()
            .map(|(id, members)| (id, members.len()))
            .collect();
        let report = LoadReport::from_loads(loads, self.cfg.max_clusters);

        if report.is_balanced() {
            debug!(average = report.average, "cluster load balanced");
        } else {
            info!(
                average = report.average,
                overloaded = ?report.overloaded,
                underloaded = ?report.underloaded,
                "cluster load imbalance, no migration performed"
            );
            for load in &report.per_cluster {
                let side = if report.overloaded.contains(&load.cluster_id) {
                    "overloaded"
                } else if report.underloaded.contains(&load.cluster_id) {
                    "underloaded"
                } else {
                    continue;
                };
                self.events.publish(
                    Event::new(EventKind::LoadImbalance)
                        .with_cluster(load.cluster_id)
                        .with_count(load.workers)
                        .with_reason(side),
                );
            }
        }

        self.publish_json(BALANCE_TOPIC, &report);
        Ok(report)
    }

    /// Started clusters, by id.
    pub async fn clusters(&self) -> Result<Vec<ClusterInfo>, RuntimeError> {
        mailbox::call(&self.tx, COMPONENT, "clusters", self.cfg.call_timeout, |reply| {
            Command::Clusters { reply }
        })
        .await
    }

    fn check(&self, cluster_id: u32) -> Result<(), RuntimeError> {
        if (1..=self.cfg.max_clusters).contains(&cluster_id) {
            Ok(())
        } else {
            Err(RuntimeError::InvalidCluster {
                cluster_id,
                max: self.cfg.max_clusters,
            })
        }
    }

    async fn snapshot(&self) -> Result<Vec<(u32, Vec<WorkerHandle>)>, RuntimeError> {
        mailbox::call(&self.tx, COMPONENT, "snapshot", self.cfg.call_timeout, |reply| {
            Command::Snapshot { reply }
        })
        .await
    }

    fn publish_json<T: Serialize>(&self, topic: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(payload) => {
                if let Err(e) = self.bus.publish(topic, payload) {
                    debug!(topic, error = %e, "report not published");
                }
            }
            Err(e) => warn!(topic, error = %e, "report not serializable"),
        }
    }
}

/// A claimed but uncommitted cluster slot.
///
/// Dropped while armed (caller gave up, panic), it stops the members started
/// so far in a background task and then frees the slot.
struct Reservation {
    cluster_id: u32,
    generation: u64,
    started: Vec<WorkerHandle>,
    /// Member whose start was sent but not yet answered.
    pending: Option<String>,
    supervisor: WorkerSupervisor,
    releases: mpsc::UnboundedSender<Release>,
    armed: bool,
}

impl Reservation {
    fn keep(mut self) {
        self.armed = false;
    }

    async fn abandon(mut self) {
        self.armed = false;
        let started = std::mem::take(&mut self.started);
        release(
            &self.supervisor,
            &self.releases,
            started,
            None,
            self.cluster_id,
            self.generation,
        )
        .await;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let started = std::mem::take(&mut self.started);
        let pending = self.pending.take();
        let (cluster_id, generation) = (self.cluster_id, self.generation);
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                let supervisor = self.supervisor.clone();
                let releases = self.releases.clone();
                rt.spawn(async move {
                    release(&supervisor, &releases, started, pending, cluster_id, generation).await;
                });
            }
            Err(_) => {
                let _ = self.releases.send(Release {
                    cluster_id,
                    generation,
                });
            }
        }
    }
}

/// Stops `started` and `pending`, then frees the slot, so a later start
/// never races the old members for their ids.
///
/// A pending start was queued at the supervisor before this runs, so stopping
/// it by id finds it if it succeeded.
async fn release(
    supervisor: &WorkerSupervisor,
    releases: &mpsc::UnboundedSender<Release>,
    started: Vec<WorkerHandle>,
    pending: Option<String>,
    cluster_id: u32,
    generation: u64,
) {
    let ids = started.iter().map(|h| h.id().to_string()).chain(pending);
    for id in ids {
        match supervisor.stop_id(&id).await {
            Ok(()) | Err(RuntimeError::NotFound { .. }) => {}
            Err(e) => warn!(cluster_id, worker = %id, error = %e, "failed to release cluster member"),
        }
    }
    debug!(cluster_id, generation, released = started.len(), "cluster reservation released");
    let _ = releases.send(Release {
        cluster_id,
        generation,
    });
}

async fn run(
    mut rx: mpsc::Receiver<Command>,
    mut releases: mpsc::UnboundedReceiver<Release>,
    max_clusters: u32,
    token: CancellationToken,
) {
    let mut clusters: BTreeMap<u32, Cluster> = BTreeMap::new();
    let mut next_generation = 0u64;

    loop {
        let cmd = select! {
            biased;
            _ = token.cancelled() => break,
            Some(Release { cluster_id, generation }) = releases.recv() => {
                if clusters.get(&cluster_id).is_some_and(|c| c.generation == generation) {
                    clusters.remove(&cluster_id);
                }
                continue;
            }
            cmd = rx.recv() => match cmd {
                Some(cmd) => cmd,
                None => break,
            },
        };

        match cmd {
            Command::Reserve {
                cluster_id,
                size,
                reply,
            } => {
                let res = if clusters.contains_key(&cluster_id) {
                    Err(RuntimeError::ClusterActive { cluster_id })
                } else {
                    next_generation += 1;
                    clusters.insert(
                        cluster_id,
                        Cluster {
                            generation: next_generation,
                            target_size: size,
                            members: BTreeMap::new(),
                        },
                    );
                    Ok(next_generation)
                };
                if let Err(Ok(generation)) = reply.send(res) {
                    // Caller gave up before learning it owns the slot.
                    if clusters.get(&cluster_id).is_some_and(|c| c.generation == generation) {
                        clusters.remove(&cluster_id);
                    }
                }
            }
            Command::Commit {
                cluster_id,
                generation,
                members,
                reply,
            } => {
                let ok = match clusters.get_mut(&cluster_id) {
                    Some(c) if c.generation == generation => {
                        c.members = members;
                        true
                    }
                    _ => false,
                };
                let _ = reply.send(ok);
            }
            Command::Take { cluster_id, reply } => {
                let members = clusters
                    .remove(&cluster_id)
                    .map(|c| c.members.into_values().collect())
                    .unwrap_or_default();
                let _ = reply.send(members);
            }
            Command::Snapshot { reply } => {
                let slots = (1..=max_clusters)
                    .map(|id| {
                        let members = clusters
                            .get(&id)
                            .map(|c| c.members.values().cloned().collect())
                            .unwrap_or_default();
                        (id, members)
                    })
                    .collect();
                let _ = reply.send(slots);
            }
            Command::Clusters { reply } => {
                let info = clusters
                    .iter()
                    .map(|(&cluster_id, c)| ClusterInfo {
                        cluster_id,
                        members: c.members.len(),
                        target_size: c.target_size,
                    })
                    .collect();
                let _ = reply.send(info);
            }
        }
    }
    debug!("cluster manager exited");
}

async fn health_loop(manager: ClusterManager, period: time::Duration, token: CancellationToken) {
    let mut tick = time::interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so reports start one period in.
    tick.tick().await;

    loop {
        select! {
            _ = token.cancelled() => break,
            _ = tick.tick() => {}
        }
        match manager.health().await {
            Ok(report) => {
                debug!(overall = report.overall, "cluster health");
                manager.publish_json(HEALTH_TOPIC, &report);
            }
            Err(e) => warn!(error = %e, "cluster health check failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::Neuron;

    fn manager(cfg: Config) -> (ClusterManager, WorkerSupervisor, MessageBus) {
        let cfg = Arc::new(cfg);
        let events = EventBus::new(1024);
        let token = CancellationToken::new();
        let (sup, _) = WorkerSupervisor::spawn(cfg.clone(), events.clone(), token.clone());
        let (bus, _) = MessageBus::spawn(cfg.clone(), events.clone(), token.clone());
        let (mgr, _) = ClusterManager::spawn(cfg, sup.clone(), bus.clone(), events, Neuron::factory(), token);
        (mgr, sup, bus)
    }

    #[tokio::test]
    async fn rejects_out_of_range_ids() {
        let (mgr, _, _) = manager(Config::default());
        for bad in [0, 11] {
            let err = mgr.start_cluster(bad, 1).await.unwrap_err();
            assert_eq!(err, RuntimeError::InvalidCluster { cluster_id: bad, max: 10 });
        }
    }

    #[tokio::test]
    async fn second_start_is_cluster_active() {
        let (mgr, _, _) = manager(Config::default());
        mgr.start_cluster(2, 2).await.expect("start");
        let err = mgr.start_cluster(2, 2).await.unwrap_err();
        assert_eq!(err, RuntimeError::ClusterActive { cluster_id: 2 });
    }

    #[tokio::test]
    async fn members_carry_tag_and_peers() {
        let (mgr, sup, _) = manager(Config::default());
        let workers = mgr.start_cluster(4, 5).await.expect("start");
        assert_eq!(workers.keys().copied().collect::<Vec<_>>(), vec![2, 3, 5, 7, 11]);

        let h = sup.get("cluster-4-neuron-7").await.expect("get").expect("registered");
        assert_eq!(h.cluster_id(), Some(4));
        let state = h.query_state(time::Duration::from_secs(1)).await.expect("state");
        let peers = state["connections"].as_u64().expect("connections");
        assert!((1..=4).contains(&peers));
    }

    #[tokio::test]
    async fn stop_cluster_frees_the_slot() {
        let (mgr, sup, _) = manager(Config::default());
        mgr.start_cluster(1, 3).await.expect("start");
        assert_eq!(mgr.stop_cluster(1).await.expect("stop"), 3);
        assert_eq!(sup.count().await.expect("count").total, 0);
        assert!(mgr.clusters().await.expect("clusters").is_empty());
        mgr.start_cluster(1, 1).await.expect("start again");
    }

    #[tokio::test]
    async fn balance_report_is_published() {
        let (mgr, _, bus) = manager(Config::default());
        let (sub, mut inbox) = bus.subscriber();
        bus.subscribe(BALANCE_TOPIC, &sub).await.expect("subscribe");

        mgr.start_cluster(1, 10).await.expect("start");
        let report = mgr.balance_load().await.expect("balance");
        assert_eq!(report.average, 1.0);
        assert_eq!(report.overloaded, vec![1]);
        assert_eq!(report.underloaded.len(), 9);

        let got = inbox.recv().await.expect("delivery");
        assert_eq!(got.payload["overloaded"], json!([1]));
    }

    #[tokio::test]
    async fn oversized_cluster_is_rejected_without_claiming_the_slot() {
        let (mgr, _, _) = manager(Config::default());
        let err = mgr.start_cluster(1, usize::MAX).await.unwrap_err();
        assert_eq!(err, RuntimeError::ResourceExhausted { limit: MAX_CLUSTER_SIZE });

        let (mgr, _, _) = manager(Config {
            max_workers: 4,
            ..Config::default()
        });
        let err = mgr.start_cluster(1, 5).await.unwrap_err();
        assert_eq!(err, RuntimeError::ResourceExhausted { limit: 4 });
        assert!(mgr.clusters().await.expect("clusters").is_empty());
        assert_eq!(mgr.start_cluster(1, 1).await.expect("start").len(), 1);
    }

    #[tokio::test]
    async fn members_stop_at_the_worker_limit() {
        let (mgr, sup, _) = manager(Config {
            max_workers: 3,
            ..Config::default()
        });
        let spec = WorkerSpec::with_defaults(WorkerConfig::new("other"), Neuron::factory(), &Config::default());
        sup.start(spec).await.expect("start");

        let workers = mgr.start_cluster(1, 3).await.expect("start");
        assert_eq!(workers.keys().copied().collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(mgr.clusters().await.expect("clusters")[0].members, 2);
    }

    #[tokio::test]
    async fn caller_giving_up_before_reply_frees_the_slot() {
        let (mgr, _, _) = manager(Config::default());
        let _ = time::timeout(time::Duration::ZERO, mgr.start_cluster(3, 2)).await;

        assert!(mgr.clusters().await.expect("clusters").is_empty());
        assert_eq!(mgr.start_cluster(3, 2).await.expect("start").len(), 2);
    }

    #[tokio::test]
    async fn abandoned_start_stops_members_and_frees_the_slot() {
        let (mgr, sup, _) = manager(Config::default());
        let task = tokio::spawn({
            let mgr = mgr.clone();
            async move { mgr.start_cluster(2, 500).await }
        });
        while sup.count().await.expect("count").total == 0 {
            tokio::task::yield_now().await;
        }
        task.abort();
        if task.await.is_ok() {
            mgr.stop_cluster(2).await.expect("stop");
        }

        let mut restarted = None;
        for _ in 0..500 {
            match mgr.start_cluster(2, 3).await {
                Ok(workers) => {
                    restarted = Some(workers);
                    break;
                }
                Err(RuntimeError::ClusterActive { .. }) => time::sleep(time::Duration::from_millis(10)).await,
                Err(e) => panic!("unexpected: {e}"),
            }
        }
        let workers = restarted.expect("slot freed");
        assert_eq!(workers.len(), 3);
        assert_eq!(sup.count().await.expect("count").total, 3);
    }
}
