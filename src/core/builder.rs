use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cluster::ClusterManager;
use crate::core::Config;
use crate::core::runtime::{Runtime, listen};
use crate::events::EventBus;
use crate::observers::{Observe, ObserverSet};
use crate::pubsub::MessageBus;
use crate::router::MessageRouter;
use crate::supervisor::WorkerSupervisor;
use crate::workers::{Neuron, WorkerFactory};

/// Builder for a [`Runtime`] with optional observers and cluster worker factory.
pub struct RuntimeBuilder {
    cfg: Config,
    observers: Vec<Arc<dyn Observe>>,
    factory: Option<Arc<dyn WorkerFactory>>,
}

impl RuntimeBuilder {
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            observers: Vec::new(),
            factory: None,
        }
    }

    /// Sets lifecycle observers.
    ///
    /// Each observer gets its own bounded queue and task; see [`ObserverSet`].
    pub fn with_observers(mut self, observers: Vec<Arc<dyn Observe>>) -> Self {
        self.observers = observers;
        self
    }

    /// Factory used for cluster members. Defaults to [`Neuron::factory`].
    pub fn with_factory(mut self, factory: Arc<dyn WorkerFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Spawns every component. Must be called inside a tokio runtime.
    pub fn build(self) -> Runtime {
        let cfg = Arc::new(self.cfg);
        let events = EventBus::new(cfg.bus_capacity_clamped());
        let token = CancellationToken::new();

        let listener = if self.observers.is_empty() {
            None
        } else {
            let set = ObserverSet::new(self.observers, events.clone());
            let stop = CancellationToken::new();
            let join = tokio::spawn(listen(events.subscribe(), set, stop.clone()));
            Some((stop, join))
        };

        let (supervisor, sup_join) = WorkerSupervisor::spawn(cfg.clone(), events.clone(), token.clone());
        let (bus, bus_join) = MessageBus::spawn(cfg.clone(), events.clone(), token.clone());
        let (router, router_join) = MessageRouter::spawn(cfg.clone(), events.clone(), token.clone());
        let (clusters, clusters_join) = ClusterManager::spawn(
            cfg.clone(),
            supervisor.clone(),
            bus.clone(),
            events.clone(),
            self.factory.unwrap_or_else(Neuron::factory),
            token.clone(),
        );

        Runtime {
            cfg,
            events,
            token,
            supervisor,
            clusters,
            bus,
            router,
            joins: vec![
                ("cluster_manager", clusters_join),
                ("message_router", router_join),
                ("message_bus", bus_join),
                ("supervisor", sup_join),
            ],
            listener,
        }
    }
}
