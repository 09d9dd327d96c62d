//! # Worker configuration and supervision spec.
//!
//! [`WorkerConfig`] is the caller-supplied identity and parameters;
//! [`WorkerSpec`] adds the factory and the restart/backoff policies, either
//! explicitly ([`WorkerSpec::new`]) or inherited from [`Config`]
//! ([`WorkerSpec::with_defaults`]).

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::Payload;
use crate::core::Config;
use crate::policies::{BackoffPolicy, RestartPolicy};
use crate::workers::worker::WorkerFactory;

/// Start parameters of one worker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Globally unique id, stable across restarts.
    pub id: String,
    /// Cluster tag; only the cluster manager sets it, so every tagged
    /// worker is listed by its cluster.
    #[serde(skip)]
    pub(crate) cluster_id: Option<u32>,
    /// Ids of the workers this one communicates with.
    #[serde(default)]
    pub connections: BTreeSet<String>,
    /// Opaque parameters passed through to the worker.
    #[serde(default)]
    pub params: Payload,
}

impl WorkerConfig {
    /// Untagged config with no connections and `null` params.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cluster_id: None,
            connections: BTreeSet::new(),
            params: Payload::Null,
        }
    }

    pub(crate) fn with_cluster(mut self, cluster_id: u32) -> Self {
        self.cluster_id = Some(cluster_id);
        self
    }

    /// Cluster this worker belongs to, if started by the cluster manager.
    pub fn cluster_id(&self) -> Option<u32> {
        self.cluster_id
    }

    pub fn with_connections(mut self, connections: impl IntoIterator<Item = String>) -> Self {
        self.connections = connections.into_iter().collect();
        self
    }

    pub fn with_params(mut self, params: Payload) -> Self {
        self.params = params;
        self
    }
}

/// Everything the supervisor needs to start and restart a worker.
#[derive(Clone)]
pub struct WorkerSpec {
    config: WorkerConfig,
    factory: Arc<dyn WorkerFactory>,
    restart: RestartPolicy,
    backoff: BackoffPolicy,
}

impl WorkerSpec {
    /// Spec with explicit policies.
    pub fn new(
        config: WorkerConfig,
        factory: Arc<dyn WorkerFactory>,
        restart: RestartPolicy,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            config,
            factory,
            restart,
            backoff,
        }
    }

    /// Inherits restart and backoff policies from the runtime config.
    pub fn with_defaults(
        config: WorkerConfig,
        factory: Arc<dyn WorkerFactory>,
        cfg: &Config,
    ) -> Self {
        Self::new(config, factory, cfg.restart, cfg.backoff)
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn factory(&self) -> &Arc<dyn WorkerFactory> {
        &self.factory
    }

    pub fn restart(&self) -> RestartPolicy {
        self.restart
    }

    pub fn backoff(&self) -> BackoffPolicy {
        self.backoff
    }

    pub fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = restart;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

impl fmt::Debug for WorkerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerSpec")
            .field("config", &self.config)
            .field("restart", &self.restart)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}
