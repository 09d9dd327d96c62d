//! # Runtime configuration.
//!
//! [`Config`] centralizes every tunable of the runtime. It is used twice:
//! 1. **Runtime creation**: `Runtime::builder(config)`;
//! 2. **Worker defaults**: `WorkerSpec::with_defaults(config, factory, &cfg)`.
//!
//! ## Sentinel values
//! - `max_workers = 0` → unlimited
//! - `max_restarts = 0` → unlimited restarts
//! - `health_interval = 0s` → no periodic health publication

use std::time::Duration;

use crate::policies::{BackoffPolicy, RestartPolicy};

/// Global configuration for the runtime.
///
/// All fields are public; prefer the helper accessors over checking
/// sentinels (`0`) inline.
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum wait for workers/components to exit after cancellation.
    pub grace: Duration,

    /// Upper bound for request/reply calls into any component.
    ///
    /// Exceeding it yields `RuntimeError::Timeout`.
    pub call_timeout: Duration,

    /// Maximum number of registered workers (`0` = unlimited).
    pub max_workers: usize,

    /// Capacity of each worker's mailbox.
    pub mailbox_capacity: usize,

    /// Capacity of the lifecycle event ring buffer (min 1).
    pub bus_capacity: usize,

    /// Default restart policy for workers.
    pub restart: RestartPolicy,

    /// Default backoff between restarts.
    pub backoff: BackoffPolicy,

    /// Maximum restarts per worker before it is declared dead (`0` = unlimited).
    pub max_restarts: u32,

    /// Number of addressable cluster slots (`1..=max_clusters`).
    pub max_clusters: u32,

    /// Size used by `ClusterManager::start_default_cluster`.
    pub default_cluster_size: usize,

    /// Peers drawn for each worker when wiring a cluster.
    pub connections_per_worker: usize,

    /// Bound on one worker state query during a health check.
    pub health_timeout: Duration,

    /// Period of the cluster health loop (`0s` = disabled).
    pub health_interval: Duration,

    /// Entries kept in the message bus history.
    pub log_capacity: usize,

    /// Default queue capacity for message bus subscribers.
    pub subscriber_capacity: usize,

    /// Upper bound on a single routed handler call.
    pub route_timeout: Duration,
}

impl Config {
    /// Worker limit as an `Option` (`None` = unlimited).
    #[inline]
    pub fn worker_limit(&self) -> Option<usize> {
        if self.max_workers == 0 {
            None
        } else {
            Some(self.max_workers)
        }
    }

    /// Restart budget as an `Option` (`None` = unlimited).
    #[inline]
    pub fn restart_limit(&self) -> Option<u32> {
        if self.max_restarts == 0 {
            None
        } else {
            Some(self.max_restarts)
        }
    }

    /// Health loop period as an `Option` (`None` = disabled).
    #[inline]
    pub fn health_period(&self) -> Option<Duration> {
        if self.health_interval == Duration::ZERO {
            None
        } else {
            Some(self.health_interval)
        }
    }

    /// Event bus capacity clamped to at least 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Mailbox capacity clamped to at least 1.
    #[inline]
    pub fn mailbox_capacity_clamped(&self) -> usize {
        self.mailbox_capacity.max(1)
    }
}

impl Default for Config {
    /// - `grace = 5s`, `call_timeout = 5s`, `route_timeout = 5s`
    /// - `max_workers = 0` (unlimited), `max_restarts = 0` (unlimited)
    /// - `mailbox_capacity = 256`, `bus_capacity = 1024`, `subscriber_capacity = 1024`
    /// - `max_clusters = 10`, `default_cluster_size = 1000`, `connections_per_worker = 20`
    /// - `health_timeout = 1s`, `health_interval = 0s` (disabled)
    /// - `log_capacity = 1000`
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(5),
            call_timeout: Duration::from_secs(5),
            max_workers: 0,
            mailbox_capacity: 256,
            bus_capacity: 1024,
            restart: RestartPolicy::default(),
            backoff: BackoffPolicy::default(),
            max_restarts: 0,
            max_clusters: 10,
            default_cluster_size: 1000,
            connections_per_worker: 20,
            health_timeout: Duration::from_secs(1),
            health_interval: Duration::ZERO,
            log_capacity: 1000,
            subscriber_capacity: 1024,
            route_timeout: Duration::from_secs(5),
        }
    }
}
