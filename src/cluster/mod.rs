//! # ClusterManager: prime-token clusters over the supervisor.
//!
//! ```text
//! start_cluster(id, n)
//!   ├─► Reserve(id) ──► manager actor   (InvalidCluster / ClusterActive)
//!   ├─► tokens = primes(n), names = cluster-{id}-neuron-{prime}
//!   ├─► wire(id) ──► seeded peers per worker
//!   ├─► WorkerSupervisor::start(spec) for each (failures logged, skipped)
//!   └─► Commit(id, members) ──► manager actor
//!
//! health()       Snapshot ──► is_alive && query_state(health_timeout), all members concurrently
//! balance_load() Snapshot ──► LoadReport ──► log + "cluster.balance"
//! health loop    every health_interval ──► health() ──► "cluster.health"
//! ```
//!
//! The actor owns membership only; worker calls happen in the caller's task.
//! A member stopped behind the manager's back stays listed and counts as
//! unhealthy until its cluster is stopped.

mod manager;
mod report;
mod topology;

pub use manager::{BALANCE_TOPIC, ClusterManager, HEALTH_TOPIC, MAX_CLUSTER_SIZE};
pub use report::{ClusterHealth, ClusterInfo, ClusterLoad, HealthReport, LoadReport};
pub use topology::{primes, worker_name};
