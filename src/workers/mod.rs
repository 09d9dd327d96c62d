//! # Workers: behaviour, configuration, handles and the supervising actor.
//!
//! - [`Worker`]: async stateful behaviour (start hook, message handler, state query)
//! - [`WorkerFactory`] / [`WorkerFn`]: builds a fresh [`Worker`] for every (re)start
//! - [`WorkerConfig`] / [`WorkerSpec`]: identity, cluster tag, connections, opaque params, policies
//! - [`WorkerHandle`]: cloneable address of a running worker
//! - [`Neuron`]: built-in leaky integrate-and-fire worker used by clusters
//!
//! The restart loop itself lives in the private `actor` module.

pub(crate) mod actor;
mod handle;
mod neuron;
mod spec;
mod worker;

pub use handle::{WorkerHandle, WorkerStatus};
pub use neuron::Neuron;
pub use spec::{WorkerConfig, WorkerSpec};
pub use worker::{Worker, WorkerContext, WorkerFactory, WorkerFn};

pub(crate) use handle::WorkerRequest;
