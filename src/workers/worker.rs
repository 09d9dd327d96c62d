//! # Worker behaviour and factories.
//!
//! A [`Worker`] owns private mutable state and is driven exclusively by its
//! actor: messages are handled one at a time, in mailbox order. When a worker
//! fails, its actor drops the state and asks the [`WorkerFactory`] for a fresh
//! one; the id, mailbox and handle stay the same.
//!
//! # Example
//! ```
//! use async_trait::async_trait;
//! use neurovisor::{Payload, Worker, WorkerConfig, WorkerContext, WorkerError, WorkerFn};
//!
//! struct Counter { seen: u64 }
//!
//! #[async_trait]
//! impl Worker for Counter {
//!     async fn handle(&mut self, _msg: Payload, _ctx: &WorkerContext) -> Result<(), WorkerError> {
//!         self.seen += 1;
//!         Ok(())
//!     }
//!
//!     async fn state(&self, _ctx: &WorkerContext) -> Result<Payload, WorkerError> {
//!         Ok(self.seen.into())
//!     }
//! }
//!
//! let factory = WorkerFn::arc(|_cfg: &WorkerConfig| Counter { seen: 0 });
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::Payload;
use crate::error::WorkerError;
use crate::workers::spec::WorkerConfig;

/// Execution context handed to every worker callback.
#[derive(Clone, Debug)]
pub struct WorkerContext {
    /// Stable worker id.
    pub id: Arc<str>,
    /// Cluster tag, if any.
    pub cluster_id: Option<u32>,
    /// Ids of the workers this one talks to.
    pub connections: Arc<BTreeSet<String>>,
    /// Opaque start parameters.
    pub params: Arc<Payload>,
    /// Start attempt, 1-based; grows with every restart.
    pub attempt: u32,
    /// Cancelled when the worker is stopped.
    pub token: CancellationToken,
}

/// # Stateful, independently scheduled unit.
///
/// Returning `Err` from [`on_start`](Worker::on_start) or [`handle`](Worker::handle),
/// or panicking in them, is a worker failure: the actor applies the restart policy.
/// Errors from [`state`](Worker::state) are only reported to the caller.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    /// Called once per (re)start before any message is handled.
    async fn on_start(&mut self, _ctx: &WorkerContext) -> Result<(), WorkerError> {
        Ok(())
    }

    /// Handles one mailbox message.
    async fn handle(&mut self, msg: Payload, ctx: &WorkerContext) -> Result<(), WorkerError>;

    /// Answers a state query (used by health checks).
    async fn state(&self, ctx: &WorkerContext) -> Result<Payload, WorkerError>;
}

/// Builds worker state from its configuration.
pub trait WorkerFactory: Send + Sync + 'static {
    /// Returns a fresh worker; called on first start and on every restart.
    fn build(&self, config: &WorkerConfig) -> Box<dyn Worker>;
}

/// Closure-backed [`WorkerFactory`].
pub struct WorkerFn<F> {
    f: F,
}

impl<F, W> WorkerFn<F>
where
    F: Fn(&WorkerConfig) -> W + Send + Sync + 'static,
    W: Worker,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Wraps the closure as a shared factory.
    pub fn arc(f: F) -> Arc<dyn WorkerFactory> {
        Arc::new(Self::new(f))
    }
}

impl<F, W> WorkerFactory for WorkerFn<F>
where
    F: Fn(&WorkerConfig) -> W + Send + Sync + 'static,
    W: Worker,
{
    fn build(&self, config: &WorkerConfig) -> Box<dyn Worker> {
        Box::new((self.f)(config))
    }
}
