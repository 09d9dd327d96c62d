//! Cloneable handle to the supervisor actor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::{Config, mailbox};
use crate::error::RuntimeError;
use crate::events::EventBus;
use crate::workers::{WorkerHandle, WorkerSpec};

use super::registry::{Command, Registry};

const COMPONENT: &str = "supervisor";

/// Worker counts reported by [`WorkerSupervisor::count`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerCount {
    /// Registered workers currently serving their mailbox.
    pub active: usize,
    /// All registered workers, including those waiting to restart.
    pub total: usize,
}

/// Address of the supervisor actor.
#[derive(Clone)]
pub struct WorkerSupervisor {
    tx: mpsc::Sender<Command>,
    cfg: Arc<Config>,
}

impl WorkerSupervisor {
    /// Spawns the supervisor actor. It stops (and stops all workers) when `token` is cancelled.
    pub fn spawn(cfg: Arc<Config>, bus: EventBus, token: CancellationToken) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(cfg.mailbox_capacity_clamped());
        let registry = Registry::new(cfg.clone(), bus, token.clone());
        let join = tokio::spawn(registry.run(rx));
        (Self { tx, cfg }, join)
    }

    /// Starts a worker.
    ///
    /// Fails with `DuplicateId` if the id is registered, `ResourceExhausted`
    /// at the worker limit, `Timeout` if the supervisor is saturated.
    pub async fn start(&self, spec: WorkerSpec) -> Result<WorkerHandle, RuntimeError> {
        mailbox::call(&self.tx, COMPONENT, "start", self.cfg.call_timeout, |reply| {
            Command::Start { spec, reply }
        })
        .await?
    }

    /// Stops a worker and waits (up to `grace`) for it to exit.
    pub async fn stop(&self, handle: &WorkerHandle) -> Result<(), RuntimeError> {
        self.stop_id(handle.id()).await
    }

    /// Same as [`stop`](Self::stop), by id.
    pub async fn stop_id(&self, id: &str) -> Result<(), RuntimeError> {
        let id = id.to_string();
        mailbox::call(&self.tx, COMPONENT, "stop", self.stop_bound(), |reply| {
            Command::Stop { id, reply }
        })
        .await?
    }

    /// Active and total worker counts.
    pub async fn count(&self) -> Result<WorkerCount, RuntimeError> {
        mailbox::call(&self.tx, COMPONENT, "count", self.cfg.call_timeout, |reply| {
            Command::Count { reply }
        })
        .await
    }

    /// Snapshot of registered workers, sorted by id.
    ///
    /// Not linearizable with concurrent start/stop.
    pub async fn list(&self) -> Result<Vec<WorkerHandle>, RuntimeError> {
        mailbox::call(&self.tx, COMPONENT, "list", self.cfg.call_timeout, |reply| {
            Command::List { reply }
        })
        .await
    }

    /// Looks up one worker.
    pub async fn get(&self, id: &str) -> Result<Option<WorkerHandle>, RuntimeError> {
        let id = id.to_string();
        mailbox::call(&self.tx, COMPONENT, "get", self.cfg.call_timeout, |reply| {
            Command::Get { id, reply }
        })
        .await
    }

    /// Stops every worker, waiting up to `grace`. Returns how many were stopped.
    pub async fn restart_all(&self) -> Result<usize, RuntimeError> {
        mailbox::call(&self.tx, COMPONENT, "restart_all", self.stop_bound(), |reply| {
            Command::RestartAll { reply }
        })
        .await
    }

    fn stop_bound(&self) -> Duration {
        self.cfg.call_timeout + self.cfg.grace
    }
}
