//! # Worker handles.
//!
//! A [`WorkerHandle`] is the only way to reach a worker: it carries the
//! mailbox sender and a status watch published by the worker's actor.
//! The mailbox outlives restarts, so a handle stays valid until the worker
//! is stopped or declared dead.
//!
//! Liveness: when the actor exits, the mailbox receiver is dropped and
//! [`WorkerHandle::closed`] resolves.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};

use crate::Payload;
use crate::core::mailbox;
use crate::error::{RuntimeError, WorkerError};

/// Observable state of a worker's actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    /// State built, mailbox being served.
    Running,
    /// Failed; waiting for the backoff delay before rebuilding.
    Restarting,
    /// Actor exited (stopped or dead).
    Stopped,
}

/// Requests served by a worker's mailbox loop.
pub(crate) enum WorkerRequest {
    /// Fire-and-forget message for [`Worker::handle`](crate::Worker::handle).
    Message(Payload),
    /// State query for [`Worker::state`](crate::Worker::state).
    Query(oneshot::Sender<Result<Payload, WorkerError>>),
}

/// Cloneable address of a supervised worker; equality and hashing use the id.
#[derive(Clone)]
pub struct WorkerHandle {
    id: Arc<str>,
    cluster_id: Option<u32>,
    tx: mpsc::Sender<WorkerRequest>,
    status: watch::Receiver<WorkerStatus>,
}

impl WorkerHandle {
    pub(crate) fn new(
        id: Arc<str>,
        cluster_id: Option<u32>,
        tx: mpsc::Sender<WorkerRequest>,
        status: watch::Receiver<WorkerStatus>,
    ) -> Self {
        Self {
            id,
            cluster_id,
            tx,
            status,
        }
    }

    /// Worker id, unique within the supervisor.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Cluster tag, set only for cluster members.
    pub fn cluster_id(&self) -> Option<u32> {
        self.cluster_id
    }

    /// Last status published by the actor.
    pub fn status(&self) -> WorkerStatus {
        *self.status.borrow()
    }

    /// True while the actor runs and is not stopped.
    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed() && self.status() != WorkerStatus::Stopped
    }

    /// Queues a message without waiting.
    ///
    /// Fails with `ResourceExhausted` when the mailbox is full and `NotFound`
    /// when the worker has terminated.
    pub fn send(&self, msg: Payload) -> Result<(), RuntimeError> {
        self.tx
            .try_send(WorkerRequest::Message(msg))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => RuntimeError::ResourceExhausted {
                    limit: self.tx.max_capacity(),
                },
                mpsc::error::TrySendError::Closed(_) => RuntimeError::NotFound {
                    id: self.id.to_string(),
                },
            })
    }

    /// Asks the worker for its state, waiting at most `bound`.
    ///
    /// A worker waiting to restart does not answer and the call times out.
    pub async fn query_state(&self, bound: Duration) -> Result<Payload, RuntimeError> {
        let answer = mailbox::call(&self.tx, "worker", "query_state", bound, WorkerRequest::Query)
            .await
            .map_err(|e| match e {
                RuntimeError::Closed { .. } => RuntimeError::NotFound {
                    id: self.id.to_string(),
                },
                other => other,
            })?;
        answer.map_err(|error| RuntimeError::Worker {
            id: self.id.to_string(),
            error,
        })
    }

    /// Resolves once the worker has terminated.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

impl PartialEq for WorkerHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for WorkerHandle {}

impl Hash for WorkerHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.id)
            .field("cluster_id", &self.cluster_id)
            .field("status", &self.status())
            .finish()
    }
}
