//! # WorkerActor: one worker under one-for-one supervision.
//!
//! ```text
//! loop {
//!   ├─► attempt += 1, status = Running
//!   ├─► factory.build(config) ─► on_start()            (panics contained)
//!   ├─► publish WorkerStarted
//!   ├─► serve mailbox until cancelled or failure:
//!   │     Message ─► handle()   error/panic ─► failure
//!   │     Query   ─► state()    error/panic ─► reply only
//!   ├─► on failure: publish WorkerFailed
//!   │     ├─ RestartPolicy forbids   ─► WorkerDead, exit
//!   │     ├─ restart budget spent    ─► WorkerDead, exit
//!   │     └─ else: status = Restarting, publish BackoffScheduled,
//!   │              sleep(backoff.next(restarts)) (cancellable), continue
//!   └─► on cancel: exit
//! }
//! ```
//!
//! ## Rules
//! - The mailbox survives restarts; messages arriving during backoff wait for the new state.
//! - Messages are handled one at a time, in arrival order.
//! - Cancellation is honoured while idle, while handling, and during backoff.
//! - A dead worker notifies the supervisor through the exit channel.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{WorkerError, panic_message};
use crate::events::{Event, EventBus, EventKind};
use crate::policies::{BackoffPolicy, RestartPolicy};
use crate::workers::handle::{WorkerRequest, WorkerStatus};
use crate::workers::spec::WorkerConfig;
use crate::workers::worker::{Worker, WorkerContext, WorkerFactory};

/// Why an actor exited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ExitReason {
    /// Cancelled by the supervisor (stop, restart-all, shutdown).
    Cancelled,
    /// Failed and not restarted.
    Dead(String),
}

/// Notice sent to the supervisor when a worker dies on its own.
#[derive(Debug)]
pub(crate) struct WorkerExit {
    pub id: Arc<str>,
    pub instance: u64,
}

/// Policies and plumbing for one worker actor.
pub(crate) struct WorkerActor {
    pub config: WorkerConfig,
    pub factory: Arc<dyn WorkerFactory>,
    pub restart: RestartPolicy,
    pub backoff: BackoffPolicy,
    pub max_restarts: Option<u32>,
    pub bus: EventBus,
    pub status: watch::Sender<WorkerStatus>,
    pub mailbox: mpsc::Receiver<WorkerRequest>,
    pub exits: mpsc::UnboundedSender<WorkerExit>,
    pub instance: u64,
}

impl WorkerActor {
    /// Runs the worker until cancellation or until it dies.
    pub async fn run(mut self, token: CancellationToken) -> ExitReason {
        let id: Arc<str> = Arc::from(self.config.id.as_str());
        let connections = Arc::new(self.config.connections.clone());
        let params = Arc::new(self.config.params.clone());
        let mut attempt: u32 = 0;

        let reason = loop {
            if token.is_cancelled() {
                break ExitReason::Cancelled;
            }
            attempt += 1;
            self.status.send_replace(WorkerStatus::Running);

            let ctx = WorkerContext {
                id: id.clone(),
                cluster_id: self.config.cluster_id,
                connections: connections.clone(),
                params: params.clone(),
                attempt,
                token: token.clone(),
            };

            let err = match self.run_once(&ctx, &token).await {
                None => break ExitReason::Cancelled,
                Some(err) => err,
            };

            warn!(worker = %id, attempt, error = %err, "worker failed");
            self.bus.publish(
                Event::new(EventKind::WorkerFailed)
                    .with_worker(id.clone())
                    .with_attempt(attempt)
                    .with_reason(err.to_string()),
            );

            let restarts = attempt - 1;
            if !self.restart.allows(&err) {
                break ExitReason::Dead(format!("not restarted after: {err}"));
            }
            if self.max_restarts.is_some_and(|limit| restarts >= limit) {
                break ExitReason::Dead(format!("restart budget of {restarts} exhausted"));
            }

            let delay = self.backoff.next(restarts);
            self.status.send_replace(WorkerStatus::Restarting);
            self.bus.publish(
                Event::new(EventKind::BackoffScheduled)
                    .with_worker(id.clone())
                    .with_attempt(attempt)
                    .with_delay(delay)
                    .with_reason(err.to_string()),
            );

            let sleep = time::sleep(delay);
            tokio::pin!(sleep);
            select! {
                _ = &mut sleep => {}
                _ = token.cancelled() => break ExitReason::Cancelled,
            }
        };

        self.status.send_replace(WorkerStatus::Stopped);
        if let ExitReason::Dead(why) = &reason {
            self.bus.publish(
                Event::new(EventKind::WorkerDead)
                    .with_worker(id.clone())
                    .with_attempt(attempt)
                    .with_reason(why.clone()),
            );
            let _ = self.exits.send(WorkerExit {
                id: id.clone(),
                instance: self.instance,
            });
        }
        debug!(worker = %id, ?reason, "worker actor exited");
        reason
    }

    /// Builds fresh state and serves the mailbox.
    ///
    /// Returns `None` on cancellation, `Some(err)` on failure.
    async fn run_once(&mut self, ctx: &WorkerContext, token: &CancellationToken) -> Option<WorkerError> {
        let built = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.factory.build(&self.config)
        }));
        let mut worker: Box<dyn Worker> = match built {
            Ok(w) => w,
            Err(panic) => return Some(panicked(panic_message(panic.as_ref()))),
        };

        select! {
            biased;
            _ = token.cancelled() => return None,
            res = contained(worker.on_start(ctx)) => {
                if let Err(e) = res {
                    return Some(e);
                }
            }
        }

        self.bus.publish(
            Event::new(EventKind::WorkerStarted)
                .with_worker(ctx.id.clone())
                .with_attempt(ctx.attempt),
        );

        loop {
            let req = select! {
                biased;
                _ = token.cancelled() => return None,
                req = self.mailbox.recv() => req,
            };
            // Every sender is gone: nobody can reach this worker any more.
            let Some(req) = req else { return None };

            match req {
                WorkerRequest::Message(msg) => {
                    select! {
                        biased;
                        _ = token.cancelled() => return None,
                        res = contained(worker.handle(msg, ctx)) => {
                            if let Err(e) = res {
                                return Some(e);
                            }
                        }
                    }
                }
                WorkerRequest::Query(reply) => {
                    let answer = contained(worker.state(ctx)).await;
                    let _ = reply.send(answer);
                }
            }
        }
    }
}

/// Awaits a worker callback, converting a panic into a retryable failure.
async fn contained<T, F>(fut: F) -> Result<T, WorkerError>
where
    F: Future<Output = Result<T, WorkerError>>,
{
    match std::panic::AssertUnwindSafe(fut).catch_unwind().await {
        Ok(res) => res,
        Err(panic) => Err(panicked(panic_message(panic.as_ref()))),
    }
}

fn panicked(msg: String) -> WorkerError {
    WorkerError::Fail {
        error: format!("panicked: {msg}"),
    }
}
