//! # Runtime: owns the four components and drives shutdown.
//!
//! ```text
//! Runtime::builder(cfg).build()
//!   ├─ EventBus ──► listener ──► ObserverSet ──► observers
//!   ├─ WorkerSupervisor ◄─┬─ ClusterManager (+ health loop)
//!   ├─ MessageBus ◄───────┘
//!   └─ MessageRouter
//!
//! shutdown():
//!   publish ShutdownRequested ─► cancel runtime token
//!   ─► join components within grace
//!        ├─ all joined ─► AllStoppedWithin
//!        └─ overrun    ─► abort stuck, GraceExceeded { stuck }
//!   ─► drain observers
//! ```
//!
//! ## Example
//! ```rust
//! use neurovisor::{Config, Runtime};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), neurovisor::RuntimeError> {
//!     let rt = Runtime::builder(Config::default()).build();
//!
//!     let members = rt.clusters().start_cluster(1, 3).await?;
//!     assert_eq!(members.len(), 3);
//!
//!     let health = rt.clusters().health().await?;
//!     assert_eq!(health.overall, 100.0);
//!
//!     rt.shutdown().await
//! }
//! ```

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cluster::ClusterManager;
use crate::core::builder::RuntimeBuilder;
use crate::core::{Config, shutdown};
use crate::error::RuntimeError;
use crate::events::{Event, EventBus, EventKind};
use crate::observers::ObserverSet;
use crate::pubsub::MessageBus;
use crate::router::MessageRouter;
use crate::supervisor::WorkerSupervisor;

/// Running instance of every component, with explicit handles.
pub struct Runtime {
    pub(crate) cfg: Arc<Config>,
    pub(crate) events: EventBus,
    pub(crate) token: CancellationToken,
    pub(crate) supervisor: WorkerSupervisor,
    pub(crate) clusters: ClusterManager,
    pub(crate) bus: MessageBus,
    pub(crate) router: MessageRouter,
    pub(crate) joins: Vec<(&'static str, JoinHandle<()>)>,
    pub(crate) listener: Option<(CancellationToken, JoinHandle<()>)>,
}

impl Runtime {
    /// Starts configuring a runtime.
    pub fn builder(cfg: Config) -> RuntimeBuilder {
        RuntimeBuilder::new(cfg)
    }

    /// Configuration the runtime was built with.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Worker supervisor handle.
    pub fn supervisor(&self) -> &WorkerSupervisor {
        &self.supervisor
    }

    /// Cluster manager handle.
    pub fn clusters(&self) -> &ClusterManager {
        &self.clusters
    }

    /// Message bus handle.
    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Message router handle.
    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    /// New receiver on the lifecycle event stream.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Cancelled when shutdown begins.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Waits for a termination signal, then shuts down.
    pub async fn run_until_signal(self) -> Result<(), RuntimeError> {
        if let Err(e) = shutdown::wait_for_shutdown_signal().await {
            warn!(error = %e, "cannot listen for signals, shutting down");
        }
        self.shutdown().await
    }

    /// Cancels every component and waits up to `grace` for them to exit.
    ///
    /// Components still running after `grace` are aborted and reported in
    /// [`RuntimeError::GraceExceeded`].
    pub async fn shutdown(self) -> Result<(), RuntimeError> {
        let grace = self.cfg.grace;
        info!(?grace, "shutdown requested");
        self.events.publish(Event::new(EventKind::ShutdownRequested));
        self.token.cancel();

        let deadline = time::Instant::now() + grace;
        let mut stuck = Vec::new();
        for (name, mut join) in self.joins {
            let left = deadline.saturating_duration_since(time::Instant::now());
            match time::timeout(left, &mut join).await {
                Ok(_) => debug!(component = name, "component stopped"),
                Err(_) => {
                    join.abort();
                    stuck.push(name.to_string());
                }
            }
        }

        let res = if stuck.is_empty() {
            self.events.publish(Event::new(EventKind::AllStoppedWithin));
            Ok(())
        } else {
            warn!(?stuck, "grace exceeded");
            self.events.publish(
                Event::new(EventKind::GraceExceeded).with_reason(stuck.join(",")),
            );
            Err(RuntimeError::GraceExceeded { grace, stuck })
        };

        if let Some((stop, mut join)) = self.listener {
            stop.cancel();
            if time::timeout(grace, &mut join).await.is_err() {
                warn!("observers did not drain in time");
                join.abort();
            }
        }
        res
    }
}

/// Forwards lifecycle events to observers until `stop`, then drains and closes them.
pub(crate) async fn listen(mut rx: broadcast::Receiver<Event>, set: ObserverSet, stop: CancellationToken) {
    loop {
        select! {
            biased;
            ev = rx.recv() => match ev {
                Ok(ev) => set.emit(ev),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "observer listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = stop.cancelled() => {
                while let Ok(ev) = rx.try_recv() {
                    set.emit(ev);
                }
                break;
            }
        }
    }
    set.shutdown().await;
}
