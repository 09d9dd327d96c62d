//! # neurovisor
//!
//! In-process concurrency substrate for simulated neural workloads: supervised
//! stateful workers grouped into clusters, topic publish/subscribe, and a
//! fault-isolating request router. Workers compute whatever their
//! [`Worker`] implementation says; the runtime only keeps them alive,
//! addressable and observable.
//!
//! ## Architecture
//! ```text
//!                  ┌───────────────────────────────────────────────┐
//!   route(c,k,p) ─►│ MessageRouter   (category,key) → Handler      │
//!                  └──────┬────────────────────────────────┬───────┘
//!                         │ handlers capture handles       │
//!                         ▼                                ▼
//!  ┌───────────────────────────────┐        ┌─────────────────────────────┐
//!  │ ClusterManager                │        │ MessageBus                  │
//!  │ prime tokens, seeded wiring,  │──pub──►│ topic → subscribers         │
//!  │ health loop, load report      │        │ bounded history log         │
//!  └──────────────┬────────────────┘        └──────────────┬──────────────┘
//!                 ▼                                        ▼
//!  ┌───────────────────────────────┐              [queue] ──► Inbox
//!  │ WorkerSupervisor              │
//!  │ registry actor, one-for-one   │
//!  └──────┬────────┬────────┬──────┘
//!         ▼        ▼        ▼
//!    WorkerActor WorkerActor ...   (restart loop: RestartPolicy + BackoffPolicy)
//!
//!  every component ── publish(Event) ──► EventBus ──► ObserverSet ──► observers
//! ```
//!
//! Every component is a tokio task that owns its state; the types above are
//! cloneable handles that talk to it over channels. Request/reply calls are
//! bounded by [`Config::call_timeout`].
//!
//! ## Worker lifecycle
//! ```text
//! start(spec) ──► WorkerActor::run()
//! loop {
//!   ├─► factory.build(config), on_start()
//!   ├─► serve mailbox (Message → handle, Query → state)
//!   ├─► failure (Err or panic) ──► WorkerFailed
//!   │     ├─ policy forbids / budget spent ──► WorkerDead, removed
//!   │     └─ BackoffScheduled, sleep, rebuild (same id, same mailbox)
//!   └─► stop / shutdown ──► exit
//! }
//! ```
//!
//! ## Features
//! | Area            | Description                                           | Key types                                   |
//! |-----------------|-------------------------------------------------------|---------------------------------------------|
//! | **Supervision** | Start, stop, count and restart workers                | [`WorkerSupervisor`], [`WorkerSpec`]        |
//! | **Clusters**    | Prime-token clusters, health and load reports         | [`ClusterManager`], [`HealthReport`]        |
//! | **Pub/sub**     | Topics with liveness cleanup and history              | [`MessageBus`], [`Subscriber`], [`Inbox`]   |
//! | **Routing**     | `(category, key)` dispatch with fault containment     | [`MessageRouter`], [`Handler`]              |
//! | **Policies**    | Restart, backoff and jitter                           | [`RestartPolicy`], [`BackoffPolicy`]        |
//! | **Observers**   | Lifecycle events to logs, metrics, anything           | [`Observe`], [`Event`], [`LogWriter`]       |
//!
//! ## Optional features
//! - `logging`: [`logging::init`] installs a `tracing-subscriber` formatter.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use neurovisor::{Config, HandlerFn, LogWriter, Observe, Payload, RouteContext, Runtime};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let observers: Vec<Arc<dyn Observe>> = vec![Arc::new(LogWriter::new())];
//!     let rt = Runtime::builder(Config::default())
//!         .with_observers(observers)
//!         .build();
//!
//!     let clusters = rt.clusters().clone();
//!     rt.router()
//!         .register("cluster", "health", HandlerFn::arc(move |_p: Payload, _ctx: RouteContext| {
//!             let clusters = clusters.clone();
//!             async move { Ok::<_, neurovisor::HandlerError>(serde_json::to_value(clusters.health().await?)?) }
//!         }))
//!         .await?;
//!
//!     rt.clusters().start_cluster(1, 3).await?;
//!     let health = rt.router().route("cluster", "health", Payload::Null, RouteContext::default()).await?;
//!     assert_eq!(health["overall"], 100.0);
//!
//!     rt.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod cluster;
mod core;
mod error;
mod events;
mod observers;
mod policies;
mod pubsub;
mod router;
mod supervisor;
mod workers;

#[cfg(feature = "logging")]
pub mod logging;

/// Opaque structured value carried by messages, worker params and route payloads.
pub type Payload = serde_json::Value;

// ---- Public re-exports ----

pub use cluster::{
    BALANCE_TOPIC, ClusterHealth, ClusterInfo, ClusterLoad, ClusterManager, HEALTH_TOPIC,
    HealthReport, LoadReport, primes, worker_name,
};
pub use crate::core::{Config, Runtime, RuntimeBuilder, wait_for_shutdown_signal};
pub use error::{HandlerError, RuntimeError, WorkerError};
pub use events::{Event, EventBus, EventKind};
pub use observers::{LogWriter, Observe, ObserverSet};
pub use policies::{BackoffPolicy, JitterPolicy, RestartPolicy};
pub use pubsub::{Delivery, Inbox, LogEntry, MessageBus, Subscriber};
pub use router::{BoxHandlerFuture, Handler, HandlerFn, MessageRouter, RouteContext, RouterStats};
pub use supervisor::{WorkerCount, WorkerSupervisor};
pub use workers::{
    Neuron, Worker, WorkerConfig, WorkerContext, WorkerFactory, WorkerFn, WorkerHandle,
    WorkerSpec, WorkerStatus,
};
