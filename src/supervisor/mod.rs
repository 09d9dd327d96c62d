//! # WorkerSupervisor: dynamic, one-for-one supervision of workers.
//!
//! ```text
//! WorkerSupervisor (handle, cloneable)
//!     │ start / stop / count / list / get / restart_all
//!     ▼
//! [command channel] ──► Registry actor ──► HashMap<id, Entry>
//!                            │   ├─ spawn WorkerActor (child token, mailbox, status watch)
//!                            │   └─ cancel + join within grace
//!                            ▲
//!        [exit channel] ◄────┘  WorkerActor reports death ─► entry removed
//! ```
//!
//! ## Rules
//! - The registry is owned by one task and changed only through commands.
//! - Every call is bounded (`Config::call_timeout`, plus `grace` for stop calls).
//! - Stopping an unknown or already-stopped worker is `NotFound`.
//! - `restart_all` stops everything; callers start workers again themselves.

mod handle;
mod registry;

pub use handle::{WorkerCount, WorkerSupervisor};
