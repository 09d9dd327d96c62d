//! Restart policies for supervised workers.
//!
//! - [`RestartPolicy`] decides **whether** a failed worker is rebuilt;
//! - [`BackoffPolicy`] decides **how long** the supervisor waits before rebuilding it;
//! - [`JitterPolicy`] spreads restarts of many workers that failed together.
//!
//! ## Wiring
//! ```text
//! WorkerSpec { restart, backoff } ──► workers::actor::WorkerActor
//!     on failure:  restart.allows(&err)?  ──► backoff.next(restarts) ──► sleep ──► rebuild
//! ```
//!
//! Defaults: `RestartPolicy::OnFailure`, exponential backoff 100ms × 2ⁿ capped at 10s, no jitter.

mod backoff;
mod jitter;
mod restart;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use restart::RestartPolicy;
