//! # MessageRouter: `(category, key)` dispatch with fault containment.
//!
//! ```text
//! route(category, key, payload, ctx)
//!   ├─► Lookup ──► router actor ──► None ─► NoHandler (unmatched += 1)
//!   │                              └─► Some(handler)
//!   ├─► handler.call(payload, ctx)   in the caller's task,
//!   │     bounded by route_timeout, panics caught
//!   └─► Record(outcome) ──► router actor ──► routed / errors += 1
//! ```
//!
//! The actor only owns the table and counters; handlers never run inside it,
//! so a slow or panicking handler cannot stall other routes.

mod dispatch;
mod handler;

pub use dispatch::{MessageRouter, RouterStats};
pub use handler::{BoxHandlerFuture, Handler, HandlerFn, RouteContext};
