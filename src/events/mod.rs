//! Lifecycle events: data model and broadcast bus.
//!
//! Every component reports what happens to it as an [`Event`] on the shared
//! [`EventBus`]. The runtime fans events out to observers (see
//! [`observers`](crate::observers)); tests and callers can also subscribe
//! directly with [`Runtime::events`](crate::Runtime::events).
//!
//! This stream is for observability only. Application messages travel over
//! the topic-based [`MessageBus`](crate::MessageBus).

mod bus;
mod event;

pub use bus::EventBus;
pub use event::{Event, EventKind};
