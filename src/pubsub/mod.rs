//! # MessageBus: topic publish/subscribe with liveness cleanup.
//!
//! ```text
//! publish / broadcast ──► [unbounded command channel] ──► Bus actor
//!                                                           │  topics: topic → {id → Subscriber}
//!                                                           │  log:    last `log_capacity` entries
//!                                                           ▼
//!                                          try_send ──► [bounded queue] ──► Inbox
//!
//! monitor task per subscriber: Subscriber::closed() ──► Down(id) ──► removed from every topic
//! ```
//!
//! ## Rules
//! - Publishing never blocks; a full subscriber queue drops that delivery only.
//! - Delivery is at most once, FIFO per (topic, subscriber).
//! - Dropping an [`Inbox`] terminates its subscriber; the bus forgets it.

mod bus;
mod log;
mod subscriber;

pub use bus::MessageBus;
pub use log::LogEntry;
pub use subscriber::{Delivery, Inbox, Subscriber};
