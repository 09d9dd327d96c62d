//! Lifecycle observers.
//!
//! An observer receives every [`Event`](crate::Event) published on the runtime's
//! [`EventBus`](crate::EventBus), through its own bounded queue and worker task:
//!
//! ```text
//! EventBus ──► Runtime listener ──► ObserverSet::emit(&Event)
//!                                     ├──► [queue] ──► LogWriter::on_event
//!                                     └──► [queue] ──► custom observer
//! ```
//!
//! A slow or panicking observer only affects itself.

mod log;
mod observer;
mod set;

pub use log::LogWriter;
pub use observer::Observe;
pub use set::ObserverSet;
