//! # Observer trait.
//!
//! [`Observe`] is the extension point for plugging metrics, alerting or audit
//! sinks into the runtime.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use neurovisor::{Event, EventKind, Observe};
//!
//! struct Crashes;
//!
//! #[async_trait]
//! impl Observe for Crashes {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::WorkerDead {
//!             // page someone
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "crashes" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Receives runtime events on a dedicated worker task.
///
/// - Events arrive in publish order (FIFO per observer).
/// - Panics are caught and reported as `ObserverPanicked`.
/// - When the queue is full the event is dropped for this observer only.
#[async_trait]
pub trait Observe: Send + Sync + 'static {
    /// Handles one event.
    async fn on_event(&self, event: &Event);

    /// Name used in overflow/panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Queue capacity for this observer (clamped to at least 1).
    fn queue_capacity(&self) -> usize {
        1024
    }
}
