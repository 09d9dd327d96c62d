//! Runtime core: configuration, the request/reply helper shared by every
//! actor, signal handling and the [`Runtime`] that wires components together.
//!
//! - [`config`]: [`Config`] with defaults and sentinel helpers;
//! - [`mailbox`]: bounded request/reply over actor command channels;
//! - [`shutdown`]: cross-platform termination signals;
//! - [`builder`] / [`runtime`]: construction and graceful shutdown.

mod builder;
mod config;
pub(crate) mod mailbox;
mod runtime;
mod shutdown;

pub use builder::RuntimeBuilder;
pub use config::Config;
pub use runtime::Runtime;
pub use shutdown::wait_for_shutdown_signal;
