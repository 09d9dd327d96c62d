//! # Request/reply over actor command channels.
//!
//! Every component is a task owning its state and reading commands from a
//! channel. A synchronous operation sends a command carrying a `oneshot`
//! reply sender and waits for the answer, bounded by a timeout:
//!
//! ```text
//! handle.call(op) ──► [command channel] ──► actor loop ──► reply.send(result)
//!       ▲                                                        │
//!       └──────────────── timeout(bound) ◄───────────────────────┘
//! ```
//!
//! A closed channel or a dropped reply maps to `RuntimeError::Closed`,
//! an elapsed bound to `RuntimeError::Timeout`.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time;

use crate::error::RuntimeError;

/// Sends a command built by `make` and awaits its reply within `bound`.
///
/// The bound covers both enqueueing (a saturated actor fails fast) and the reply.
pub(crate) async fn call<C, T>(
    tx: &mpsc::Sender<C>,
    component: &'static str,
    op: &'static str,
    bound: Duration,
    make: impl FnOnce(oneshot::Sender<T>) -> C,
) -> Result<T, RuntimeError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    let exchange = async {
        tx.send(make(reply_tx))
            .await
            .map_err(|_| RuntimeError::Closed { component })?;
        reply_rx.await.map_err(|_| RuntimeError::Closed { component })
    };
    time::timeout(bound, exchange)
        .await
        .unwrap_or(Err(RuntimeError::Timeout { op, timeout: bound }))
}

/// Same as [`call`] for actors fed by an unbounded channel.
pub(crate) async fn call_unbounded<C, T>(
    tx: &mpsc::UnboundedSender<C>,
    component: &'static str,
    op: &'static str,
    bound: Duration,
    make: impl FnOnce(oneshot::Sender<T>) -> C,
) -> Result<T, RuntimeError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    tx.send(make(reply_tx))
        .map_err(|_| RuntimeError::Closed { component })?;
    match time::timeout(bound, reply_rx).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(_)) => Err(RuntimeError::Closed { component }),
        Err(_) => Err(RuntimeError::Timeout { op, timeout: bound }),
    }
}
