//! Router actor and its handle.

use std::collections::HashMap;
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::Payload;
use crate::core::{Config, mailbox};
use crate::error::{HandlerError, RuntimeError, panic_message};
use crate::events::{Event, EventBus, EventKind};

use super::handler::{Handler, RouteContext};

const COMPONENT: &str = "message_router";

/// Router counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RouterStats {
    /// Handler calls that returned `Ok`.
    pub routed: u64,
    /// Handler calls that failed, panicked or timed out.
    pub errors: u64,
    /// Requests with no registered handler.
    pub unmatched: u64,
    /// Registered routes.
    pub handlers: usize,
}

type RouteKey = (String, String);

enum Outcome {
    Routed,
    Failed,
}

enum Command {
    Register {
        route: RouteKey,
        handler: Arc<dyn Handler>,
        reply: oneshot::Sender<bool>,
    },
    Unregister {
        route: RouteKey,
        reply: oneshot::Sender<bool>,
    },
    Lookup {
        route: RouteKey,
        reply: oneshot::Sender<Option<Arc<dyn Handler>>>,
    },
    Record(Outcome),
    Stats {
        reply: oneshot::Sender<RouterStats>,
    },
}

/// Address of the router actor.
#[derive(Clone)]
pub struct MessageRouter {
    tx: mpsc::UnboundedSender<Command>,
    cfg: Arc<Config>,
    events: EventBus,
}

impl MessageRouter {
    /// Spawns the router actor; it exits when `token` is cancelled.
    pub fn spawn(cfg: Arc<Config>, events: EventBus, token: CancellationToken) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let join = tokio::spawn(run(rx, token));
        (Self { tx, cfg, events }, join)
    }

    /// Binds `handler` to `(category, key)`. Returns true if it replaced a binding.
    pub async fn register(
        &self,
        category: &str,
        key: &str,
        handler: Arc<dyn Handler>,
    ) -> Result<bool, RuntimeError> {
        let route = (category.to_string(), key.to_string());
        mailbox::call_unbounded(&self.tx, COMPONENT, "register", self.cfg.call_timeout, |reply| {
            Command::Register { route, handler, reply }
        })
        .await
    }

    /// Removes a binding. Returns true if one existed.
    pub async fn unregister(&self, category: &str, key: &str) -> Result<bool, RuntimeError> {
        let route = (category.to_string(), key.to_string());
        mailbox::call_unbounded(&self.tx, COMPONENT, "unregister", self.cfg.call_timeout, |reply| {
            Command::Unregister { route, reply }
        })
        .await
    }

    /// Dispatches one request.
    ///
    /// # Errors
    /// - `NoHandler`: nothing bound to `(category, key)`
    /// - `HandlerFailed`: the handler returned an error
    /// - `InternalFault`: the handler panicked
    /// - `Timeout`: the handler ran longer than `route_timeout`
    pub async fn route(
        &self,
        category: &str,
        key: &str,
        payload: Payload,
        ctx: RouteContext,
    ) -> Result<Payload, RuntimeError> {
        let route = (category.to_string(), key.to_string());
        let found = mailbox::call_unbounded(&self.tx, COMPONENT, "route", self.cfg.call_timeout, |reply| {
            Command::Lookup { route, reply }
        })
        .await?;

        let Some(handler) = found else {
            return Err(RuntimeError::NoHandler {
                category: category.to_string(),
                key: key.to_string(),
            });
        };

        let call = async move { handler.call(payload, ctx).await };
        let res = match time::timeout(self.cfg.route_timeout, std::panic::AssertUnwindSafe(call).catch_unwind()).await {
            Ok(Ok(Ok(v))) => Ok(v),
            Ok(Ok(Err(e))) => Err(failed(category, key, e)),
            Ok(Err(panic)) => Err(RuntimeError::InternalFault {
                category: category.to_string(),
                key: key.to_string(),
                reason: panic_message(panic.as_ref()),
            }),
            Err(_) => Err(RuntimeError::Timeout {
                op: "route",
                timeout: self.cfg.route_timeout,
            }),
        };

        let outcome = match &res {
            Ok(_) => Outcome::Routed,
            Err(e) => {
                warn!(category, key, error = %e, "route failed");
                self.events.publish(
                    Event::new(EventKind::RouteFailed)
                        .with_topic(format!("{category}/{key}"))
                        .with_reason(e.to_string()),
                );
                Outcome::Failed
            }
        };
        let _ = self.tx.send(Command::Record(outcome));
        res
    }

    /// Counters so far, including every route that has already returned.
    pub async fn stats(&self) -> Result<RouterStats, RuntimeError> {
        mailbox::call_unbounded(&self.tx, COMPONENT, "stats", self.cfg.call_timeout, |reply| {
            Command::Stats { reply }
        })
        .await
    }
}

fn failed(category: &str, key: &str, e: HandlerError) -> RuntimeError {
    RuntimeError::HandlerFailed {
        category: category.to_string(),
        key: key.to_string(),
        reason: e.to_string(),
    }
}

async fn run(mut rx: mpsc::UnboundedReceiver<Command>, token: CancellationToken) {
    let mut table: HashMap<RouteKey, Arc<dyn Handler>> = HashMap::new();
    let mut stats = RouterStats::default();

    loop {
        let cmd = select! {
            biased;
            _ = token.cancelled() => break,
            cmd = rx.recv() => match cmd {
                Some(cmd) => cmd,
                None => break,
            },
        };

        match cmd {
            Command::Register { route, handler, reply } => {
                let replaced = table.insert(route.clone(), handler).is_some();
                debug!(category = %route.0, key = %route.1, replaced, "handler registered");
                let _ = reply.send(replaced);
            }
            Command::Unregister { route, reply } => {
                let _ = reply.send(table.remove(&route).is_some());
            }
            Command::Lookup { route, reply } => {
                let found = table.get(&route).cloned();
                if found.is_none() {
                    stats.unmatched += 1;
                }
                let _ = reply.send(found);
            }
            Command::Record(Outcome::Routed) => stats.routed += 1,
            Command::Record(Outcome::Failed) => stats.errors += 1,
            Command::Stats { reply } => {
                let _ = reply.send(RouterStats {
                    handlers: table.len(),
                    ..stats
                });
            }
        }
    }
    debug!("message router exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::HandlerFn;
    use serde_json::json;
    use std::time::Duration;

    fn router(cfg: Config) -> MessageRouter {
        MessageRouter::spawn(Arc::new(cfg), EventBus::new(64), CancellationToken::new()).0
    }

    #[tokio::test]
    async fn register_reports_replacement() {
        let r = router(Config::default());
        let h = HandlerFn::arc(|p: Payload, _ctx: RouteContext| async move { Ok(p) });
        assert!(!r.register("neuron", "echo", h.clone()).await.expect("register"));
        assert!(r.register("neuron", "echo", h).await.expect("register"));
        assert!(r.unregister("neuron", "echo").await.expect("unregister"));
        assert_eq!(r.stats().await.expect("stats").handlers, 0);
    }

    #[tokio::test]
    async fn handler_error_is_counted_once() {
        let r = router(Config::default());
        let h = HandlerFn::arc(|_p: Payload, _ctx: RouteContext| async move {
            Err::<Payload, _>(HandlerError::BadRequest("nope".into()))
        });
        r.register("a", "b", h).await.expect("register");

        let err = r.route("a", "b", json!({}), RouteContext::default()).await.unwrap_err();
        assert_eq!(err.as_label(), "handler_failed");
        let stats = r.stats().await.expect("stats");
        assert_eq!((stats.routed, stats.errors, stats.unmatched), (0, 1, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_times_out() {
        let cfg = Config {
            route_timeout: Duration::from_millis(50),
            ..Config::default()
        };
        let r = router(cfg);
        let h = HandlerFn::arc(|_p: Payload, _ctx: RouteContext| async move {
            time::sleep(Duration::from_secs(60)).await;
            Ok(Payload::Null)
        });
        r.register("slow", "op", h).await.expect("register");

        let err = r.route("slow", "op", Payload::Null, RouteContext::default()).await.unwrap_err();
        assert_eq!(err.as_label(), "timeout");
        assert_eq!(r.stats().await.expect("stats").errors, 1);
    }
}
