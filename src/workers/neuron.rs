//! # Neuron: default cluster worker.
//!
//! A leaky integrator: every stimulus adds to the activation, which decays by
//! `decay` before each update; crossing `threshold` counts as a firing and
//! resets the activation. Parameters come from `WorkerConfig::params`:
//!
//! ```json
//! { "threshold": 1.0, "decay": 0.9 }
//! ```
//!
//! Accepted messages: a bare number, or `{ "stimulus": <number> }`.
//! Anything else is a worker failure.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::Payload;
use crate::error::WorkerError;
use crate::workers::spec::WorkerConfig;
use crate::workers::worker::{Worker, WorkerContext, WorkerFactory, WorkerFn};

const DEFAULT_THRESHOLD: f64 = 1.0;
const DEFAULT_DECAY: f64 = 0.9;

/// Leaky integrate-and-fire worker.
#[derive(Debug, Clone)]
pub struct Neuron {
    threshold: f64,
    decay: f64,
    activation: f64,
    fired: u64,
    received: u64,
}

impl Neuron {
    /// Reads `threshold` and `decay` from `config.params`, falling back to defaults.
    pub fn new(config: &WorkerConfig) -> Self {
        let param = |name: &str, default: f64| {
            config
                .params
                .get(name)
                .and_then(Payload::as_f64)
                .unwrap_or(default)
        };
        Self {
            threshold: param("threshold", DEFAULT_THRESHOLD),
            decay: param("decay", DEFAULT_DECAY).clamp(0.0, 1.0),
            activation: 0.0,
            fired: 0,
            received: 0,
        }
    }

    /// Factory building a fresh neuron per (re)start.
    pub fn factory() -> Arc<dyn WorkerFactory> {
        WorkerFn::arc(|cfg: &WorkerConfig| Neuron::new(cfg))
    }

    fn stimulus(msg: &Payload) -> Option<f64> {
        msg.as_f64()
            .or_else(|| msg.get("stimulus").and_then(Payload::as_f64))
    }
}

#[async_trait]
impl Worker for Neuron {
    async fn handle(&mut self, msg: Payload, _ctx: &WorkerContext) -> Result<(), WorkerError> {
        let input = Self::stimulus(&msg)
            .ok_or_else(|| WorkerError::fail(format!("unsupported message: {msg}")))?;

        self.received += 1;
        self.activation = self.activation * self.decay + input;
        if self.activation >= self.threshold {
            self.fired += 1;
            self.activation = 0.0;
        }
        Ok(())
    }

    async fn state(&self, ctx: &WorkerContext) -> Result<Payload, WorkerError> {
        Ok(json!({
            "id": &*ctx.id,
            "cluster": ctx.cluster_id,
            "attempt": ctx.attempt,
            "activation": self.activation,
            "fired": self.fired,
            "received": self.received,
            "connections": ctx.connections.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tokio_util::sync::CancellationToken;

    fn ctx() -> WorkerContext {
        WorkerContext {
            id: Arc::from("n"),
            cluster_id: Some(1),
            connections: Arc::new(BTreeSet::new()),
            params: Arc::new(Payload::Null),
            attempt: 1,
            token: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn fires_when_threshold_crossed() {
        let cfg = WorkerConfig::new("n").with_params(json!({ "threshold": 1.0, "decay": 1.0 }));
        let mut n = Neuron::new(&cfg);
        let ctx = ctx();

        n.handle(json!(0.6), &ctx).await.expect("stimulus");
        n.handle(json!({ "stimulus": 0.6 }), &ctx).await.expect("stimulus");

        let state = n.state(&ctx).await.expect("state");
        assert_eq!(state["fired"], 1);
        assert_eq!(state["received"], 2);
        assert_eq!(state["activation"], 0.0);
    }

    #[tokio::test]
    async fn rejects_non_numeric_messages() {
        let mut n = Neuron::new(&WorkerConfig::new("n"));
        let err = n.handle(json!("hello"), &ctx()).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
