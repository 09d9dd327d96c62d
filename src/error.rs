//! Error types used by the neurovisor runtime, workers and route handlers.
//!
//! - [`RuntimeError`] is returned by every synchronous component operation
//!   (supervisor, cluster manager, bus, router).
//! - [`WorkerError`] is returned by worker callbacks and drives the restart policy.
//! - [`HandlerError`] is returned by route handlers.
//!
//! All of them expose `as_label()` with a stable snake_case label for logs/metrics.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the runtime components.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// A worker with this id is already registered.
    #[error("worker '{id}' already exists")]
    DuplicateId {
        /// Conflicting worker id.
        id: String,
    },

    /// The worker is unknown or has already been stopped.
    #[error("worker '{id}' not found")]
    NotFound {
        /// Requested worker id.
        id: String,
    },

    /// Starting another worker would exceed `Config::max_workers`.
    #[error("worker limit {limit} reached")]
    ResourceExhausted {
        /// Configured maximum.
        limit: usize,
    },

    /// No handler is registered for `(category, key)`.
    #[error("no handler for {category}/{key}")]
    NoHandler {
        /// Route category.
        category: String,
        /// Route key within the category.
        key: String,
    },

    /// A blocking call did not complete within its bound.
    #[error("{op} timed out after {timeout:?}")]
    Timeout {
        /// Operation that timed out.
        op: &'static str,
        /// The bound that was exceeded.
        timeout: Duration,
    },

    /// A route handler panicked; the panic was contained at the router boundary.
    #[error("internal fault in {category}/{key}: {reason}")]
    InternalFault {
        /// Route category.
        category: String,
        /// Route key.
        key: String,
        /// Panic message.
        reason: String,
    },

    /// A route handler returned an error.
    #[error("handler {category}/{key} failed: {reason}")]
    HandlerFailed {
        /// Route category.
        category: String,
        /// Route key.
        key: String,
        /// Handler error message.
        reason: String,
    },

    /// A worker answered a request with an error.
    #[error("worker '{id}': {error}")]
    Worker {
        /// Worker id.
        id: String,
        /// Error reported by the worker.
        error: WorkerError,
    },

    /// Cluster id outside `1..=max_clusters`.
    #[error("cluster id {cluster_id} outside 1..={max}")]
    InvalidCluster {
        /// Requested cluster id.
        cluster_id: u32,
        /// Configured `max_clusters`.
        max: u32,
    },

    /// The cluster already has members.
    #[error("cluster {cluster_id} is already started")]
    ClusterActive {
        /// Requested cluster id.
        cluster_id: u32,
    },

    /// The component has shut down and no longer accepts requests.
    #[error("{component} is closed")]
    Closed {
        /// Component name.
        component: &'static str,
    },

    /// Shutdown grace period was exceeded; some components had to be aborted.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Components that did not stop in time.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use neurovisor::RuntimeError;
    ///
    /// let err = RuntimeError::NotFound { id: "n-2".into() };
    /// assert_eq!(err.as_label(), "not_found");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::DuplicateId { .. } => "duplicate_id",
            RuntimeError::NotFound { .. } => "not_found",
            RuntimeError::ResourceExhausted { .. } => "resource_exhausted",
            RuntimeError::NoHandler { .. } => "no_handler",
            RuntimeError::Timeout { .. } => "timeout",
            RuntimeError::InternalFault { .. } => "internal_fault",
            RuntimeError::HandlerFailed { .. } => "handler_failed",
            RuntimeError::Worker { .. } => "worker_error",
            RuntimeError::InvalidCluster { .. } => "invalid_cluster",
            RuntimeError::ClusterActive { .. } => "cluster_active",
            RuntimeError::Closed { .. } => "closed",
            RuntimeError::GraceExceeded { .. } => "grace_exceeded",
        }
    }
}

/// # Errors produced by worker callbacks.
///
/// `Fail` and `Timeout` are retryable under [`RestartPolicy::OnFailure`](crate::RestartPolicy);
/// `Fatal` only restarts under `RestartPolicy::Always`.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// Worker exceeded a time bound.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The exceeded bound.
        timeout: Duration,
    },

    /// Non-recoverable error.
    #[error("fatal error (no retry): {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// Failure that may clear after a restart.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Worker observed cancellation.
    #[error("context cancelled")]
    Canceled,
}

impl WorkerError {
    /// Convenience constructor for [`WorkerError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        WorkerError::Fail {
            error: error.into(),
        }
    }

    /// Convenience constructor for [`WorkerError::Fatal`].
    pub fn fatal(error: impl Into<String>) -> Self {
        WorkerError::Fatal {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerError::Timeout { .. } => "worker_timeout",
            WorkerError::Fatal { .. } => "worker_fatal",
            WorkerError::Fail { .. } => "worker_failed",
            WorkerError::Canceled => "worker_canceled",
        }
    }

    /// Indicates whether the error is safe to retry.
    ///
    /// # Example
    /// ```
    /// use neurovisor::WorkerError;
    ///
    /// assert!(WorkerError::fail("boom").is_retryable());
    /// assert!(!WorkerError::fatal("nope").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkerError::Fail { .. } | WorkerError::Timeout { .. })
    }
}

/// # Errors returned by route handlers.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The payload was not acceptable for this handler.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The handler could not complete the request.
    #[error("{0}")]
    Failed(String),
}

impl From<RuntimeError> for HandlerError {
    fn from(e: RuntimeError) -> Self {
        HandlerError::Failed(e.to_string())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        HandlerError::BadRequest(e.to_string())
    }
}

/// Extracts a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
