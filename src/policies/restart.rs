//! # Restart policy for supervised workers.
//!
//! Restart scope is always one-for-one: only the failing worker is rebuilt,
//! siblings and the supervisor keep running.
//!
//! ```text
//! RestartPolicy::Never      → any failure removes the worker
//! RestartPolicy::OnFailure  → retryable failures (Fail, Timeout, panic) rebuild it; Fatal removes it
//! RestartPolicy::Always     → every failure rebuilds it, Fatal included
//! ```

use crate::error::WorkerError;

/// Policy controlling whether a failed worker is rebuilt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Never restart: the first failure is terminal.
    Never,
    /// Restart on retryable failures (default).
    #[default]
    OnFailure,
    /// Restart on every failure.
    Always,
}

impl RestartPolicy {
    /// Returns true if a worker that failed with `err` should be rebuilt.
    pub fn allows(&self, err: &WorkerError) -> bool {
        match self {
            RestartPolicy::Never => false,
            RestartPolicy::OnFailure => err.is_retryable(),
            RestartPolicy::Always => !matches!(err, WorkerError::Canceled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_failure_skips_fatal() {
        let p = RestartPolicy::OnFailure;
        assert!(p.allows(&WorkerError::fail("x")));
        assert!(!p.allows(&WorkerError::fatal("x")));
    }

    #[test]
    fn always_restarts_fatal_but_not_cancel() {
        let p = RestartPolicy::Always;
        assert!(p.allows(&WorkerError::fatal("x")));
        assert!(!p.allows(&WorkerError::Canceled));
        assert!(!RestartPolicy::Never.allows(&WorkerError::fail("x")));
    }
}
