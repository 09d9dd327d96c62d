//! # Restart backoff.
//!
//! The delay before restart number `n` (0-indexed) is `first × factorⁿ`,
//! clamped to `max`, then jittered. The base is derived from `n` alone, so
//! jitter never compounds across restarts.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use neurovisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(50),
//!     max: Duration::from_secs(1),
//!     factor: 3.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_millis(50));
//! assert_eq!(backoff.next(2), Duration::from_millis(450));
//! assert_eq!(backoff.next(9), Duration::from_secs(1));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Delay schedule between consecutive restarts of one worker.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Delay before the first restart.
    pub first: Duration,
    /// Upper bound on any delay.
    pub max: Duration,
    /// Multiplicative growth per restart (`>= 1.0` recommended).
    pub factor: f64,
    /// Randomization applied to the computed delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// `first = 100ms`, `factor = 2.0`, `max = 10s`, no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_secs(10),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// A constant delay with no growth and no jitter.
    pub fn constant(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Computes the delay before restart number `restart` (0-indexed).
    pub fn next(&self, restart: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = restart.min(i32::MAX as u32) as i32;
        let raw = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !raw.is_finite() || raw < 0.0 || raw > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(raw)
        };

        match self.jitter {
            JitterPolicy::Decorrelated => {
                self.jitter
                    .apply_decorrelated(self.first.min(self.max), base, self.max)
            }
            _ => self.jitter.apply(base),
        }
    }
}
