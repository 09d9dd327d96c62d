//! # Jitter for restart delays.
//!
//! When a whole cluster fails at once, identical backoff would rebuild every
//! worker in the same instant. Jitter spreads those restarts.
//!
//! - [`JitterPolicy::None`]: exact delay
//! - [`JitterPolicy::Full`]: uniform in `[0, delay]`
//! - [`JitterPolicy::Equal`]: `delay/2 + uniform[0, delay/2]`
//! - [`JitterPolicy::Decorrelated`]: uniform in `[base, min(prev × 3, max)]`

use rand::Rng;
use std::time::Duration;

/// Randomization strategy for restart delays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// No randomization.
    #[default]
    None,
    /// Uniform in `[0, delay]`.
    Full,
    /// Half fixed, half random.
    Equal,
    /// Random in `[base, prev × 3]`, capped at `max`.
    /// Needs context, see [`apply_decorrelated`](Self::apply_decorrelated).
    Decorrelated,
}

impl JitterPolicy {
    /// Applies jitter to `delay`. `Decorrelated` returns `delay` unchanged.
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            JitterPolicy::None | JitterPolicy::Decorrelated => delay,
            JitterPolicy::Full => full(delay),
            JitterPolicy::Equal => equal(delay),
        }
    }

    /// Decorrelated jitter with explicit floor, previous delay and cap.
    ///
    /// Falls back to [`apply`](Self::apply) for other variants.
    pub fn apply_decorrelated(&self, base: Duration, prev: Duration, max: Duration) -> Duration {
        if !matches!(self, JitterPolicy::Decorrelated) {
            return self.apply(prev);
        }

        let base_ms = base.as_millis() as u64;
        let upper = (prev.as_millis() as u64)
            .saturating_mul(3)
            .min(max.as_millis() as u64)
            .max(base_ms);

        if base_ms >= upper {
            return base;
        }
        Duration::from_millis(rand::rng().random_range(base_ms..=upper))
    }
}

fn full(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=ms))
}

fn equal(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    let half = ms / 2;
    if half == 0 {
        return Duration::from_millis(ms);
    }
    Duration::from_millis(half + rand::rng().random_range(0..=half))
}
