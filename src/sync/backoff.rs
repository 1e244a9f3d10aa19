//! Reconnection backoff policy.

use std::time::Duration;

use rand::Rng;

pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Exponential backoff with a cap and additive jitter.
///
/// `delay(n) = min(base * 2^n, max)`; the scheduled delay adds a uniformly
/// random jitter in `[0, base)` so many clients failing together do not
/// reconnect in lockstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// Deterministic part of the delay for reconnect attempt `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
    }

    /// `delay(attempt)` plus `jitter`, with `jitter` clamped below `base_delay`.
    pub fn delay_with_jitter(&self, attempt: u32, jitter: Duration) -> Duration {
        let ceiling = self.base_delay.saturating_sub(Duration::from_millis(1));
        self.delay(attempt) + jitter.min(ceiling)
    }

    /// Delay to schedule for attempt `attempt`, with freshly sampled jitter.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let jitter_ms = if base_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..base_ms)
        };
        self.delay_with_jitter(attempt, Duration::from_millis(jitter_ms))
    }
}
