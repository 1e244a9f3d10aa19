use chrono::{DateTime, Utc};

/// Wall-clock source for freshness timestamps.
///
/// Timers run on `tokio::time`; this only stamps `last_update`.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
