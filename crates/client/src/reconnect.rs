//! Reconnect policy: capped exponential backoff with deterministic jitter.

use std::time::Duration;

/// Governs how the client schedules reconnect attempts after a dropped
/// connection.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub first_delay: Duration,
    /// Upper bound on any single delay, before jitter.
    pub max_delay: Duration,
    /// Multiplier applied per consecutive failure.
    pub growth: f64,
    /// Consecutive failures tolerated before giving up. `0` retries
    /// forever.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            first_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            growth: 2.0,
            max_attempts: 0,
        }
    }
}

impl RetryPolicy {
    /// Delay before reconnect attempt `attempt` (0-indexed).
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.first_delay.as_millis() as f64 * self.growth.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);
        // Up to 25% additive jitter to spread reconnect storms.
        let jitter = capped * 0.25 * jitter_fraction(attempt);
        Duration::from_millis((capped + jitter) as u64)
    }

    /// Whether `attempt` consecutive failures exhaust the policy.
    pub fn give_up(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }
}

/// Deterministic fraction in [0, 1) derived from the attempt number.
/// Not random, just enough spread to avoid synchronized retries.
fn jitter_fraction(attempt: u32) -> f64 {
    let hash = attempt.wrapping_add(1).wrapping_mul(0x9E37_79B9);
    f64::from(hash) / f64::from(u32::MAX)
}
