use std::time::Duration;

/// Bounded exponential reconnect schedule.
///
/// Retry `i` (0-based) waits `min(initial * multiplier^i, max_delay)`; at most
/// `max_attempts` retries are made before the manager gives up.
#[derive(Clone, Debug, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let nanos = self.initial.as_nanos() as f64 * factor;
        if !nanos.is_finite() || nanos >= self.max_delay.as_nanos() as f64 {
            return self.max_delay;
        }
        Duration::from_nanos(nanos.round() as u64)
    }

    /// Whether retry number `attempt` (0-based) may still be made.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Every delay the policy will ever produce, in order.
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.max_attempts).map(|i| self.delay_for(i)).collect()
    }
}
