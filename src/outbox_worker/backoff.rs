use std::time::Duration;

/// Exponential delay between failed drains: `initial * 2^(n-1)`, capped at
/// `max`. Never gives up.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            attempt: 0,
        }
    }

    /// Record a failure and return how long to wait before the next drain.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        let factor = 2u32.saturating_pow(self.attempt - 1);
        self.initial.saturating_mul(factor).min(self.max)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Whether the last drain failed.
    pub fn is_active(&self) -> bool {
        self.attempt > 0
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
