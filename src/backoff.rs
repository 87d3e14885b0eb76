use crate::config::CoordinatorConfig;
use rand::Rng;
use std::time::Duration;

/// Reconnect delay schedule: `min(base * 2^attempt, max)`, optionally jittered
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: f64,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            jitter: 0.0,
        }
    }

    pub fn from_config(config: &CoordinatorConfig) -> Self {
        Self::new(config.reconnect_base_delay, config.reconnect_max_delay)
            .with_jitter(config.reconnect_jitter)
    }

    /// Spread each delay by up to `fraction` of itself in either direction
    pub fn with_jitter(mut self, fraction: f64) -> Self {
        self.jitter = fraction.clamp(0.0, 1.0);
        self
    }

    /// Delay before retry number `attempt` (0-based), without jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Delay before retry number `attempt`, with jitter applied
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let delay = self.base_delay(attempt);
        if self.jitter == 0.0 {
            return delay;
        }
        let spread = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        delay.mul_f64(1.0 + spread).min(self.max)
    }
}
