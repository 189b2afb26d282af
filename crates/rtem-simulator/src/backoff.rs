use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Exponent cap; beyond this the delay has long since hit `max`.
const MAX_DOUBLINGS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub min: Duration,
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(1),
            max: Duration::from_secs(60),
        }
    }
}

/// Exponential reconnect backoff with additive jitter.
///
/// The base delay doubles per consecutive failure; jitter adds at most a
/// quarter of the base on top, and the total is clamped to `max`. Doubling
/// dominates the jitter, so consecutive delays never decrease until the cap
/// is reached, after which they stay at `max`.
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
    rng: StdRng,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self::with_seed(config, rand::random())
    }

    pub fn with_seed(config: BackoffConfig, seed: u64) -> Self {
        Self {
            config,
            attempt: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Delay to wait before the next connection attempt. Advances the
    /// attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let doublings = self.attempt.min(MAX_DOUBLINGS);
        let base = self
            .config
            .min
            .saturating_mul(1u32 << doublings)
            .min(self.config.max);

        let jitter_ms = self.rng.gen_range(0..=base.as_millis() as u64 / 4);
        let delay = (base + Duration::from_millis(jitter_ms)).min(self.config.max);

        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Consecutive failed attempts since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Called after a successful publish; the next failure starts over at
    /// the minimum delay.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
