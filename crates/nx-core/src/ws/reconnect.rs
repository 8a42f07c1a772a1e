//! Reconnection policy.
//!
//! Exponential backoff with jitter. The stream itself never reconnects; an
//! owner (the runner) asks this policy how long to wait after each lost
//! session and calls `reconnect()` from its own task, so no sleep ever runs
//! on the decode path.

use std::time::Duration;

use rand::Rng;

/// Close reason the feed sends for a rejected auth token. Retrying with the
/// same token cannot succeed.
pub const UNAUTHORIZED_REASON: &str = "Unauthorized Access";

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth factor per attempt (2.0 doubles).
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
    /// Maximum attempts before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 0,
        }
    }
}

/// Backoff state for one owner.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        let initial_delay = config.initial_delay;
        Self {
            config,
            current_delay: initial_delay,
            attempt_count: 0,
        }
    }

    /// Delay before the next attempt, or `None` once `max_attempts` is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }
        self.attempt_count += 1;

        let delay = self.apply_jitter(self.current_delay);

        let scaled = self.current_delay.as_secs_f64() * self.config.multiplier;
        let next = if scaled.is_finite() && scaled > 0.0 {
            // Clamp before converting: the multiplier comes from user config.
            Duration::try_from_secs_f64(scaled.min(self.config.max_delay.as_secs_f64()))
                .unwrap_or(self.config.max_delay)
        } else {
            self.config.initial_delay
        };
        self.current_delay = next.min(self.config.max_delay);

        Some(delay)
    }

    /// Reset after a successful connection.
    pub fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.attempt_count = 0;
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    /// Whether a close with this reason is worth retrying at all.
    pub fn is_retryable(reason: Option<&str>) -> bool {
        reason != Some(UNAUTHORIZED_REASON)
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        let factor = self.config.jitter_factor;
        if !factor.is_finite() || factor <= 0.0 {
            return duration;
        }
        let base = duration.as_secs_f64();
        let range = base * factor.min(1.0);
        let jitter: f64 = rand::rng().random_range(-range..=range);
        Duration::try_from_secs_f64((base + jitter).max(0.001)).unwrap_or(duration)
    }
}
