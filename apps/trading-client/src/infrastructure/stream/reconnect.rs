//! Reconnection Policy
//!
//! Exponential backoff with jitter, shared by channel reconnects and
//! post-reconnect snapshot retries. A connection that stayed open for the
//! stable period resets the backoff to its initial delay.

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Initial delay before first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between reconnection attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 doubles delay each attempt).
    pub multiplier: f64,
    /// Jitter factor as a fraction (e.g., 0.1 = ±10% randomization).
    pub jitter_factor: f64,
    /// How long a connection must stay open to reset the backoff.
    pub stable_period: Duration,
    /// Maximum number of reconnection attempts (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
            stable_period: Duration::from_secs(60),
            max_attempts: 0,
        }
    }
}

/// Backoff schedule for one reconnect loop.
///
/// The delay before attempt `n` (zero based) is
/// `min(initial_delay * multiplier^n, max_delay)`, then spread by jitter.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a policy at attempt zero.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Delay before the next attempt, or `None` once `max_attempts` is spent.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        let limit = self.config.max_attempts;
        if limit != 0 && self.attempt_count >= limit {
            return None;
        }
        let base = self.base_delay(self.attempt_count);
        self.attempt_count = self.attempt_count.saturating_add(1);
        Some(self.jittered(base))
    }

    /// Start over from the initial delay.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Account for a connection that has just closed after `open_for`.
    ///
    /// Resets the backoff if the connection was stable. Returns whether it did.
    pub fn record_session(&mut self, open_for: Duration) -> bool {
        let stable = open_for >= self.config.stable_period;
        if stable {
            self.reset();
        }
        stable
    }

    /// Attempts handed out since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let factor = self.config.multiplier.max(1.0).powi(exponent);
        let cap = self.config.max_delay.as_secs_f64();
        let secs = self.config.initial_delay.as_secs_f64() * factor;
        if secs.is_finite() && secs < cap {
            Duration::from_secs_f64(secs)
        } else {
            self.config.max_delay
        }
    }

    fn jittered(&self, base: Duration) -> Duration {
        let factor = self.config.jitter_factor.clamp(0.0, 1.0);
        if factor <= 0.0 {
            return base;
        }
        let spread = rand::rng().random_range(-factor..=factor);
        base.mul_f64(1.0 + spread).max(Duration::from_millis(1))
    }
}
