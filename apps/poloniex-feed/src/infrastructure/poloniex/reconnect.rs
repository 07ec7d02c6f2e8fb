//! Dial Retry Policy
//!
//! Bounded exponential backoff with jitter for dialling the feed. One policy
//! instance covers one `ensure_connected` call: it allows `max_attempts`
//! dials in total and yields the delay to wait after each failed one.

use std::time::Duration;

use rand::Rng;

/// Retry configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay after the first failed dial.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Growth factor applied after each failure.
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
    /// Total dial attempts per connect; at least one.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 10,
        }
    }
}

impl ReconnectConfig {
    /// Build from connection settings.
    #[must_use]
    pub fn from_connection_settings(
        settings: &crate::infrastructure::config::ConnectionSettings,
    ) -> Self {
        Self {
            initial_delay: settings.reconnect_delay_initial,
            max_delay: settings.reconnect_delay_max,
            multiplier: settings.reconnect_delay_multiplier,
            jitter_factor: 0.1,
            max_attempts: settings.dial_attempts.max(1),
        }
    }
}

/// Attempt counter and backoff state for one connect call.
///
/// # Example
///
/// ```rust
/// use poloniex_feed::infrastructure::poloniex::reconnect::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig {
///     max_attempts: 2,
///     jitter_factor: 0.0,
///     ..ReconnectConfig::default()
/// });
///
/// // First dial failed: wait, then try again.
/// assert_eq!(policy.record_failure(), Some(Duration::from_millis(500)));
/// // Second dial failed: out of attempts.
/// assert_eq!(policy.record_failure(), None);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    failures: u32,
}

impl ReconnectPolicy {
    /// Create a fresh policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        let current_delay = config.initial_delay;
        Self {
            config,
            current_delay,
            failures: 0,
        }
    }

    /// Record a failed dial.
    ///
    /// Returns the delay before the next attempt, or `None` once every
    /// allowed attempt has been used.
    #[must_use]
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);
        if self.failures >= self.config.max_attempts.max(1) {
            return None;
        }

        let delay = self.jittered(self.current_delay);
        self.current_delay = Duration::try_from_secs_f64(
            self.current_delay.as_secs_f64() * self.config.multiplier,
        )
        .unwrap_or(self.config.max_delay)
        .min(self.config.max_delay);

        Some(delay)
    }

    /// Failed dials so far.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.failures
    }

    /// Total attempts allowed.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Whether another dial is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.failures < self.config.max_attempts
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 || delay.is_zero() {
            return delay;
        }

        let base = delay.as_secs_f64();
        let spread = base * self.config.jitter_factor;
        let offset: f64 = rand::rng().random_range(-spread..=spread);
        Duration::try_from_secs_f64((base + offset).max(0.001)).unwrap_or(delay)
    }
}
