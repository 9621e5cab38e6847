//! Reconnection Policy
//!
//! Exponential backoff with jitter between Horizon stream sessions. The
//! attempt counter only tracks consecutive failures: a session that reaches
//! the server greeting resets it.

use std::time::Duration;

use rand::Rng;

use crate::infrastructure::config::ReconnectSettings;

/// Backoff parameters.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound for the delay.
    pub max_delay: Duration,
    /// Growth factor applied after each attempt.
    pub multiplier: f64,
    /// Randomization as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
    /// Consecutive failed attempts before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::from_settings(&ReconnectSettings::default())
    }
}

impl ReconnectConfig {
    /// Build from the configured reconnection settings.
    #[must_use]
    pub const fn from_settings(settings: &ReconnectSettings) -> Self {
        Self {
            initial_delay: settings.delay_initial,
            max_delay: settings.delay_max,
            multiplier: settings.delay_multiplier,
            jitter_factor: 0.1,
            max_attempts: settings.max_attempts,
        }
    }

    /// Same parameters without randomization.
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.jitter_factor = 0.0;
        self
    }
}

/// Stateful backoff schedule.
///
/// # Example
///
/// ```rust
/// use wallet_stream::infrastructure::horizon::{ReconnectConfig, ReconnectPolicy};
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
/// assert!(policy.next_delay().is_some());
///
/// // Greeting received; start over.
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a policy at its initial delay.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        let current_delay = config.initial_delay;
        Self {
            config,
            current_delay,
            attempt_count: 0,
        }
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.config.max_attempts > 0 && self.attempt_count >= self.config.max_attempts {
            return None;
        }
        self.attempt_count += 1;

        let delay = self.jittered(self.current_delay);
        self.current_delay = self.grown(self.current_delay);
        Some(delay)
    }

    /// Return to the initial delay after a healthy session.
    pub const fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.attempt_count = 0;
    }

    /// Attempts made since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Configured attempt ceiling (0 = unlimited).
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Next base delay. Never shrinks below the initial delay, so a bad
    /// multiplier or cap cannot turn backoff into a busy loop.
    fn grown(&self, delay: Duration) -> Duration {
        let multiplier = if self.config.multiplier.is_finite() {
            self.config.multiplier.max(1.0)
        } else {
            1.0
        };

        #[allow(clippy::cast_precision_loss)]
        let scaled = (delay.as_millis() as f64 * multiplier).round();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let millis = if scaled.is_finite() { scaled as u128 } else { u128::MAX };

        let capped = millis
            .min(self.config.max_delay.as_millis())
            .max(self.config.initial_delay.as_millis());
        Duration::from_millis(u64::try_from(capped).unwrap_or(u64::MAX))
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return delay;
        }

        #[allow(clippy::cast_precision_loss)]
        let base = delay.as_millis() as f64;
        let spread = base * self.config.jitter_factor;
        let offset: f64 = rand::rng().random_range(-spread..=spread);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let millis = (base + offset).max(1.0) as u64;
        Duration::from_millis(millis)
    }
}

/// Reconnection failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ReconnectError {
    /// Maximum consecutive attempts exceeded.
    #[error("maximum reconnection attempts ({0}) exceeded")]
    MaxAttemptsExceeded(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(initial_ms: u64, max_ms: u64, multiplier: f64, max_attempts: u32) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            multiplier,
            jitter_factor: 0.0,
            max_attempts,
        }
    }

    #[test]
    fn defaults_follow_settings() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_millis(500));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!((config.jitter_factor - 0.1).abs() < f64::EPSILON);
        assert_eq!(config.max_attempts, 0);
        assert!(config.without_jitter().jitter_factor.abs() < f64::EPSILON);
    }

    #[test]
    fn delays_grow_until_capped() {
        let mut policy = ReconnectPolicy::new(config(100, 500, 2.0, 0));

        let delays: Vec<_> = (0..5)
            .map(|_| policy.next_delay().unwrap().as_millis())
            .collect();

        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
    }

    #[test]
    fn attempts_are_bounded() {
        let mut policy = ReconnectPolicy::new(config(10, 100, 2.0, 2));

        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_none());
        assert_eq!(policy.attempt_count(), 2);
        assert_eq!(policy.max_attempts(), 2);
    }

    #[test]
    fn reset_restores_initial_delay() {
        let mut policy = ReconnectPolicy::new(config(100, 10_000, 3.0, 2));
        let _ = policy.next_delay();
        let _ = policy.next_delay();

        policy.reset();

        assert_eq!(policy.attempt_count(), 0);
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        for _ in 0..100 {
            let mut policy = ReconnectPolicy::new(ReconnectConfig {
                jitter_factor: 0.1,
                ..config(1000, 10_000, 2.0, 0)
            });

            let millis = policy.next_delay().unwrap().as_millis();
            assert!((900..=1100).contains(&millis), "delay {millis}ms out of range");
        }
    }

    #[test]
    fn shrinking_multiplier_never_drops_below_initial() {
        for multiplier in [0.5, 0.0, -2.0, f64::NAN] {
            let mut policy = ReconnectPolicy::new(config(400, 30_000, multiplier, 0));

            let delays: Vec<_> = (0..14)
                .map(|_| policy.next_delay().unwrap().as_millis())
                .collect();

            assert!(
                delays.iter().all(|&d| d == 400),
                "multiplier {multiplier} produced {delays:?}"
            );
        }
    }

    #[test]
    fn zero_cap_keeps_initial_delay() {
        let mut policy = ReconnectPolicy::new(config(500, 0, 2.0, 0));

        let delays: Vec<_> = (0..4)
            .map(|_| policy.next_delay().unwrap().as_millis())
            .collect();

        assert_eq!(delays, vec![500, 500, 500, 500]);
    }
}
