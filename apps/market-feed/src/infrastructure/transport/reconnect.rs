//! Reconnect Backoff
//!
//! Exponential backoff with jitter between reconnect attempts of the
//! resilient transport. The policy is reset whenever a connection reaches
//! `connected`, so every outage starts again from the initial delay.

use std::time::Duration;

use rand::Rng;

use crate::infrastructure::config::ReconnectSettings;

/// Backoff parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay, jitter included.
    pub max_delay: Duration,
    /// Growth factor applied after each attempt.
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
    /// Attempts allowed per outage (0 = unbounded).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 0,
        }
    }
}

impl ReconnectConfig {
    /// Backoff parameters from the loaded settings.
    #[must_use]
    pub const fn from_settings(settings: &ReconnectSettings) -> Self {
        Self {
            initial_delay: settings.delay_initial,
            max_delay: settings.delay_max,
            multiplier: settings.delay_multiplier,
            jitter_factor: settings.jitter,
            max_attempts: settings.max_attempts,
        }
    }

    /// Same parameters without jitter, for deterministic delays.
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.jitter_factor = 0.0;
        self
    }
}

/// Stateful backoff for one outage.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    base_delay: Duration,
    attempts: u32,
}

impl ReconnectPolicy {
    /// Start a policy at the initial delay.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        let base_delay = config.initial_delay;
        Self {
            config,
            base_delay,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, or `None` once the attempt budget is spent.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }
        self.attempts += 1;

        let delay = self.jittered(self.base_delay);
        self.base_delay = self.grown(self.base_delay);
        Some(delay)
    }

    /// Forget the outage after a successful connection.
    pub const fn reset(&mut self) {
        self.base_delay = self.config.initial_delay;
        self.attempts = 0;
    }

    /// Attempts scheduled in the current outage.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempts
    }

    /// Configured attempt budget (0 = unbounded).
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Whether another attempt is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempts < self.config.max_attempts
    }

    fn grown(&self, delay: Duration) -> Duration {
        let multiplier = if self.config.multiplier.is_finite() && self.config.multiplier >= 1.0 {
            self.config.multiplier
        } else {
            1.0
        };
        let next = Duration::try_from_secs_f64(delay.as_secs_f64() * multiplier)
            .unwrap_or(self.config.max_delay);
        next.min(self.config.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        let factor = self.config.jitter_factor;
        if !factor.is_finite() || factor <= 0.0 {
            return delay;
        }

        let spread = factor.min(1.0);
        let scale: f64 = rand::rng().random_range((1.0 - spread)..=(1.0 + spread));
        Duration::try_from_secs_f64(delay.as_secs_f64() * scale)
            .unwrap_or(delay)
            .max(Duration::from_millis(1))
            .min(self.config.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(initial_ms: u64, max_ms: u64, multiplier: f64, max_attempts: u32) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            multiplier,
            jitter_factor: 0.0,
            max_attempts,
        }
    }

    #[test]
    fn defaults_match_venue_recommendation() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.max_attempts, 0);
    }

    #[test]
    fn delays_double_until_capped() {
        let mut policy = ReconnectPolicy::new(fixed(1_000, 30_000, 2.0, 0));
        let delays: Vec<u128> = (0..7)
            .map(|_| policy.next_delay().unwrap().as_millis())
            .collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000]);
    }

    #[test]
    fn attempt_budget_is_enforced() {
        let mut policy = ReconnectPolicy::new(fixed(10, 100, 2.0, 2));
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert_eq!(policy.attempt_count(), 2);
        assert!(policy.next_delay().is_none());
        assert!(!policy.should_retry());
    }

    #[test]
    fn reset_restarts_from_initial_delay() {
        let mut policy = ReconnectPolicy::new(fixed(50, 1_000, 3.0, 2));
        let _ = policy.next_delay();
        let _ = policy.next_delay();
        assert!(!policy.should_retry());

        policy.reset();
        assert_eq!(policy.attempt_count(), 0);
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(50)));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        for _ in 0..200 {
            let mut policy = ReconnectPolicy::new(ReconnectConfig {
                initial_delay: Duration::from_millis(2_000),
                jitter_factor: 0.25,
                ..ReconnectConfig::default()
            });
            let millis = policy.next_delay().unwrap().as_millis();
            assert!((1_500..=2_500).contains(&millis), "delay {millis}ms out of range");
        }
    }

    #[test]
    fn jitter_never_exceeds_max_delay() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            initial_delay: Duration::from_millis(800),
            max_delay: Duration::from_millis(1_000),
            jitter_factor: 0.5,
            ..ReconnectConfig::default()
        });
        for _ in 0..200 {
            let delay = policy.next_delay().unwrap();
            assert!(delay <= Duration::from_millis(1_000), "delay {delay:?} above the cap");
        }
    }

    #[test]
    fn nonsense_multiplier_keeps_delay_flat() {
        let mut policy = ReconnectPolicy::new(fixed(100, 1_000, f64::NAN, 0));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn unbounded_policy_never_gives_up() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
        for _ in 0..500 {
            assert!(policy.next_delay().is_some());
        }
        assert_eq!(policy.attempt_count(), 500);
    }
}
