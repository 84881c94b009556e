//! Delay schedule between readiness polls.
//!
//! Jitter spreads the describe calls of many concurrently polling node pools
//! so they do not hit the control plane in lockstep.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::PollConfig;

/// How the base delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = interval
    #[default]
    Constant,
    /// delay = interval * (attempt + 1)
    Linear,
    /// delay = interval * 2^attempt
    Exponential,
}

/// Randomization applied on top of the base delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    #[default]
    Equal,
    /// min(max, random(interval, prev * 3))
    Decorrelated,
}

/// Per-poll backoff state.
#[derive(Debug, Default)]
pub struct BackoffState {
    attempt: u32,
    previous_ms: Option<u64>,
}

impl BackoffState {
    /// Creates a fresh state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of delays handed out so far.
    #[cfg(test)]
    const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Computes the next delay and advances the attempt counter.
    pub fn next_delay(&mut self, config: &PollConfig) -> Duration {
        let base = config.interval_ms;
        let max = config.max_interval_ms.max(base);

        let delay = match config.backoff {
            BackoffStrategy::Constant => base,
            BackoffStrategy::Linear => base.saturating_mul(u64::from(self.attempt) + 1),
            BackoffStrategy::Exponential => {
                base.saturating_mul(2u64.saturating_pow(self.attempt))
            }
        }
        .min(max);

        let jittered = match config.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    (delay - half) + rand::thread_rng().gen_range(0..=half)
                }
            }
            JitterStrategy::Decorrelated => {
                let prev = self.previous_ms.unwrap_or(base);
                let upper = prev.saturating_mul(3).min(max);
                if upper <= base {
                    base
                } else {
                    rand::thread_rng().gen_range(base..=upper)
                }
            }
        };

        self.previous_ms = Some(jittered);
        self.attempt = self.attempt.saturating_add(1);
        Duration::from_millis(jittered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(backoff: BackoffStrategy, jitter: JitterStrategy) -> PollConfig {
        PollConfig::new()
            .with_interval_ms(100)
            .with_max_interval_ms(1000)
            .with_backoff(backoff)
            .with_jitter(jitter)
    }

    #[test]
    fn test_defaults() {
        assert_eq!(BackoffStrategy::default(), BackoffStrategy::Constant);
        assert_eq!(JitterStrategy::default(), JitterStrategy::Equal);
    }

    #[test]
    fn test_constant_no_jitter() {
        let config = config(BackoffStrategy::Constant, JitterStrategy::None);
        let mut state = BackoffState::new();

        for _ in 0..5 {
            assert_eq!(state.next_delay(&config), Duration::from_millis(100));
        }
        assert_eq!(state.attempt(), 5);
    }

    #[test]
    fn test_linear_no_jitter() {
        let config = config(BackoffStrategy::Linear, JitterStrategy::None);
        let mut state = BackoffState::new();

        assert_eq!(state.next_delay(&config), Duration::from_millis(100));
        assert_eq!(state.next_delay(&config), Duration::from_millis(200));
        assert_eq!(state.next_delay(&config), Duration::from_millis(300));
    }

    #[test]
    fn test_exponential_capped_at_max() {
        let config = config(BackoffStrategy::Exponential, JitterStrategy::None);
        let mut state = BackoffState::new();

        let delays: Vec<u128> = (0..6).map(|_| state.next_delay(&config).as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000]);
    }

    #[test]
    fn test_equal_jitter_stays_in_upper_half() {
        let config = config(BackoffStrategy::Constant, JitterStrategy::Equal);
        let mut state = BackoffState::new();

        for _ in 0..20 {
            let delay = state.next_delay(&config).as_millis();
            assert!((50..=100).contains(&delay), "delay {delay} out of range");
        }
    }

    #[test]
    fn test_full_jitter_bounded() {
        let config = config(BackoffStrategy::Constant, JitterStrategy::Full);
        let mut state = BackoffState::new();

        for _ in 0..20 {
            assert!(state.next_delay(&config).as_millis() <= 100);
        }
    }

    #[test]
    fn test_decorrelated_jitter_bounded() {
        let config = config(BackoffStrategy::Constant, JitterStrategy::Decorrelated);
        let mut state = BackoffState::new();

        for _ in 0..20 {
            let delay = state.next_delay(&config).as_millis();
            assert!((100..=1000).contains(&delay), "delay {delay} out of range");
        }
    }

    #[test]
    fn test_zero_interval() {
        let config = PollConfig::new().with_interval_ms(0).with_jitter(JitterStrategy::Full);
        let mut state = BackoffState::new();
        assert_eq!(state.next_delay(&config), Duration::ZERO);
    }
}
