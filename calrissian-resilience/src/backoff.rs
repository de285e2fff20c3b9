//! Backoff strategies for retry policies

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff strategy for retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Same delay between every attempt
    Fixed,

    /// delay = initial_delay * attempt
    Linear,

    /// delay = initial_delay * base^(attempt-1)
    Exponential { base: f64 },
}

/// Backoff delay calculator
pub struct BackoffCalculator {
    strategy: BackoffStrategy,
    initial_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl BackoffCalculator {
    pub fn new(
        strategy: BackoffStrategy,
        initial_delay: Duration,
        max_delay: Duration,
        jitter: bool,
    ) -> Self {
        Self {
            strategy,
            initial_delay,
            max_delay,
            jitter,
        }
    }

    /// Calculate delay for a specific attempt (1-indexed)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let capped = self.base_delay(attempt).min(self.max_delay);

        if self.jitter {
            let factor = rand::thread_rng().gen_range(0.8..1.2);
            Duration::from_nanos((capped.as_nanos() as f64 * factor) as u64)
        } else {
            capped
        }
    }

    fn base_delay(&self, attempt: u32) -> Duration {
        match &self.strategy {
            BackoffStrategy::Fixed => self.initial_delay,
            BackoffStrategy::Linear => self.initial_delay * attempt.max(1),
            BackoffStrategy::Exponential { base } => {
                if attempt == 0 {
                    return Duration::ZERO;
                }
                let multiplier = base.powi(attempt as i32 - 1);
                Duration::from_nanos((self.initial_delay.as_nanos() as f64 * multiplier) as u64)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_backoff() {
        let calc = BackoffCalculator::new(
            BackoffStrategy::Fixed,
            Duration::from_secs(5),
            Duration::from_secs(5),
            false,
        );

        assert_eq!(calc.calculate_delay(1), Duration::from_secs(5));
        assert_eq!(calc.calculate_delay(10), Duration::from_secs(5));
    }

    #[test]
    fn test_linear_backoff_capped() {
        let calc = BackoffCalculator::new(
            BackoffStrategy::Linear,
            Duration::from_millis(100),
            Duration::from_secs(1),
            false,
        );

        assert_eq!(calc.calculate_delay(2), Duration::from_millis(200));
        assert_eq!(calc.calculate_delay(20), Duration::from_secs(1));
    }

    #[test]
    fn test_exponential_backoff() {
        let calc = BackoffCalculator::new(
            BackoffStrategy::Exponential { base: 2.0 },
            Duration::from_millis(100),
            Duration::from_millis(500),
            false,
        );

        assert_eq!(calc.calculate_delay(1), Duration::from_millis(100));
        assert_eq!(calc.calculate_delay(3), Duration::from_millis(400));
        assert_eq!(calc.calculate_delay(4), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let calc = BackoffCalculator::new(
            BackoffStrategy::Fixed,
            Duration::from_millis(1000),
            Duration::from_secs(10),
            true,
        );

        let delay = calc.calculate_delay(1);
        assert!(delay >= Duration::from_millis(800));
        assert!(delay <= Duration::from_millis(1200));
    }
}
