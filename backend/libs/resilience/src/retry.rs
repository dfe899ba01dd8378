/// Reconnect backoff with exponential growth, a hard cap and jitter
use rand::Rng;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Consecutive failures tolerated before giving up
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Add random jitter to backoff (±30%)
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Stateful delay generator: 1s, 2s, 4s, 5s, 5s, ... for the default config.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: RetryConfig,
    current: Duration,
}

impl Backoff {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            current: config.initial_backoff.min(config.max_backoff),
            config: config.clone(),
        }
    }

    /// Delay to wait before the next attempt, advancing the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;

        self.current = Duration::from_millis(
            ((self.current.as_millis() as f64 * self.config.backoff_multiplier)
                .min(self.config.max_backoff.as_millis() as f64)) as u64,
        );

        let delay = calculate_backoff(base, self.config.jitter);
        delay.min(self.config.max_backoff)
    }

    pub fn reset(&mut self) {
        self.current = self.config.initial_backoff.min(self.config.max_backoff);
    }
}

/// Counts consecutive failures against the configured ceiling.
///
/// `record_failure` hands back the delay before the next attempt, or `None`
/// once the ceiling is reached. A success must call `reset`.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    max_retries: u32,
    failures: u32,
    backoff: Backoff,
}

impl RetryBudget {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            failures: 0,
            backoff: Backoff::new(config),
        }
    }

    pub fn record_failure(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);

        if self.is_exhausted() {
            warn!("Max retries ({}) reached", self.max_retries);
            return None;
        }

        Some(self.backoff.next_delay())
    }

    pub fn reset(&mut self) {
        self.failures = 0;
        self.backoff.reset();
    }

    /// Consecutive failures since the last reset
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn is_exhausted(&self) -> bool {
        self.failures >= self.max_retries
    }
}

fn calculate_backoff(base: Duration, jitter: bool) -> Duration {
    if jitter {
        let mut rng = rand::thread_rng();
        let jitter_factor = 1.0 + rng.gen_range(-0.3..0.3); // ±30%
        Duration::from_millis((base.as_millis() as f64 * jitter_factor) as u64)
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_config() -> RetryConfig {
        RetryConfig {
            jitter: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let mut backoff = Backoff::new(&fixed_config());

        let delays: Vec<u64> = (0..6).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5, 5]);
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::new(&fixed_config());
        backoff.next_delay();
        backoff.next_delay();

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_stays_within_cap() {
        let config = RetryConfig::default();
        let mut backoff = Backoff::new(&config);

        for _ in 0..20 {
            let delay = backoff.next_delay();
            assert!(delay <= config.max_backoff);
            assert!(delay >= Duration::from_millis(700));
        }
    }

    #[test]
    fn test_budget_exhausts_at_ceiling() {
        let mut budget = RetryBudget::new(&fixed_config());

        for attempt in 1..5 {
            assert!(budget.record_failure().is_some(), "attempt {attempt}");
        }
        assert!(!budget.is_exhausted());

        assert_eq!(budget.record_failure(), None);
        assert!(budget.is_exhausted());
        assert_eq!(budget.failures(), 5);
    }

    #[test]
    fn test_budget_reset_restores_allowance() {
        let mut budget = RetryBudget::new(&fixed_config());
        for _ in 0..4 {
            budget.record_failure();
        }

        budget.reset();
        assert_eq!(budget.failures(), 0);
        assert_eq!(budget.record_failure(), Some(Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_drives_sleep_schedule() {
        let mut budget = RetryBudget::new(&fixed_config());
        let start = tokio::time::Instant::now();

        while let Some(delay) = budget.record_failure() {
            tokio::time::sleep(delay).await;
        }

        // 1s + 2s + 4s + 5s between the five attempts
        assert_eq!(start.elapsed(), Duration::from_secs(12));
    }
}
