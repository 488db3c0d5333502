//! Bounded exponential backoff for transient failures.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use super::Outcome;
use crate::config::DownloadConfig;
use crate::metrics;

/// Retry policy applied around network-bound strategy attempts.
///
/// Only `TransientFailure` is retried. `Success`, `NotFound` and
/// `PermanentFailure` return immediately. When the budget runs out the last
/// transient outcome is returned unchanged.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    retry_rate_limited: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            retry_rate_limited: true,
        }
    }

    pub fn from_config(config: &DownloadConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.base_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
        )
    }

    /// Return rate-limited outcomes immediately instead of retrying them.
    pub fn without_rate_limit_retries(mut self) -> Self {
        self.retry_rate_limited = false;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the retry following zero-based `attempt`:
    /// `base * 2^attempt`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `op` until it yields a non-retriable outcome or the attempt budget
    /// is spent. `op` receives the zero-based attempt number.
    pub async fn run<F, Fut>(&self, mut op: F) -> Outcome
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Outcome>,
    {
        let mut attempt = 0u32;
        loop {
            let outcome = op(attempt).await;
            if !self.should_retry(&outcome) {
                return outcome;
            }

            attempt += 1;
            if attempt >= self.max_attempts {
                debug!(attempts = attempt, "Retry budget exhausted");
                return outcome;
            }

            let delay = self.delay_for(attempt - 1);
            metrics::RETRY_ATTEMPTS.inc();
            debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                outcome = outcome.label(),
                "Retrying after transient failure"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn should_retry(&self, outcome: &Outcome) -> bool {
        match outcome {
            Outcome::TransientFailure { rate_limited, .. } => {
                self.retry_rate_limited || !rate_limited
            }
            _ => false,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&DownloadConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(1),
            Duration::from_millis(4),
        )
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for(40), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_transient_attempted_exactly_max_times() {
        let calls = AtomicU32::new(0);
        let outcome = fast(3)
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Outcome::transient("timeout") }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(outcome.is_transient());
    }

    #[tokio::test]
    async fn test_permanent_short_circuits() {
        let calls = AtomicU32::new(0);
        let outcome = fast(5)
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Outcome::permanent("not a pdf") }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.label(), "permanent");
    }

    #[tokio::test]
    async fn test_recovers_after_transient() {
        let outcome = fast(3)
            .run(|attempt| async move {
                if attempt == 0 {
                    Outcome::transient("reset")
                } else {
                    Outcome::NotFound
                }
            })
            .await;
        assert_eq!(outcome, Outcome::NotFound);
    }

    #[tokio::test]
    async fn test_rate_limited_not_retried_when_disabled() {
        let calls = AtomicU32::new(0);
        let outcome = fast(3)
            .without_rate_limit_retries()
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Outcome::rate_limited("captcha") }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(outcome.is_rate_limited());
    }

    #[tokio::test]
    async fn test_zero_attempts_treated_as_one() {
        let calls = AtomicU32::new(0);
        fast(0)
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Outcome::transient("x") }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
