//! Timeout and retry wrapper for wallet calls.

use rand::Rng;
use std::{future::Future, time::Duration};

use super::errors::{WalletError, WalletResult};

/// Bounded retry with exponential backoff and equal jitter
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(2000),
            max_retries: 3,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    /// Policy with no waiting, for tests
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_retries,
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (0-based).
    ///
    /// Equal jitter: the delay lies in `[backoff/2, backoff]` where backoff
    /// doubles per attempt up to `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        let backoff = self
            .base_backoff
            .saturating_mul(factor)
            .min(self.max_backoff);
        let backoff_ms = backoff.as_millis() as u64;
        if backoff_ms <= 1 {
            return backoff;
        }
        let half_ms = backoff_ms / 2;
        let jitter_ms = rand::rng().random_range(0..=half_ms);
        Duration::from_millis(half_ms.saturating_add(jitter_ms))
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    ///
    /// Returns the last error on exhaustion.
    pub async fn execute<F, Fut, T>(&self, label: &str, mut op: F) -> WalletResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = WalletResult<T>>,
    {
        let mut attempt = 0;
        loop {
            let result = match tokio::time::timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(WalletError::Timeout(self.timeout)),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.backoff(attempt);
                    attempt += 1;
                    log::warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        label,
                        attempt,
                        self.max_retries + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_stays_within_bounds() {
        let policy = RetryPolicy {
            timeout: Duration::from_secs(1),
            max_retries: 5,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1000),
        };
        for attempt in 0..10 {
            let cap = (100u64 << attempt.min(16)).min(1000);
            let delay = policy.backoff(attempt).as_millis() as u64;
            assert!(delay >= cap / 2 && delay <= cap, "attempt {attempt}: {delay}ms");
        }
    }

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = RetryPolicy::immediate(3)
            .execute("test", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(WalletError::Unavailable("down".to_string()))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: WalletResult<()> = RetryPolicy::immediate(2)
            .execute("test", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(WalletError::Unavailable("down".to_string()))
            })
            .await;
        assert!(matches!(result, Err(WalletError::Unavailable(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: WalletResult<()> = RetryPolicy::immediate(5)
            .execute("test", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(WalletError::InvalidAmount(-1))
            })
            .await;
        assert!(matches!(result, Err(WalletError::InvalidAmount(-1))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_attempt_times_out() {
        let policy = RetryPolicy {
            timeout: Duration::from_millis(10),
            max_retries: 0,
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        };
        let result: WalletResult<()> = policy
            .execute("test", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(WalletError::Timeout(_))));
    }
}
