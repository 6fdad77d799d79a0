use std::cmp::min;
use std::future::Future;
use tokio::time::{sleep, Duration};

use crate::errors::{AppError, AppResult};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Bounded retry for a single upload. Every failure is retried the same
/// way until `max_attempts` is reached.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::ZERO,
            max_delay: Duration::from_secs(120),
            exponential_base: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Default::default()
        }
    }

    /// Delay before the retry that follows failed attempt `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }

        let delay_ms = self.base_delay.as_millis() as f64
            * self.exponential_base.powi(attempt.saturating_sub(1) as i32);

        let delay = Duration::from_millis(delay_ms as u64);
        min(delay, self.max_delay)
    }

    /// Runs `operation` until it succeeds or the attempts run out. The
    /// closure is called afresh for every attempt so it can reacquire
    /// whatever the previous attempt consumed.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> AppResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        log::info!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if attempt < max_attempts => {
                    let delay = self.backoff_delay(attempt);
                    log::warn!(
                        "Attempt {}/{} for {} failed{}, retrying in {:?}: {}",
                        attempt,
                        max_attempts,
                        label,
                        if e.is_permanent() { " (likely permanent)" } else { "" },
                        delay,
                        e
                    );
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                }
                Err(e) => {
                    log::error!(
                        "Giving up on {} after {} attempts: {}",
                        label,
                        attempt,
                        e
                    );
                    return Err(AppError::RetriesExhausted {
                        path: label.to_string(),
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.backoff_delay(1), Duration::ZERO);
        assert_eq!(policy.backoff_delay(4), Duration::ZERO);
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            exponential_base: 2.0,
        };
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(350));
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::default()
            .run("flaky", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(AppError::upload_failed("502"))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = RetryPolicy::default()
            .run("stories/a.mp4", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AppError::upload_failed("boom")) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        match result {
            Err(AppError::RetriesExhausted {
                path,
                attempts,
                last_error,
            }) => {
                assert_eq!(path, "stories/a.mp4");
                assert_eq!(attempts, 5);
                assert!(last_error.contains("boom"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_permanent_errors_are_still_retried() {
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = RetryPolicy::new(3, Duration::ZERO)
            .run("x", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AppError::unsupported_media("x.gif")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
