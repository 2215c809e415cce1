//! Bounded retry with fixed or exponential (jittered) delays.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tracing::debug;

use crate::config::RetryConfig;

/// Delay between attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed(Duration),
    /// `base * factor^(retry-1)`, capped at `max`. With `jitter` the actual
    /// sleep is drawn uniformly from `[0, computed]`.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        jitter: bool,
    },
}

impl Backoff {
    /// Delay before retry number `retry` (1-based: the sleep after attempt 1
    /// is retry 1).
    pub fn delay_for(&self, retry: u32) -> Duration {
        match self {
            Backoff::Fixed(delay) => *delay,
            Backoff::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exp = retry.saturating_sub(1).min(63) as i32;
                let scaled = base.as_secs_f64() * factor.max(1.0).powi(exp);
                let capped = scaled.min(max.as_secs_f64());
                let secs = if *jitter && capped > 0.0 {
                    rand::thread_rng().gen_range(0.0..=capped)
                } else {
                    capped
                };
                Duration::from_secs_f64(secs)
            }
        }
    }
}

/// Retry policy: attempt budget plus backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
        }
    }

    /// Exponential backoff with full jitter, doubling from `base` up to `max`.
    pub fn exponential(max_attempts: u32, base: Duration, max: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential {
                base,
                factor: 2.0,
                max,
                jitter: true,
            },
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::fixed(config.attempts, config.delay)
    }
}

/// Outcome of a retried operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetryOutcome<E> {
    pub succeeded: bool,
    pub attempts_used: u32,
    /// Error from the final attempt when every attempt failed.
    pub last_error: Option<E>,
}

/// Invokes an operation up to `max_attempts` times.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    ///
    /// Sleeps between attempts, never after the last one. A budget of zero
    /// is treated as one attempt.
    pub async fn execute<F, Fut, T, E>(&self, mut op: F) -> (Option<T>, RetryOutcome<E>)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match op(attempt).await {
                Ok(value) => {
                    debug!(attempt, max_attempts, "Operation succeeded");
                    return (
                        Some(value),
                        RetryOutcome {
                            succeeded: true,
                            attempts_used: attempt,
                            last_error: None,
                        },
                    );
                }
                Err(e) => {
                    debug!(attempt, max_attempts, "Operation failed");
                    last_error = Some(e);
                }
            }
            if attempt < max_attempts {
                tokio::time::sleep(self.policy.backoff.delay_for(attempt)).await;
            }
        }

        (
            None,
            RetryOutcome {
                succeeded: false,
                attempts_used: max_attempts,
                last_error,
            },
        )
    }

    /// Retry a boolean check. Returns `(succeeded, attempts_used)`.
    pub async fn execute_check<F, Fut>(&self, mut check: F) -> (bool, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let (_, outcome) = self
            .execute(|_| {
                let fut = check();
                async move {
                    if fut.await {
                        Ok(())
                    } else {
                        Err(())
                    }
                }
            })
            .await;
        (outcome.succeeded, outcome.attempts_used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_uses_exactly_n_attempts() {
        let executor = RetryExecutor::new(RetryPolicy::fixed(4, Duration::from_millis(100)));
        let calls = AtomicU32::new(0);
        let (value, outcome) = executor
            .execute(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("nope") }
            })
            .await;
        assert!(value.is_none());
        assert!(!outcome.succeeded);
        assert_eq!(outcome.attempts_used, 4);
        assert_eq!(outcome.last_error, Some("nope"));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_at_first_success() {
        let executor = RetryExecutor::new(RetryPolicy::fixed(5, Duration::from_millis(100)));
        let (value, outcome) = executor
            .execute(|attempt| async move {
                if attempt == 3 {
                    Ok(attempt * 10)
                } else {
                    Err("not yet")
                }
            })
            .await;
        assert_eq!(value, Some(30));
        assert!(outcome.succeeded);
        assert_eq!(outcome.attempts_used, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_sleep_after_last_attempt() {
        let executor = RetryExecutor::new(RetryPolicy::fixed(3, Duration::from_secs(10)));
        let start = tokio::time::Instant::now();
        let _ = executor.execute(|_| async { Err::<(), _>(()) }).await;
        // Two sleeps between three attempts.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(20));
        assert!(elapsed < Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_treated_as_one() {
        let executor = RetryExecutor::new(RetryPolicy::fixed(0, Duration::from_secs(1)));
        let (ok, attempts) = executor.execute_check(|| async { false }).await;
        assert!(!ok);
        assert_eq!(attempts, 1);
    }

    #[test]
    fn test_exponential_backoff_caps_at_max() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_millis(500),
            jitter: false,
        };
        assert_eq!(backoff.delay_for(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(200));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(400));
        assert_eq!(backoff.delay_for(4), Duration::from_millis(500));
        assert_eq!(backoff.delay_for(40), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_within_bound() {
        let policy = RetryPolicy::exponential(5, Duration::from_millis(100), Duration::from_secs(1));
        for retry in 1..10 {
            assert!(policy.backoff.delay_for(retry) <= Duration::from_secs(1));
        }
    }
}
