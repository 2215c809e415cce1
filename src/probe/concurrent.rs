//! Concurrent request sub-test run against a freshly recovered target.
//!
//! A fixed pool of workers issues requests through a shared circuit breaker
//! and tallies results into one mutex-protected counter.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::checks::HealthCheck;
use crate::config::ConcurrencyConfig;
use crate::resilience::{CallError, CircuitBreaker};

/// Aggregated results of a concurrent request run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConcurrencyReport {
    pub workers: usize,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Requests the breaker refused without sending.
    pub rejected: usize,
}

impl ConcurrencyReport {
    /// Fraction of all requests that succeeded; 0.0 when nothing ran.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.total as f64
        }
    }
}

#[derive(Default)]
struct Tally {
    succeeded: usize,
    failed: usize,
    rejected: usize,
}

/// Bounded worker pool issuing health requests in parallel.
#[derive(Debug, Clone)]
pub struct ConcurrentRequestTest {
    workers: usize,
    requests_per_worker: usize,
}

impl ConcurrentRequestTest {
    /// Worker count is clamped to 1..=20.
    pub fn new(workers: usize, requests_per_worker: usize) -> Self {
        Self {
            workers: workers.clamp(1, 20),
            requests_per_worker: requests_per_worker.max(1),
        }
    }

    pub fn from_config(config: &ConcurrencyConfig) -> Self {
        Self::new(config.workers, config.requests_per_worker)
    }

    pub async fn run(&self, check: Arc<dyn HealthCheck>, breaker: Arc<CircuitBreaker>) -> ConcurrencyReport {
        let tally = Arc::new(Mutex::new(Tally::default()));

        let handles: Vec<_> = (0..self.workers)
            .map(|worker| {
                let check = Arc::clone(&check);
                let breaker = Arc::clone(&breaker);
                let tally = Arc::clone(&tally);
                let requests = self.requests_per_worker;
                tokio::spawn(async move {
                    let check = &check;
                    for _ in 0..requests {
                        let result = breaker
                            .call(|| async move {
                                if check.check().await {
                                    Ok(())
                                } else {
                                    Err(())
                                }
                            })
                            .await;
                        let mut t = tally.lock();
                        match result {
                            Ok(()) => t.succeeded += 1,
                            Err(CallError::Operation(())) => t.failed += 1,
                            Err(CallError::CircuitOpen) => t.rejected += 1,
                        }
                    }
                    debug!(worker, "Concurrent worker finished");
                })
            })
            .collect();

        for joined in futures::future::join_all(handles).await {
            if let Err(e) = joined {
                debug!(error = %e, "Concurrent worker aborted");
            }
        }

        let t = tally.lock();
        let report = ConcurrencyReport {
            workers: self.workers,
            total: self.workers * self.requests_per_worker,
            succeeded: t.succeeded,
            failed: t.failed,
            rejected: t.rejected,
        };
        info!(
            workers = report.workers,
            succeeded = report.succeeded,
            failed = report.failed,
            rejected = report.rejected,
            "Concurrent request test finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CircuitBreakerConfig;
    use crate::probe::FnHealthCheck;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn breaker(threshold: u32) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            "concurrent",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                timeout: Duration::from_secs(60),
            },
        ))
    }

    #[tokio::test]
    async fn test_all_requests_counted_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let check: Arc<dyn HealthCheck> = Arc::new(FnHealthCheck::new("ok", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        }));
        let report = ConcurrentRequestTest::new(10, 5).run(check, breaker(5)).await;
        assert_eq!(report.total, 50);
        assert_eq!(report.succeeded, 50);
        assert_eq!(report.failed + report.rejected, 0);
        assert_eq!(hits.load(Ordering::SeqCst), 50);
        assert_eq!(report.success_rate(), 1.0);
    }

    #[tokio::test]
    async fn test_breaker_sheds_load_against_dead_target() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let check: Arc<dyn HealthCheck> = Arc::new(FnHealthCheck::new("dead", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            false
        }));
        let report = ConcurrentRequestTest::new(4, 10).run(check, breaker(3)).await;
        assert_eq!(report.total, 40);
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.failed + report.rejected, 40);
        assert!(report.rejected > 0);
        assert_eq!(hits.load(Ordering::SeqCst), report.failed);
    }

    #[test]
    fn test_worker_bounds() {
        let t = ConcurrentRequestTest::new(100, 0);
        assert_eq!(t.workers, 20);
        assert_eq!(t.requests_per_worker, 1);
    }
}
