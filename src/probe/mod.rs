//! Recovery probing: poll a health check until it passes or time runs out.
//!
//! Polling is driven by a monotonic deadline. Each individual check is
//! bounded by the poll interval and checks start at most one interval apart,
//! so a probe never blocks longer than `timeout + interval`.

mod checks;
mod concurrent;
mod measurement;

pub use checks::{DatabaseHealthCheck, FnHealthCheck, HealthCheck, HttpHealthCheck, TcpHealthCheck};
pub use concurrent::{ConcurrencyReport, ConcurrentRequestTest};
pub use measurement::RecoveryMeasurement;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::HarnessConfig;
use crate::error::ProbeTimeoutError;
use crate::telemetry;

/// Single definitive result of one probe call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProbeOutcome {
    pub recovered: bool,
    #[serde(rename = "elapsed_secs", serialize_with = "as_secs")]
    pub elapsed: Duration,
    pub checks: u32,
}

fn as_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl ProbeOutcome {
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    /// `Ok(elapsed)` when recovered, otherwise the timeout error.
    pub fn into_result(self, check: &str, timeout: Duration) -> Result<Duration, ProbeTimeoutError> {
        if self.recovered {
            Ok(self.elapsed)
        } else {
            Err(ProbeTimeoutError {
                check: check.to_string(),
                timeout_secs: timeout.as_secs_f64(),
            })
        }
    }
}

/// Polls health checks with a fixed timeout and interval.
#[derive(Debug, Clone)]
pub struct RecoveryProbe {
    timeout: Duration,
    interval: Duration,
}

impl RecoveryProbe {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(config.app_restart_timeout, config.probe_interval)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Invoke `check` every `interval` until it returns true or `timeout`
    /// elapses.
    pub async fn poll_until_healthy(
        check: &dyn HealthCheck,
        timeout: Duration,
        interval: Duration,
    ) -> ProbeOutcome {
        let interval = interval.max(Duration::from_millis(1));
        let start = Instant::now();
        let deadline = start + timeout;
        let mut checks = 0u32;

        loop {
            let tick = Instant::now();
            checks += 1;
            let healthy = tokio::time::timeout(interval, check.check())
                .await
                .unwrap_or(false);
            if healthy {
                let elapsed = start.elapsed();
                debug!(check = check.name(), checks, elapsed_ms = elapsed.as_millis() as u64, "Target healthy");
                return ProbeOutcome {
                    recovered: true,
                    elapsed,
                    checks,
                };
            }

            if Instant::now() >= deadline {
                return ProbeOutcome {
                    recovered: false,
                    elapsed: start.elapsed(),
                    checks,
                };
            }
            tokio::time::sleep_until((tick + interval).min(deadline)).await;
        }
    }

    /// Probe with this probe's timeout/interval and record the measurement.
    pub async fn measure(&self, scenario_id: &str, check: &dyn HealthCheck) -> (ProbeOutcome, RecoveryMeasurement) {
        self.measure_since(scenario_id, check, Utc::now(), Instant::now()).await
    }

    /// Like [`measure`](Self::measure) for an outage that began at `since`.
    ///
    /// Time already spent counts against the timeout and toward the
    /// measured duration.
    pub async fn measure_since(
        &self,
        scenario_id: &str,
        check: &dyn HealthCheck,
        started_at: DateTime<Utc>,
        since: Instant,
    ) -> (ProbeOutcome, RecoveryMeasurement) {
        let spent = since.elapsed();
        let mut outcome =
            Self::poll_until_healthy(check, self.timeout.saturating_sub(spent), self.interval).await;
        outcome.elapsed += spent;
        if outcome.recovered {
            info!(
                scenario = scenario_id,
                method = check.name(),
                elapsed_secs = outcome.elapsed_secs(),
                "Target recovered"
            );
        } else {
            warn!(
                scenario = scenario_id,
                method = check.name(),
                timeout_secs = self.timeout.as_secs_f64(),
                "Target did not recover before timeout"
            );
        }
        telemetry::metrics::record_recovery(check.name(), outcome.elapsed_secs());
        let measurement = RecoveryMeasurement::new(
            scenario_id,
            started_at,
            outcome.elapsed,
            outcome.recovered,
            check.name(),
        );
        (outcome, measurement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_immediately_healthy() {
        let check = FnHealthCheck::new("ok", || true);
        let outcome =
            RecoveryProbe::poll_until_healthy(&check, Duration::from_secs(5), Duration::from_secs(1)).await;
        assert!(outcome.recovered);
        assert_eq!(outcome.checks, 1);
        assert!(outcome.elapsed < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_into_result() {
        let check = FnHealthCheck::new("never", || false);
        let timeout = Duration::from_secs(3);
        let outcome = RecoveryProbe::poll_until_healthy(&check, timeout, Duration::from_secs(1)).await;
        let err = outcome.into_result("never", timeout).unwrap_err();
        assert_eq!(err.check, "never");
        assert_eq!(err.timeout_secs, 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_measure_since_counts_time_already_spent() {
        let probe = RecoveryProbe::new(Duration::from_secs(10), Duration::from_secs(1));
        let since = Instant::now();
        let up_at = since + Duration::from_secs(6);
        let check = FnHealthCheck::new("scripted", move || Instant::now() >= up_at);
        tokio::time::sleep(Duration::from_secs(4)).await;

        let (outcome, m) = probe.measure_since("scn", &check, Utc::now(), since).await;
        assert!(outcome.recovered);
        assert_eq!(outcome.elapsed, Duration::from_secs(6));
        assert_eq!(m.duration(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_measure_since_shares_the_timeout() {
        let probe = RecoveryProbe::new(Duration::from_secs(5), Duration::from_secs(1));
        let since = Instant::now();
        tokio::time::sleep(Duration::from_secs(3)).await;
        let check = FnHealthCheck::new("never", || false);

        let (outcome, _) = probe.measure_since("scn", &check, Utc::now(), since).await;
        assert!(!outcome.recovered);
        assert!(outcome.elapsed >= Duration::from_secs(5));
        assert!(outcome.elapsed <= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_measure_records_one_measurement() {
        let probe = RecoveryProbe::new(Duration::from_secs(2), Duration::from_millis(500));
        let check = FnHealthCheck::new("never", || false);
        let (outcome, m) = probe.measure("scn", &check).await;
        assert!(!outcome.recovered);
        assert!(!m.success);
        assert_eq!(m.scenario_id, "scn");
        assert_eq!(m.method, "never");
        assert!(m.duration_secs >= 2.0);
    }
}
