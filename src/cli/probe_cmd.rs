//! `probe`: check the target's health without injecting anything.
//!
//! Exits 0 when every configured check is healthy, 1 otherwise. With
//! `--wait` each check is polled until `APP_RESTART_TIMEOUT` instead of
//! being retried `RETRY_ATTEMPTS` times.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::{has_flag, load_config_or_exit, EXIT_CONFIG, EXIT_FAILURE, EXIT_SUCCESS};
use crate::probe::{DatabaseHealthCheck, HealthCheck, HttpHealthCheck, RecoveryProbe};
use crate::resilience::{RetryExecutor, RetryPolicy};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of probing one check.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub check: String,
    pub healthy: bool,
    pub attempts: u32,
    pub elapsed: Duration,
}

/// How each check is probed.
pub enum ProbeMode {
    Retry(RetryExecutor),
    Wait(RecoveryProbe),
}

pub async fn probe_all(checks: &[Arc<dyn HealthCheck>], mode: &ProbeMode) -> Vec<ProbeResult> {
    let mut results = Vec::with_capacity(checks.len());
    for check in checks {
        let check: &dyn HealthCheck = check.as_ref();
        let start = Instant::now();
        let (healthy, attempts) = match mode {
            ProbeMode::Retry(retry) => retry.execute_check(|| check.check()).await,
            ProbeMode::Wait(probe) => {
                let outcome =
                    RecoveryProbe::poll_until_healthy(check, probe.timeout(), probe.interval()).await;
                (outcome.recovered, outcome.checks)
            }
        };
        results.push(ProbeResult {
            check: check.name().to_string(),
            healthy,
            attempts,
            elapsed: start.elapsed(),
        });
    }
    results
}

pub async fn run_probe(args: &[String]) -> i32 {
    let config = match load_config_or_exit(args) {
        Ok(config) => config,
        Err(code) => return code,
    };

    let mut checks: Vec<Arc<dyn HealthCheck>> = Vec::new();
    match HttpHealthCheck::new(config.health_url(), config.accepted_statuses.clone(), REQUEST_TIMEOUT) {
        Ok(check) => checks.push(Arc::new(check)),
        Err(e) => {
            eprintln!("Configuration error: HTTP client: {}", e);
            return EXIT_CONFIG;
        }
    }
    if config.database.is_configured() {
        checks.push(Arc::new(DatabaseHealthCheck::new(config.database.connect_options())));
    }

    let mode = if has_flag(args, "--wait") {
        ProbeMode::Wait(RecoveryProbe::from_config(&config))
    } else {
        ProbeMode::Retry(RetryExecutor::new(RetryPolicy::from(&config.retry)))
    };

    println!("Probing {}", config.health_url());
    let results = probe_all(&checks, &mode).await;
    for r in &results {
        println!(
            "  {:<10} {:<10} attempts={} elapsed={:.2}s",
            r.check,
            if r.healthy { "healthy" } else { "UNHEALTHY" },
            r.attempts,
            r.elapsed.as_secs_f64()
        );
    }
    if results.iter().all(|r| r.healthy) {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    }
}
