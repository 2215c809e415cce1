//! Config CLI subcommands: show, defaults, validate.
//!
//! These commands only read configuration; nothing touches the target.

use super::{load_config_or_exit, EXIT_FAILURE, EXIT_SUCCESS};
use crate::config::{EffectiveConfig, HarnessConfig};

/// Print effective config as key-value pairs to stdout.
pub fn run_show(args: &[String]) -> i32 {
    match load_config_or_exit(args) {
        Ok(config) => {
            print_config(&config.effective_config());
            EXIT_SUCCESS
        }
        Err(code) => code,
    }
}

/// Print built-in defaults, ignoring the environment and any config file.
pub fn run_defaults() {
    print_config(&HarnessConfig::default().effective_config());
}

/// Validate configuration and warn about settings that make a run useless.
///
/// Returns 0 if valid, 1 if any warnings are found, 2 if it cannot load.
pub fn run_validate(args: &[String]) -> i32 {
    let config = match load_config_or_exit(args) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let warnings = warnings(&config);
    for warning in &warnings {
        eprintln!("WARNING: {}", warning);
    }
    if warnings.is_empty() {
        println!("Configuration is valid.");
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    }
}

/// Settings that load fine but leave scenarios skipped or meaningless.
pub fn warnings(config: &HarnessConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    let enabled: Vec<_> = config.scenarios.iter().filter(|s| s.enabled).collect();

    if enabled.is_empty() {
        warnings.push("no scenarios are enabled".to_string());
    }
    if config.process_pattern.is_none() && enabled.iter().any(|s| s.kind.requires_process()) {
        warnings.push(
            "RECOVERY_PROCESS_PATTERN is unset; process scenarios will be skipped".to_string(),
        );
    }
    if !config.database.is_configured() && enabled.iter().any(|s| s.kind.requires_database()) {
        warnings.push("RECOVERY_DB_NAME is unset; datastore scenarios will be skipped".to_string());
    }
    if config.app_restart_timeout.as_secs_f64() > config.rto_target_secs {
        warnings.push(format!(
            "APP_RESTART_TIMEOUT ({:.0}s) exceeds RTO_TARGET_SECONDS ({:.0}s); slow recoveries will be measured past the objective",
            config.app_restart_timeout.as_secs_f64(),
            config.rto_target_secs
        ));
    }
    if config.probe_interval > config.app_restart_timeout {
        warnings.push("RECOVERY_PROBE_INTERVAL exceeds APP_RESTART_TIMEOUT".to_string());
    }
    warnings
}

fn print_config(cfg: &EffectiveConfig) {
    println!("TEST_BASE_URL={}", cfg.base_url);
    println!("RECOVERY_HEALTH_PATH={}", cfg.health_path);
    println!("RECOVERY_ACCEPTED_STATUSES={}", cfg.accepted_statuses);
    println!("APP_RESTART_TIMEOUT={}", cfg.app_restart_timeout_secs);
    println!("RECOVERY_PROBE_INTERVAL={}", cfg.probe_interval_secs);
    println!("RTO_TARGET_SECONDS={}", cfg.rto_target_secs);
    println!("RPO_TARGET_SECONDS={}", cfg.rpo_target_secs);
    println!("RETRY_ATTEMPTS={}", cfg.retry_attempts);
    println!("RETRY_DELAY={}", cfg.retry_delay_secs);
    println!("CIRCUIT_BREAKER_FAILURE_THRESHOLD={}", cfg.breaker_failure_threshold);
    println!("CIRCUIT_BREAKER_TIMEOUT={}", cfg.breaker_timeout_secs);
    println!("RECOVERY_PROCESS_PATTERN={}", cfg.process_pattern);
    println!("RECOVERY_DATABASE={}", cfg.database);
    println!("RECOVERY_BACKUP_DIR={}", cfg.backup_dir);
    println!("RECOVERY_RESULTS_DIR={}", cfg.results_dir);
    println!("RECOVERY_CONCURRENT_WORKERS={}", cfg.concurrent_workers);
    println!("RECOVERY_REQUESTS_PER_WORKER={}", cfg.requests_per_worker);
    println!("SCENARIOS={}", cfg.scenarios);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults_warn_about_missing_targets() {
        let w = warnings(&HarnessConfig::default());
        assert!(w.iter().any(|m| m.contains("RECOVERY_PROCESS_PATTERN")));
        assert!(w.iter().any(|m| m.contains("RECOVERY_DB_NAME")));
    }

    #[test]
    fn test_fully_configured_has_no_warnings() {
        let mut config = HarnessConfig::default();
        config.process_pattern = Some("uvicorn".into());
        config.database.name = "app".into();
        assert!(warnings(&config).is_empty());
    }

    #[test]
    fn test_timeout_beyond_rto_warns() {
        let mut config = HarnessConfig::default();
        config.process_pattern = Some("uvicorn".into());
        config.database.name = "app".into();
        config.rto_target_secs = 10.0;
        config.app_restart_timeout = Duration::from_secs(60);
        let w = warnings(&config);
        assert_eq!(w.len(), 1);
        assert!(w[0].contains("RTO_TARGET_SECONDS"));
    }

    #[test]
    fn test_no_enabled_scenarios_warns() {
        let mut config = HarnessConfig::default();
        config.scenarios = config.scenarios.into_iter().map(|s| s.disabled()).collect();
        let w = warnings(&config);
        assert_eq!(w, vec!["no scenarios are enabled".to_string()]);
    }

    #[test]
    fn test_print_config_smoke() {
        print_config(&HarnessConfig::default().effective_config());
    }
}
