//! Harness configuration loading.
//!
//! Values come from three layers: built-in defaults, an optional TOML file
//! (`RECOVERY_CONFIG_FILE`), then environment variables. Invalid environment
//! values fall back to the lower layer without crashing. The resulting
//! [`HarnessConfig`] is immutable and handed to every component at
//! construction; nothing else in the crate reads the environment.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `TEST_BASE_URL` | `http://localhost:8000` | Target base URL |
//! | `APP_RESTART_TIMEOUT` | 60 | Recovery probe timeout (secs) |
//! | `RTO_TARGET_SECONDS` | 3600 | Recovery time objective |
//! | `RPO_TARGET_SECONDS` | 86400 | Recovery point objective |
//! | `RETRY_ATTEMPTS` | 3 | Max attempts per retried call |
//! | `RETRY_DELAY` | 1 | Delay between attempts (secs) |
//! | `CIRCUIT_BREAKER_FAILURE_THRESHOLD` | 5 | Failures before opening |
//! | `CIRCUIT_BREAKER_TIMEOUT` | 60 | Open-state cooldown (secs) |
//! | `RECOVERY_HEALTH_PATH` | `/health` | Health endpoint path |
//! | `RECOVERY_PROBE_INTERVAL` | 1 | Probe interval (secs) |
//! | `RECOVERY_ACCEPTED_STATUSES` | `200,302,401` | Healthy HTTP statuses |
//! | `RECOVERY_PROCESS_PATTERN` | (empty) | `pgrep -f` pattern for the target |
//! | `RECOVERY_DB_HOST` | `localhost` | Datastore host |
//! | `RECOVERY_DB_PORT` | 3306 | Datastore port |
//! | `RECOVERY_DB_USER` | `root` | Datastore user |
//! | `RECOVERY_DB_PASSWORD` | (empty) | Datastore password |
//! | `RECOVERY_DB_NAME` | (empty) | Database name; empty disables DB features |
//! | `RECOVERY_BACKUP_DIR` | `backups` | Backup artifact directory |
//! | `RECOVERY_RESULTS_DIR` | `results` | Report output directory |
//! | `RECOVERY_CONCURRENT_WORKERS` | 10 | Post-recovery workers (1..=20) |
//! | `RECOVERY_REQUESTS_PER_WORKER` | 5 | Requests per worker |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::mysql::MySqlConnectOptions;
use thiserror::Error;

use crate::scenario::{default_catalog, Scenario};

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Retry settings for the harness's own flaky calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub attempts: u32,
    pub delay: Duration,
}

/// Circuit breaker settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Datastore connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: String::new(),
            name: String::new(),
        }
    }
}

impl DatabaseConfig {
    /// A database name is required before any DB feature is enabled.
    pub fn is_configured(&self) -> bool {
        !self.name.is_empty()
    }

    /// Connection options for the `sqlx` MySQL driver. Credentials are set
    /// field by field, so reserved URL characters in them are kept as-is.
    pub fn connect_options(&self) -> MySqlConnectOptions {
        let options = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(&self.name);
        if self.password.is_empty() {
            options
        } else {
            options.password(&self.password)
        }
    }

    /// `host:port` for raw TCP operations.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// An external program plus its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Backup/restore tooling settings.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupConfig {
    pub backup_dir: PathBuf,
    pub extension: String,
    pub dump: ToolCommand,
    pub restore: ToolCommand,
}

impl BackupConfig {
    /// `mysqldump`/`mysql` invocations derived from the datastore settings.
    ///
    /// The password travels through `MYSQL_PWD`, never argv.
    pub fn for_database(db: &DatabaseConfig, backup_dir: PathBuf) -> Self {
        let port = db.port.to_string();
        let common = [
            "--host",
            db.host.as_str(),
            "--port",
            port.as_str(),
            "--user",
            db.user.as_str(),
        ];

        let mut dump_args: Vec<&str> = vec!["--single-transaction", "--routines"];
        dump_args.extend_from_slice(&common);
        dump_args.push(db.name.as_str());

        let mut restore_args: Vec<&str> = common.to_vec();
        restore_args.push(db.name.as_str());

        Self {
            backup_dir,
            extension: "sql".to_string(),
            dump: ToolCommand::new("mysqldump", &dump_args),
            restore: ToolCommand::new("mysql", &restore_args),
        }
    }
}

/// Seeded record used to verify a restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrityConfig {
    pub table: String,
    pub key_column: String,
    pub value_column: String,
    pub seed_key: String,
    pub seed_value: String,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            table: "recovery_seed".to_string(),
            key_column: "id".to_string(),
            value_column: "value".to_string(),
            seed_key: "seed-1".to_string(),
            seed_value: "known-good".to_string(),
        }
    }
}

/// Post-recovery concurrent request sub-test.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrencyConfig {
    pub workers: usize,
    pub requests_per_worker: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            requests_per_worker: 5,
        }
    }
}

/// Immutable harness configuration.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub base_url: String,
    pub health_path: String,
    pub accepted_statuses: Vec<u16>,
    pub app_restart_timeout: Duration,
    pub probe_interval: Duration,
    pub rto_target_secs: f64,
    pub rpo_target_secs: f64,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub process_pattern: Option<String>,
    pub database: DatabaseConfig,
    pub integrity: IntegrityConfig,
    pub backup: BackupConfig,
    pub results_dir: PathBuf,
    pub concurrency: ConcurrencyConfig,
    pub scenarios: Vec<Scenario>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        let database = DatabaseConfig::default();
        let backup = BackupConfig::for_database(&database, PathBuf::from("backups"));
        Self {
            base_url: "http://localhost:8000".to_string(),
            health_path: "/health".to_string(),
            accepted_statuses: vec![200, 302, 401],
            app_restart_timeout: Duration::from_secs(60),
            probe_interval: Duration::from_secs(1),
            rto_target_secs: 3600.0,
            rpo_target_secs: 86400.0,
            retry: RetryConfig {
                attempts: 3,
                delay: Duration::from_secs(1),
            },
            circuit_breaker: CircuitBreakerConfig::default(),
            process_pattern: None,
            database,
            integrity: IntegrityConfig::default(),
            backup,
            results_dir: PathBuf::from("results"),
            concurrency: ConcurrencyConfig::default(),
            scenarios: default_catalog(),
        }
    }
}

impl HarnessConfig {
    /// Full URL of the health endpoint.
    pub fn health_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if self.health_path.starts_with('/') {
            format!("{}{}", base, self.health_path)
        } else {
            format!("{}/{}", base, self.health_path)
        }
    }

    /// Reject configurations that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "TEST_BASE_URL must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }
        if self.accepted_statuses.is_empty() {
            return Err(ConfigError::Invalid(
                "RECOVERY_ACCEPTED_STATUSES must list at least one status".to_string(),
            ));
        }
        let valid_target = |t: f64| t.is_finite() && t >= 0.0;
        if !valid_target(self.rto_target_secs) || !valid_target(self.rpo_target_secs) {
            return Err(ConfigError::Invalid(
                "SLA targets must be finite and non-negative".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for scenario in &self.scenarios {
            if !seen.insert(scenario.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate scenario id {:?}",
                    scenario.id
                )));
            }
        }
        Ok(())
    }

    /// Return a printable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            base_url: self.base_url.clone(),
            health_path: self.health_path.clone(),
            accepted_statuses: self
                .accepted_statuses
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(","),
            app_restart_timeout_secs: self.app_restart_timeout.as_secs_f64(),
            probe_interval_secs: self.probe_interval.as_secs_f64(),
            rto_target_secs: self.rto_target_secs,
            rpo_target_secs: self.rpo_target_secs,
            retry_attempts: self.retry.attempts,
            retry_delay_secs: self.retry.delay.as_secs_f64(),
            breaker_failure_threshold: self.circuit_breaker.failure_threshold,
            breaker_timeout_secs: self.circuit_breaker.timeout.as_secs_f64(),
            process_pattern: self.process_pattern.clone().unwrap_or_default(),
            database: if self.database.is_configured() {
                format!("{}/{}", self.database.address(), self.database.name)
            } else {
                String::new()
            },
            backup_dir: self.backup.backup_dir.display().to_string(),
            results_dir: self.results_dir.display().to_string(),
            concurrent_workers: self.concurrency.workers,
            requests_per_worker: self.concurrency.requests_per_worker,
            scenarios: self.scenarios.len(),
        }
    }
}

/// Effective configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub base_url: String,
    pub health_path: String,
    pub accepted_statuses: String,
    pub app_restart_timeout_secs: f64,
    pub probe_interval_secs: f64,
    pub rto_target_secs: f64,
    pub rpo_target_secs: f64,
    pub retry_attempts: u32,
    pub retry_delay_secs: f64,
    pub breaker_failure_threshold: u32,
    pub breaker_timeout_secs: f64,
    pub process_pattern: String,
    pub database: String,
    pub backup_dir: String,
    pub results_dir: String,
    pub concurrent_workers: usize,
    pub requests_per_worker: usize,
    pub scenarios: usize,
}

/// On-disk TOML layout. Every field is optional and overrides the default.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    base_url: Option<String>,
    health_path: Option<String>,
    accepted_statuses: Option<Vec<u16>>,
    app_restart_timeout_secs: Option<f64>,
    probe_interval_secs: Option<f64>,
    rto_target_secs: Option<f64>,
    rpo_target_secs: Option<f64>,
    retry_attempts: Option<u32>,
    retry_delay_secs: Option<f64>,
    breaker_failure_threshold: Option<u32>,
    breaker_timeout_secs: Option<f64>,
    process_pattern: Option<String>,
    backup_dir: Option<PathBuf>,
    results_dir: Option<PathBuf>,
    concurrent_workers: Option<usize>,
    requests_per_worker: Option<usize>,
    database: Option<DatabaseConfig>,
    integrity: Option<IntegrityConfig>,
    dump: Option<ToolCommand>,
    restore: Option<ToolCommand>,
    scenarios: Option<Vec<Scenario>>,
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a `u32` env var, returning `default` on missing or invalid.
fn parse_u32(key: &str, default: u32) -> u32 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u32>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a non-negative `f64` env var, returning `default` on missing or invalid.
fn parse_f64(key: &str, default: f64) -> f64 {
    match std::env::var(key) {
        Ok(val) => match val.trim().parse::<f64>() {
            Ok(v) if v.is_finite() && v >= 0.0 => v,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Parse a comma-separated list of HTTP statuses.
fn parse_statuses(key: &str, default: Vec<u16>) -> Vec<u16> {
    let Ok(raw) = std::env::var(key) else {
        return default;
    };
    let parsed: Option<Vec<u16>> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u16>().ok().filter(|code| (100..600).contains(code)))
        .collect();
    match parsed {
        Some(list) if !list.is_empty() => list,
        _ => default,
    }
}

/// Parse a seconds env var that must also fit a `Duration`.
fn parse_secs(key: &str, default: f64) -> f64 {
    let value = parse_f64(key, default);
    if Duration::try_from_secs_f64(value).is_ok() {
        value
    } else {
        default
    }
}

/// A seconds value from the config file: finite, non-negative and within
/// `Duration` range.
fn file_secs(key: &str, value: Option<f64>, default: f64) -> Result<f64, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) if v >= 0.0 && Duration::try_from_secs_f64(v).is_ok() => Ok(v),
        Some(v) => Err(ConfigError::Invalid(format!(
            "{} must be a finite, non-negative number of seconds, got {}",
            key, v
        ))),
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

/// Read and parse a TOML configuration file.
fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Load configuration from the environment, layering in the TOML file named
/// by `RECOVERY_CONFIG_FILE` when set.
pub fn load() -> Result<HarnessConfig, ConfigError> {
    let file = match env_string("RECOVERY_CONFIG_FILE") {
        Some(path) => read_file(Path::new(&path))?,
        None => FileConfig::default(),
    };
    build(file)
}

/// Load configuration from an explicit TOML file, still honouring env overrides.
pub fn load_from_file(path: &Path) -> Result<HarnessConfig, ConfigError> {
    build(read_file(path)?)
}

fn build(file: FileConfig) -> Result<HarnessConfig, ConfigError> {
    let defaults = HarnessConfig::default();

    let base_url = env_string("TEST_BASE_URL")
        .or(file.base_url)
        .unwrap_or(defaults.base_url);
    let health_path = env_string("RECOVERY_HEALTH_PATH")
        .or(file.health_path)
        .unwrap_or(defaults.health_path);
    let accepted_statuses = parse_statuses(
        "RECOVERY_ACCEPTED_STATUSES",
        file.accepted_statuses
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.accepted_statuses),
    );

    let restart_timeout = parse_secs(
        "APP_RESTART_TIMEOUT",
        file_secs(
            "app_restart_timeout_secs",
            file.app_restart_timeout_secs,
            defaults.app_restart_timeout.as_secs_f64(),
        )?,
    )
    .max(1.0); // floor: 1s
    let probe_interval = parse_secs(
        "RECOVERY_PROBE_INTERVAL",
        file_secs(
            "probe_interval_secs",
            file.probe_interval_secs,
            defaults.probe_interval.as_secs_f64(),
        )?,
    )
    .max(1.0); // floor: 1s

    let rto_target_secs = parse_f64(
        "RTO_TARGET_SECONDS",
        file_secs("rto_target_secs", file.rto_target_secs, defaults.rto_target_secs)?,
    );
    let rpo_target_secs = parse_f64(
        "RPO_TARGET_SECONDS",
        file_secs("rpo_target_secs", file.rpo_target_secs, defaults.rpo_target_secs)?,
    );

    let retry = RetryConfig {
        attempts: parse_u32(
            "RETRY_ATTEMPTS",
            file.retry_attempts.unwrap_or(defaults.retry.attempts),
        )
        .max(1),
        delay: secs(parse_secs(
            "RETRY_DELAY",
            file_secs(
                "retry_delay_secs",
                file.retry_delay_secs,
                defaults.retry.delay.as_secs_f64(),
            )?,
        )),
    };

    let circuit_breaker = CircuitBreakerConfig {
        failure_threshold: parse_u32(
            "CIRCUIT_BREAKER_FAILURE_THRESHOLD",
            file.breaker_failure_threshold
                .unwrap_or(defaults.circuit_breaker.failure_threshold),
        )
        .max(1),
        timeout: secs(parse_secs(
            "CIRCUIT_BREAKER_TIMEOUT",
            file_secs(
                "breaker_timeout_secs",
                file.breaker_timeout_secs,
                defaults.circuit_breaker.timeout.as_secs_f64(),
            )?,
        )),
    };

    let process_pattern = env_string("RECOVERY_PROCESS_PATTERN").or(file.process_pattern);

    let file_db = file.database.unwrap_or_default();
    let database = DatabaseConfig {
        host: env_string("RECOVERY_DB_HOST").unwrap_or(file_db.host),
        port: parse_u32("RECOVERY_DB_PORT", u32::from(file_db.port))
            .try_into()
            .unwrap_or(file_db.port),
        user: env_string("RECOVERY_DB_USER").unwrap_or(file_db.user),
        password: env_string("RECOVERY_DB_PASSWORD").unwrap_or(file_db.password),
        name: env_string("RECOVERY_DB_NAME").unwrap_or(file_db.name),
    };

    let backup_dir = env_string("RECOVERY_BACKUP_DIR")
        .map(PathBuf::from)
        .or(file.backup_dir)
        .unwrap_or(defaults.backup.backup_dir);
    let mut backup = BackupConfig::for_database(&database, backup_dir);
    if let Some(dump) = file.dump {
        backup.dump = dump;
    }
    if let Some(restore) = file.restore {
        backup.restore = restore;
    }

    let results_dir = env_string("RECOVERY_RESULTS_DIR")
        .map(PathBuf::from)
        .or(file.results_dir)
        .unwrap_or(defaults.results_dir);

    let concurrency = ConcurrencyConfig {
        workers: parse_usize(
            "RECOVERY_CONCURRENT_WORKERS",
            file.concurrent_workers
                .unwrap_or(defaults.concurrency.workers),
        )
        .clamp(1, 20),
        requests_per_worker: parse_usize(
            "RECOVERY_REQUESTS_PER_WORKER",
            file.requests_per_worker
                .unwrap_or(defaults.concurrency.requests_per_worker),
        )
        .max(1),
    };

    Ok(HarnessConfig {
        base_url,
        health_path,
        accepted_statuses,
        app_restart_timeout: secs(restart_timeout),
        probe_interval: secs(probe_interval),
        rto_target_secs,
        rpo_target_secs,
        retry,
        circuit_breaker,
        process_pattern,
        database,
        integrity: file.integrity.unwrap_or_default(),
        backup,
        results_dir,
        concurrency,
        scenarios: file.scenarios.unwrap_or(defaults.scenarios),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    // Serialize env-mutating tests to avoid cross-test pollution.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "TEST_BASE_URL",
        "APP_RESTART_TIMEOUT",
        "RTO_TARGET_SECONDS",
        "RPO_TARGET_SECONDS",
        "RETRY_ATTEMPTS",
        "RETRY_DELAY",
        "CIRCUIT_BREAKER_FAILURE_THRESHOLD",
        "CIRCUIT_BREAKER_TIMEOUT",
        "RECOVERY_HEALTH_PATH",
        "RECOVERY_PROBE_INTERVAL",
        "RECOVERY_ACCEPTED_STATUSES",
        "RECOVERY_PROCESS_PATTERN",
        "RECOVERY_DB_HOST",
        "RECOVERY_DB_PORT",
        "RECOVERY_DB_USER",
        "RECOVERY_DB_PASSWORD",
        "RECOVERY_DB_NAME",
        "RECOVERY_BACKUP_DIR",
        "RECOVERY_RESULTS_DIR",
        "RECOVERY_CONCURRENT_WORKERS",
        "RECOVERY_REQUESTS_PER_WORKER",
        "RECOVERY_CONFIG_FILE",
    ];

    fn clear_env_vars() {
        for k in ENV_KEYS {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn test_defaults_are_sensible() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let cfg = load().unwrap();
        assert_eq!(cfg.base_url, "http://localhost:8000");
        assert_eq!(cfg.app_restart_timeout, Duration::from_secs(60));
        assert_eq!(cfg.rto_target_secs, 3600.0);
        assert_eq!(cfg.rpo_target_secs, 86400.0);
        assert_eq!(cfg.retry.attempts, 3);
        assert_eq!(cfg.retry.delay, Duration::from_secs(1));
        assert_eq!(cfg.circuit_breaker.failure_threshold, 5);
        assert_eq!(cfg.circuit_breaker.timeout, Duration::from_secs(60));
        assert_eq!(cfg.accepted_statuses, vec![200, 302, 401]);
        assert_eq!(cfg.concurrency.workers, 10);
        assert!(!cfg.database.is_configured());
        assert!(!cfg.scenarios.is_empty());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_env_vars_override_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("TEST_BASE_URL", "http://app.test:9000");
        std::env::set_var("RTO_TARGET_SECONDS", "120");
        std::env::set_var("RETRY_ATTEMPTS", "7");
        std::env::set_var("RETRY_DELAY", "0.25");
        std::env::set_var("CIRCUIT_BREAKER_TIMEOUT", "0");
        std::env::set_var("RECOVERY_ACCEPTED_STATUSES", "200, 204");
        let cfg = load().unwrap();
        assert_eq!(cfg.base_url, "http://app.test:9000");
        assert_eq!(cfg.rto_target_secs, 120.0);
        assert_eq!(cfg.retry.attempts, 7);
        assert_eq!(cfg.retry.delay, Duration::from_millis(250));
        assert_eq!(cfg.circuit_breaker.timeout, Duration::ZERO);
        assert_eq!(cfg.accepted_statuses, vec![200, 204]);
        clear_env_vars();
    }

    #[test]
    fn test_invalid_env_falls_back_to_default() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("RETRY_ATTEMPTS", "lots");
        std::env::set_var("RTO_TARGET_SECONDS", "-5");
        std::env::set_var("RECOVERY_ACCEPTED_STATUSES", "200,abc");
        let cfg = load().unwrap();
        assert_eq!(cfg.retry.attempts, 3);
        assert_eq!(cfg.rto_target_secs, 3600.0);
        assert_eq!(cfg.accepted_statuses, vec![200, 302, 401]);
        clear_env_vars();
    }

    #[test]
    fn test_floors_and_clamps() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("RETRY_ATTEMPTS", "0");
        std::env::set_var("CIRCUIT_BREAKER_FAILURE_THRESHOLD", "0");
        std::env::set_var("RECOVERY_CONCURRENT_WORKERS", "500");
        std::env::set_var("APP_RESTART_TIMEOUT", "0");
        let cfg = load().unwrap();
        assert_eq!(cfg.retry.attempts, 1);
        assert_eq!(cfg.circuit_breaker.failure_threshold, 1);
        assert_eq!(cfg.concurrency.workers, 20);
        assert_eq!(cfg.app_restart_timeout, Duration::from_secs(1));
        clear_env_vars();
    }

    #[test]
    fn test_file_layer_under_env_layer() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
base_url = "http://from-file:8080"
rto_target_secs = 30
retry_attempts = 4

[database]
name = "shop"
port = 3307

[[scenarios]]
id = "crash"
description = "kill it"
severity = "high"
kind = {{ type = "process_kill" }}
"#
        )
        .unwrap();

        std::env::set_var("RTO_TARGET_SECONDS", "45");
        let cfg = load_from_file(file.path()).unwrap();
        assert_eq!(cfg.base_url, "http://from-file:8080");
        assert_eq!(cfg.rto_target_secs, 45.0);
        assert_eq!(cfg.retry.attempts, 4);
        assert_eq!(cfg.database.name, "shop");
        assert_eq!(cfg.database.port, 3307);
        assert_eq!(cfg.scenarios.len(), 1);
        assert_eq!(cfg.scenarios[0].id, "crash");
        assert!(cfg.scenarios[0].enabled);
        assert!(cfg.backup.dump.args.contains(&"shop".to_string()));
        clear_env_vars();
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "base_url = [not toml").unwrap();
        let err = load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_health_url_joins_cleanly() {
        let cfg = HarnessConfig {
            base_url: "http://localhost:8000/".to_string(),
            health_path: "health".to_string(),
            ..Default::default()
        };
        assert_eq!(cfg.health_url(), "http://localhost:8000/health");
    }

    #[test]
    fn test_validate_rejects_duplicate_scenarios() {
        let mut cfg = HarnessConfig::default();
        let dup = cfg.scenarios[0].clone();
        cfg.scenarios.push(dup);
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_database_password_never_in_tool_args() {
        let db = DatabaseConfig {
            password: "s3cret".to_string(),
            name: "shop".to_string(),
            ..Default::default()
        };
        let backup = BackupConfig::for_database(&db, PathBuf::from("b"));
        assert!(!backup.dump.args.iter().any(|a| a.contains("s3cret")));
        assert!(!backup.restore.args.iter().any(|a| a.contains("s3cret")));
    }

    #[test]
    fn test_connect_options_keep_reserved_characters() {
        let db = DatabaseConfig {
            host: "db.internal".to_string(),
            password: "p@ss/w#rd".to_string(),
            name: "shop".to_string(),
            ..Default::default()
        };
        let options = format!("{:?}", db.connect_options());
        assert!(options.contains(r#"host: "db.internal""#), "{}", options);
        assert!(options.contains(r#"password: Some("p@ss/w#rd")"#), "{}", options);
        assert!(options.contains(r#"database: Some("shop")"#), "{}", options);
    }

    fn file_with(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", body).unwrap();
        file
    }

    #[test]
    fn test_non_finite_file_durations_are_rejected() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        for body in [
            "breaker_timeout_secs = inf",
            "breaker_timeout_secs = 1e300",
            "app_restart_timeout_secs = inf",
            "probe_interval_secs = nan",
            "retry_delay_secs = -1.0",
        ] {
            let file = file_with(body);
            let err = load_from_file(file.path()).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{}: {:?}", body, err);
        }
    }

    #[test]
    fn test_non_finite_file_targets_are_rejected() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let file = file_with("rto_target_secs = nan");
        assert!(matches!(load_from_file(file.path()), Err(ConfigError::Invalid(_))));
        let file = file_with("rpo_target_secs = inf");
        assert!(matches!(load_from_file(file.path()), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_non_finite_targets() {
        let cfg = HarnessConfig {
            rto_target_secs: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
        let cfg = HarnessConfig {
            rpo_target_secs: f64::INFINITY,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_oversized_env_duration_falls_back() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("CIRCUIT_BREAKER_TIMEOUT", "1e300");
        std::env::set_var("RECOVERY_PROBE_INTERVAL", "0.2");
        let cfg = load().unwrap();
        assert_eq!(cfg.circuit_breaker.timeout, Duration::from_secs(60));
        assert_eq!(cfg.probe_interval, Duration::from_secs(1));
        clear_env_vars();
    }
}
