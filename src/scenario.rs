//! Scenario definitions and the built-in scenario catalog.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::report::Severity;

/// Which fault a scenario injects and how recovery is measured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioKind {
    /// Hard-kill the target process, measure time until healthy again.
    ProcessKill,
    /// SIGTERM the target, force-kill after `timeout_secs`, measure restart.
    GracefulShutdown { timeout_secs: u64 },
    /// Reset a datastore session, measure time until the datastore answers.
    ConnectionDrop,
    /// Issue a request with a tiny budget, then confirm the target still serves.
    RequestTimeout { budget_ms: u64 },
    /// Write an invalid value directly into the datastore; the integrity
    /// check must detect it.
    DataCorruption { mutation: String },
    /// Back up, destroy data, restore, verify. Judged against RPO and RTO.
    BackupRestore {
        #[serde(default)]
        destructive_statement: Option<String>,
    },
    /// Verify a circuit breaker opens against the faulted target and closes
    /// again after recovery.
    CircuitBreaker,
    /// Retry the health check through the configured retry policy after a kill.
    RetryRecovery,
}

impl ScenarioKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProcessKill => "process_kill",
            Self::GracefulShutdown { .. } => "graceful_shutdown",
            Self::ConnectionDrop => "connection_drop",
            Self::RequestTimeout { .. } => "request_timeout",
            Self::DataCorruption { .. } => "data_corruption",
            Self::BackupRestore { .. } => "backup_restore",
            Self::CircuitBreaker => "circuit_breaker",
            Self::RetryRecovery => "retry_recovery",
        }
    }

    /// Whether the scenario needs a configured datastore.
    pub fn requires_database(&self) -> bool {
        matches!(
            self,
            Self::ConnectionDrop | Self::DataCorruption { .. } | Self::BackupRestore { .. }
        )
    }

    /// Whether the scenario needs a locatable target process.
    pub fn requires_process(&self) -> bool {
        matches!(
            self,
            Self::ProcessKill
                | Self::GracefulShutdown { .. }
                | Self::CircuitBreaker
                | Self::RetryRecovery
        )
    }

    /// Graceful-shutdown wait, if this is a graceful scenario.
    pub fn shutdown_timeout(&self) -> Option<Duration> {
        match self {
            Self::GracefulShutdown { timeout_secs } => Some(Duration::from_secs(*timeout_secs)),
            _ => None,
        }
    }
}

fn enabled_by_default() -> bool {
    true
}

/// A single configured fault scenario. Read-only for the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub description: String,
    pub severity: Severity,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub kind: ScenarioKind,
}

impl Scenario {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        severity: Severity,
        kind: ScenarioKind,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            severity,
            enabled: true,
            kind,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Scenarios run when no catalog is configured.
pub fn default_catalog() -> Vec<Scenario> {
    vec![
        Scenario::new(
            "application_crash",
            "Application process is killed and must auto-restart",
            Severity::Critical,
            ScenarioKind::ProcessKill,
        ),
        Scenario::new(
            "graceful_restart",
            "Application receives SIGTERM and must come back after restart",
            Severity::High,
            ScenarioKind::GracefulShutdown { timeout_secs: 30 },
        ),
        Scenario::new(
            "database_connection_loss",
            "Datastore session is reset and connectivity must return",
            Severity::High,
            ScenarioKind::ConnectionDrop,
        ),
        Scenario::new(
            "request_timeout",
            "Slow request is abandoned and the application must keep serving",
            Severity::Medium,
            ScenarioKind::RequestTimeout { budget_ms: 1 },
        ),
        Scenario::new(
            "data_corruption_detection",
            "Seeded record is corrupted and verification must notice",
            Severity::Critical,
            ScenarioKind::DataCorruption {
                mutation: "UPDATE recovery_seed SET value = '__corrupted__' WHERE id = 'seed-1'"
                    .to_string(),
            },
        ),
        Scenario::new(
            "backup_restore",
            "Datastore is backed up, rows are lost, and the restore must recover them",
            Severity::Critical,
            ScenarioKind::BackupRestore {
                destructive_statement: Some("DELETE FROM recovery_seed".to_string()),
            },
        ),
        Scenario::new(
            "circuit_breaker",
            "Breaker opens against the crashed application and closes after recovery",
            Severity::Medium,
            ScenarioKind::CircuitBreaker,
        ),
        Scenario::new(
            "retry_recovery",
            "Retried health checks succeed once the application is back",
            Severity::Low,
            ScenarioKind::RetryRecovery,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_ids_are_unique() {
        let catalog = default_catalog();
        let mut ids: Vec<_> = catalog.iter().map(|s| s.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), catalog.len());
    }

    #[test]
    fn test_kind_serde_tagging() {
        let json = serde_json::to_string(&ScenarioKind::GracefulShutdown { timeout_secs: 5 }).unwrap();
        assert_eq!(json, r#"{"type":"graceful_shutdown","timeout_secs":5}"#);

        let parsed: ScenarioKind = serde_json::from_str(r#"{"type":"backup_restore"}"#).unwrap();
        assert_eq!(
            parsed,
            ScenarioKind::BackupRestore {
                destructive_statement: None
            }
        );
    }

    #[test]
    fn test_requirements() {
        assert!(ScenarioKind::ProcessKill.requires_process());
        assert!(!ScenarioKind::ProcessKill.requires_database());
        assert!(ScenarioKind::ConnectionDrop.requires_database());
        assert!(!ScenarioKind::RequestTimeout { budget_ms: 1 }.requires_process());
        assert_eq!(
            ScenarioKind::GracefulShutdown { timeout_secs: 3 }.shutdown_timeout(),
            Some(Duration::from_secs(3))
        );
    }
}
