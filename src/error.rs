//! Error taxonomy for the recovery verification engine.
//!
//! Every failure a scenario can hit maps to one of these types. The
//! orchestrator converts them into findings; none of them abort a run.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::report::{ReportError, Severity};

/// The fault could not be induced.
#[derive(Debug, Error)]
pub enum InjectionError {
    #[error("Signal {signal} to pid {pid} failed: {reason}")]
    Signal {
        pid: u32,
        signal: &'static str,
        reason: String,
    },

    #[error("Process lookup failed: {0}")]
    ProcessLookup(String),

    #[error("Connection to {addr} failed: {reason}")]
    Connection { addr: String, reason: String },

    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("Datastore mutation failed: {0}")]
    Mutation(String),

    #[error("Fault injection not configured: {0}")]
    NotConfigured(&'static str),

    #[error("Fault had no effect on the target: {0}")]
    NoEffect(String),
}

/// The target never reported healthy within the configured window.
#[derive(Debug, Clone, Error)]
#[error("Target did not report healthy via {check} within {timeout_secs:.1}s")]
pub struct ProbeTimeoutError {
    pub check: String,
    pub timeout_secs: f64,
}

/// An external backup/restore binary was missing or failed.
#[derive(Debug, Error)]
pub enum ToolInvocationError {
    #[error("Tool not found: {tool}")]
    Missing { tool: String },

    #[error("{tool} exited with status {code:?}: {stderr}")]
    NonZeroExit {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Backup artifact {} is empty", .path.display())]
    EmptyArtifact { path: PathBuf },

    #[error("Backup artifact {} checksum mismatch: expected {expected}, got {actual}", .path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("I/O error while running {tool}: {source}")]
    Io {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

/// The restore ran but post-restore verification failed.
#[derive(Debug, Clone, Error)]
pub enum IntegrityError {
    #[error("Seeded record {key} missing from {table}")]
    MissingRecord { table: String, key: String },

    #[error("Seeded record {key} has value {actual:?}, expected {expected:?}")]
    ValueMismatch {
        key: String,
        expected: String,
        actual: Option<String>,
    },

    #[error("Row count in {table} is {actual}, expected {expected}")]
    RowCount {
        table: String,
        expected: i64,
        actual: i64,
    },

    #[error("Verification query failed: {0}")]
    Query(String),
}

/// A measured value exceeded its declared target.
///
/// Violations are expected outcomes of measurement, so they are recorded as
/// findings rather than propagated.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{metric} violated: measured {measured:.3}{unit} exceeds target {target:.3}{unit}")]
pub struct SlaViolation {
    pub metric: String,
    pub measured: f64,
    pub target: f64,
    pub unit: String,
}

/// Crate-level error that can surface at the orchestrator boundary.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Injection(#[from] InjectionError),

    #[error(transparent)]
    ProbeTimeout(#[from] ProbeTimeoutError),

    #[error(transparent)]
    ToolInvocation(#[from] ToolInvocationError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error(transparent)]
    Sla(#[from] SlaViolation),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Report(#[from] ReportError),
}

impl HarnessError {
    /// Severity of the finding this error becomes.
    pub fn severity(&self) -> Severity {
        match self {
            Self::Injection(_)
            | Self::ProbeTimeout(_)
            | Self::ToolInvocation(_)
            | Self::Integrity(_)
            | Self::Sla(_) => Severity::High,
            Self::Config(_) | Self::Report(_) => Severity::Medium,
        }
    }

    /// Short machine-friendly name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Injection(_) => "injection_error",
            Self::ProbeTimeout(_) => "probe_timeout",
            Self::ToolInvocation(_) => "tool_invocation_error",
            Self::Integrity(_) => "integrity_error",
            Self::Sla(_) => "sla_violation",
            Self::Config(_) => "config_error",
            Self::Report(_) => "report_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_distinct() {
        let injection: HarnessError = InjectionError::ProcessLookup("pgrep exited with Some(2)".into()).into();
        let timeout: HarnessError = ProbeTimeoutError {
            check: "http".into(),
            timeout_secs: 5.0,
        }
        .into();
        let integrity: HarnessError = IntegrityError::Query("boom".into()).into();
        assert_eq!(injection.kind(), "injection_error");
        assert_eq!(timeout.kind(), "probe_timeout");
        assert_eq!(integrity.kind(), "integrity_error");
    }

    #[test]
    fn test_scenario_errors_are_blocking() {
        let err: HarnessError = IntegrityError::MissingRecord {
            table: "users".into(),
            key: "seed-1".into(),
        }
        .into();
        assert_eq!(err.severity(), Severity::High);
        assert!(err.severity().is_blocking());

        let err: HarnessError = ReportError::Serialize("bad".into()).into();
        assert_eq!(err.severity(), Severity::Medium);
    }

    #[test]
    fn test_sla_violation_message() {
        let v = SlaViolation {
            metric: "rto".into(),
            measured: 12.5,
            target: 10.0,
            unit: "s".into(),
        };
        let msg = v.to_string();
        assert!(msg.contains("rto"));
        assert!(msg.contains("12.500s"));
        assert!(msg.contains("10.000s"));
    }
}
