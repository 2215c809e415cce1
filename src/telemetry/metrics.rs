//! Metric names and recording helpers over the `metrics` facade.
//!
//! Without an installed recorder these are no-ops.

pub const SCENARIO_TOTAL: &str = "recovery_scenario_total";
pub const RECOVERY_SECONDS: &str = "recovery_duration_seconds";
pub const SLA_VIOLATIONS_TOTAL: &str = "recovery_sla_violations_total";
pub const FINDINGS_TOTAL: &str = "recovery_findings_total";
pub const BREAKER_OPENED_TOTAL: &str = "circuit_breaker_opened_total";

/// Count a finished scenario by outcome.
pub fn record_scenario(kind: &str, status: &str) {
    ::metrics::counter!(SCENARIO_TOTAL, "kind" => kind.to_string(), "status" => status.to_string())
        .increment(1);
}

pub fn record_recovery(method: &str, seconds: f64) {
    ::metrics::histogram!(RECOVERY_SECONDS, "method" => method.to_string()).record(seconds);
}

pub fn record_sla_violation(metric: &str) {
    ::metrics::counter!(SLA_VIOLATIONS_TOTAL, "metric" => metric.to_string()).increment(1);
}

pub fn record_finding(severity: &str) {
    ::metrics::counter!(FINDINGS_TOTAL, "severity" => severity.to_string()).increment(1);
}

pub fn record_breaker_opened(name: &str) {
    ::metrics::counter!(BREAKER_OPENED_TOTAL, "breaker" => name.to_string()).increment(1);
}
