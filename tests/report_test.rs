//! Tests for run aggregation and report rendering.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use recovery_core::probe::RecoveryMeasurement;
use recovery_core::report::{
    render_summary, Finding, ResultAggregator, ScenarioOutcome, ScenarioStatus, Severity,
};
use recovery_core::sla::{SlaEvaluator, SlaTarget, SlaVerdict};

fn outcome(id: &str, recovered: Option<bool>, verdicts: Vec<SlaVerdict>, findings: Vec<Finding>) -> ScenarioOutcome {
    let measurement = recovered.map(|ok| RecoveryMeasurement::new(id, Utc::now(), Duration::from_millis(2500), ok, "http"));
    let status = match measurement {
        None => ScenarioStatus::Skipped,
        Some(_) => ScenarioOutcome::judge(&measurement, &verdicts, &findings),
    };
    ScenarioOutcome {
        scenario_id: id.to_string(),
        kind: "process_kill".to_string(),
        description: String::new(),
        status,
        started_at: Utc::now(),
        measurement,
        verdicts,
        findings: findings.into_iter().map(|f| f.for_scenario(id)).collect(),
        details: BTreeMap::new(),
    }
}

fn mixed_run() -> ResultAggregator {
    let mut agg = ResultAggregator::new("http://localhost:8000");
    agg.record(outcome(
        "fast",
        Some(true),
        vec![SlaEvaluator::evaluate(2.5, &SlaTarget::rto(10.0))],
        vec![],
    ));
    agg.record(outcome(
        "slow",
        Some(true),
        vec![SlaEvaluator::evaluate(12.0, &SlaTarget::rto(10.0))],
        vec![Finding::new(Severity::High, "RTO target exceeded", "12s > 10s")],
    ));
    agg.record(outcome(
        "skipped",
        None,
        vec![],
        vec![Finding::new(Severity::Low, "Scenario skipped", "no datastore")],
    ));
    agg
}

#[test]
fn test_mixed_run_fails_with_counts() {
    let report = mixed_run().report();

    assert!(!report.passed);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.sla_violations, 1);
    assert_eq!(report.count_status(ScenarioStatus::Passed), 1);
    assert_eq!(report.count_status(ScenarioStatus::Failed), 1);
    assert_eq!(report.count_status(ScenarioStatus::Skipped), 1);
    // Skipped scenarios leave no measurement.
    assert_eq!(report.measurements.len(), 2);
    assert_eq!(report.counts.high, 1);
    assert_eq!(report.counts.low, 1);
    assert_eq!(report.counts.total(), 2);
}

#[test]
fn test_recorded_outcomes_are_not_altered_by_later_findings() {
    let mut agg = mixed_run();
    let before = agg.outcomes().to_vec();
    agg.add_finding(Finding::new(Severity::Medium, "Report could not be written", "disk full"));

    assert_eq!(agg.outcomes(), before.as_slice());
    assert_eq!(agg.findings().len(), 3);
    assert_eq!(agg.report().counts.medium, 1);
}

#[test]
fn test_only_low_findings_still_pass() {
    let mut agg = ResultAggregator::new("http://localhost:8000");
    agg.record(outcome(
        "retry",
        Some(true),
        vec![SlaEvaluator::evaluate(4.0, &SlaTarget::rto(10.0))],
        vec![Finding::new(Severity::Low, "Retry budget exhausted before recovery", "3 attempts")],
    ));
    let report = agg.report();
    assert!(report.passed);
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn test_summary_lists_verdicts_and_blocking_findings() {
    let text = render_summary(&mixed_run().report());

    assert!(text.contains("Target: http://localhost:8000"));
    assert!(text.contains("PASS rto: 2.50s (target 10.00s)"));
    assert!(text.contains("FAIL rto: 12.00s (target 10.00s)"));
    assert!(text.contains("[HIGH] RTO target exceeded (slow)"));
    // Low findings are counted but not listed.
    assert!(!text.contains("Scenario skipped"));
    assert!(text.contains("Findings: 0 critical, 1 high, 0 medium, 1 low, 0 info"));
    assert!(text.contains("SLA violations: 1"));
    assert!(text.ends_with("Result: FAIL\n"));
}

#[test]
fn test_report_json_shape() {
    let report = mixed_run().report();
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["passed"], false);
    assert_eq!(json["sla_violations"], 1);
    assert_eq!(json["counts"]["high"], 1);
    assert_eq!(json["scenarios"][1]["status"], "failed");
    assert_eq!(json["scenarios"][1]["verdicts"][0]["status"], "FAIL");
    assert_eq!(json["scenarios"][2]["measurement"], serde_json::Value::Null);
    assert_eq!(json["findings"][0]["severity"], "high");
    assert_eq!(json["findings"][0]["scenario_id"], "slow");
}
