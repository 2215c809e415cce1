//! Append-only collection of everything a run produced.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::finding::{Finding, SeverityCounts};
use crate::probe::RecoveryMeasurement;
use crate::sla::SlaVerdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioStatus {
    Passed,
    Failed,
    Skipped,
}

impl ScenarioStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.as_str().to_uppercase())
    }
}

/// Everything recorded for one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub scenario_id: String,
    pub kind: String,
    pub description: String,
    pub status: ScenarioStatus,
    pub started_at: DateTime<Utc>,
    pub measurement: Option<RecoveryMeasurement>,
    pub verdicts: Vec<SlaVerdict>,
    pub findings: Vec<Finding>,
    pub details: BTreeMap<String, String>,
}

impl ScenarioOutcome {
    /// Derive the status: passed only when recovery succeeded, every verdict
    /// passed and no blocking finding was raised.
    pub fn judge(
        measurement: &Option<RecoveryMeasurement>,
        verdicts: &[SlaVerdict],
        findings: &[Finding],
    ) -> ScenarioStatus {
        let recovered = measurement.as_ref().map(|m| m.success).unwrap_or(false);
        let blocking = findings.iter().any(|f| f.severity.is_blocking());
        if recovered && verdicts.iter().all(SlaVerdict::passed) && !blocking {
            ScenarioStatus::Passed
        } else {
            ScenarioStatus::Failed
        }
    }

    pub fn sla_violations(&self) -> usize {
        self.verdicts.iter().filter(|v| !v.passed()).count()
    }
}

/// Consolidated result of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub run_id: Uuid,
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub scenarios: Vec<ScenarioOutcome>,
    pub measurements: Vec<RecoveryMeasurement>,
    pub findings: Vec<Finding>,
    pub counts: SeverityCounts,
    pub sla_violations: usize,
    pub passed: bool,
}

impl RecoveryReport {
    /// 0 when everything passed, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.passed {
            0
        } else {
            1
        }
    }

    pub fn outcome(&self, scenario_id: &str) -> Option<&ScenarioOutcome> {
        self.scenarios.iter().find(|s| s.scenario_id == scenario_id)
    }

    pub fn count_status(&self, status: ScenarioStatus) -> usize {
        self.scenarios.iter().filter(|s| s.status == status).count()
    }
}

/// Collects outcomes and findings as scenarios complete. Append-only; a
/// recorded entry is never altered.
#[derive(Debug)]
pub struct ResultAggregator {
    run_id: Uuid,
    target: String,
    started_at: DateTime<Utc>,
    outcomes: Vec<ScenarioOutcome>,
    findings: Vec<Finding>,
}

impl ResultAggregator {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            target: target.into(),
            started_at: Utc::now(),
            outcomes: Vec::new(),
            findings: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Record a scenario outcome; its findings join the run-wide list.
    pub fn record(&mut self, outcome: ScenarioOutcome) {
        self.findings.extend(outcome.findings.iter().cloned());
        self.outcomes.push(outcome);
    }

    /// Record a finding not tied to a scenario outcome.
    pub fn add_finding(&mut self, finding: Finding) {
        self.findings.push(finding);
    }

    pub fn outcomes(&self) -> &[ScenarioOutcome] {
        &self.outcomes
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn measurements(&self) -> Vec<RecoveryMeasurement> {
        self.outcomes
            .iter()
            .filter_map(|o| o.measurement.clone())
            .collect()
    }

    pub fn severity_counts(&self) -> SeverityCounts {
        SeverityCounts::from_findings(&self.findings)
    }

    pub fn sla_violations(&self) -> usize {
        self.outcomes.iter().map(ScenarioOutcome::sla_violations).sum()
    }

    pub fn all_passed(&self) -> bool {
        self.severity_counts().blocking() == 0
            && self.sla_violations() == 0
            && self
                .outcomes
                .iter()
                .all(|o| o.status != ScenarioStatus::Failed)
    }

    /// Snapshot the run into a report.
    pub fn report(&self) -> RecoveryReport {
        RecoveryReport {
            run_id: self.run_id,
            target: self.target.clone(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            scenarios: self.outcomes.clone(),
            measurements: self.measurements(),
            findings: self.findings.clone(),
            counts: self.severity_counts(),
            sla_violations: self.sla_violations(),
            passed: self.all_passed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Severity;
    use crate::sla::{SlaEvaluator, SlaTarget};
    use std::time::Duration;

    fn outcome(id: &str, success: bool, verdicts: Vec<SlaVerdict>, findings: Vec<Finding>) -> ScenarioOutcome {
        let measurement = Some(RecoveryMeasurement::new(
            id,
            Utc::now(),
            Duration::from_secs(3),
            success,
            "http",
        ));
        let status = ScenarioOutcome::judge(&measurement, &verdicts, &findings);
        ScenarioOutcome {
            scenario_id: id.into(),
            kind: "process_kill".into(),
            description: String::new(),
            status,
            started_at: Utc::now(),
            measurement,
            verdicts,
            findings,
            details: BTreeMap::new(),
        }
    }

    #[test]
    fn test_clean_run_passes() {
        let mut agg = ResultAggregator::new("http://app");
        let verdict = SlaEvaluator::evaluate(3.0, &SlaTarget::rto(10.0));
        agg.record(outcome("a", true, vec![verdict], vec![]));
        let report = agg.report();
        assert!(report.passed);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.measurements.len(), 1);
        assert_eq!(report.count_status(ScenarioStatus::Passed), 1);
    }

    #[test]
    fn test_sla_violation_fails_run() {
        let mut agg = ResultAggregator::new("http://app");
        let verdict = SlaEvaluator::evaluate(30.0, &SlaTarget::rto(10.0));
        agg.record(outcome("a", true, vec![verdict], vec![]));
        let report = agg.report();
        assert_eq!(report.sla_violations, 1);
        assert_eq!(report.outcome("a").unwrap().status, ScenarioStatus::Failed);
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_medium_findings_do_not_fail_run() {
        let mut agg = ResultAggregator::new("http://app");
        let finding = Finding::builder()
            .severity(Severity::Medium)
            .title("degraded concurrency")
            .build()
            .unwrap();
        agg.record(outcome("a", true, vec![], vec![finding]));
        assert!(agg.all_passed());

        let high = Finding::builder()
            .severity(Severity::High)
            .title("report write failed")
            .build()
            .unwrap();
        agg.add_finding(high);
        assert!(!agg.all_passed());
        assert_eq!(agg.severity_counts().high, 1);
        assert_eq!(agg.findings().len(), 2);
    }

    #[test]
    fn test_unrecovered_scenario_fails() {
        let status = ScenarioOutcome::judge(
            &Some(RecoveryMeasurement::failed("a", Utc::now(), Duration::ZERO, "http")),
            &[],
            &[],
        );
        assert_eq!(status, ScenarioStatus::Failed);
        assert_eq!(ScenarioOutcome::judge(&None, &[], &[]), ScenarioStatus::Failed);
    }
}
