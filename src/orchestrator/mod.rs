//! Scenario orchestration.
//!
//! Scenarios run one at a time, in catalog order. Each one is driven
//! through [`ScenarioPhase`]s: a baseline check, fault injection, recovery
//! measurement, then SLA evaluation. Any error raised along the way is
//! turned into a finding and the run moves on to the next scenario. Every
//! executed scenario leaves exactly one [`RecoveryMeasurement`].

mod phase;

pub use phase::{PhaseError, PhaseTracker, ScenarioPhase};

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::backup::{BackupRestoreController, IntegrityCheck, SeededRecordCheck};
use crate::config::{ConfigError, HarnessConfig};
use crate::datastore::{DataStore, SqlDataStore};
use crate::error::{HarnessError, InjectionError, ProbeTimeoutError};
use crate::fault::{FaultInjector, SystemProcessControl};
use crate::probe::{
    ConcurrentRequestTest, DatabaseHealthCheck, HealthCheck, HttpHealthCheck, ProbeOutcome,
    RecoveryMeasurement, RecoveryProbe,
};
use crate::report::{
    Finding, RecoveryReport, Reporter, ResultAggregator, ScenarioOutcome, ScenarioStatus, Severity,
};
use crate::resilience::{CallError, CircuitBreaker, CircuitState, RetryExecutor, RetryPolicy};
use crate::scenario::{Scenario, ScenarioKind};
use crate::sla::{SlaEvaluator, SlaVerdict};
use crate::telemetry::{self, ScenarioSpan, SpanExt};

const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Below this post-recovery success rate the concurrency sub-test raises a
/// medium finding.
const CONCURRENCY_DEGRADED: f64 = 0.95;
/// Below this it raises a high one.
const CONCURRENCY_FAILED: f64 = 0.5;

/// Everything the orchestrator talks to. Optional parts disable the
/// scenarios that need them.
pub struct Collaborators {
    pub injector: FaultInjector,
    pub app_check: Arc<dyn HealthCheck>,
    pub db_check: Option<Arc<dyn HealthCheck>>,
    pub store: Option<Arc<dyn DataStore>>,
    pub backup: Option<BackupRestoreController>,
    pub reporter: Option<Reporter>,
}

impl Collaborators {
    pub fn new(injector: FaultInjector, app_check: Arc<dyn HealthCheck>) -> Self {
        Self {
            injector,
            app_check,
            db_check: None,
            store: None,
            backup: None,
            reporter: None,
        }
    }

    pub fn with_db_check(mut self, check: Arc<dyn HealthCheck>) -> Self {
        self.db_check = Some(check);
        self
    }

    pub fn with_datastore(mut self, store: Arc<dyn DataStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_backup(mut self, backup: BackupRestoreController) -> Self {
        self.backup = Some(backup);
        self
    }

    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Wire real HTTP, process, datastore and tool collaborators from
    /// configuration. Must be called inside a tokio runtime.
    pub fn from_config(config: &HarnessConfig) -> Result<Self, HarnessError> {
        let health_url = config.health_url();
        let app_check = HttpHealthCheck::new(
            health_url.clone(),
            config.accepted_statuses.clone(),
            HTTP_REQUEST_TIMEOUT,
        )
        .map_err(|e| ConfigError::Invalid(format!("HTTP client: {}", e)))?;

        let mut injector = FaultInjector::new(health_url);
        if let Some(pattern) = &config.process_pattern {
            injector = injector.with_process(Arc::new(SystemProcessControl::pattern(pattern.clone())));
        }

        if !config.database.is_configured() {
            return Ok(Self::new(injector, Arc::new(app_check))
                .with_reporter(Reporter::new(config.results_dir.clone())));
        }

        let options = config.database.connect_options();
        let store: Arc<dyn DataStore> = Arc::new(SqlDataStore::connect_lazy(options.clone()));
        let db_check = DatabaseHealthCheck::new(options);
        let injector = injector
            .with_datastore(Arc::clone(&store))
            .with_connection_target(config.database.address());
        let backup = BackupRestoreController::new(config.backup.clone())
            .with_password(config.database.password.clone());

        Ok(Self::new(injector, Arc::new(app_check))
            .with_db_check(Arc::new(db_check))
            .with_datastore(store)
            .with_backup(backup)
            .with_reporter(Reporter::new(config.results_dir.clone())))
    }
}

/// What a scenario produced before it was recorded.
struct Measured {
    measurement: RecoveryMeasurement,
    verdicts: Vec<SlaVerdict>,
    findings: Vec<Finding>,
    details: BTreeMap<String, String>,
}

impl Measured {
    fn new(measurement: RecoveryMeasurement) -> Self {
        Self {
            measurement,
            verdicts: Vec::new(),
            findings: Vec::new(),
            details: BTreeMap::new(),
        }
    }

    fn detail(&mut self, key: &str, value: impl ToString) {
        self.details.insert(key.to_string(), value.to_string());
    }
}

fn enter(tracker: &mut PhaseTracker, phase: ScenarioPhase) {
    if let Err(e) = tracker.advance(phase) {
        warn!(error = %e, "Phase transition rejected");
    }
}

fn require_effect(injected: bool, what: &str) -> Result<(), HarnessError> {
    if injected {
        Ok(())
    } else {
        Err(InjectionError::NoEffect(what.to_string()).into())
    }
}

fn recommendation_for(error: &HarnessError) -> &'static str {
    match error {
        HarnessError::Injection(_) => {
            "Check that the harness can reach and signal the target: process pattern, permissions and datastore credentials."
        }
        HarnessError::ProbeTimeout(_) => {
            "Confirm the target is healthy before the run and that its restarts are supervised."
        }
        HarnessError::ToolInvocation(_) => {
            "Install the backup tooling on the harness host and verify its credentials."
        }
        HarnessError::Integrity(_) => {
            "Review the restore procedure; restored data does not match the pre-failure state."
        }
        _ => "Inspect the harness logs for details.",
    }
}

/// Runs a scenario catalog and aggregates the results.
pub struct ScenarioOrchestrator {
    config: HarnessConfig,
    parts: Collaborators,
    probe: RecoveryProbe,
    retry: RetryExecutor,
    sla: SlaEvaluator,
    concurrency: ConcurrentRequestTest,
    aggregator: ResultAggregator,
}

impl ScenarioOrchestrator {
    pub fn new(config: HarnessConfig, parts: Collaborators) -> Self {
        Self {
            probe: RecoveryProbe::from_config(&config),
            retry: RetryExecutor::new(RetryPolicy::from(&config.retry)),
            sla: SlaEvaluator::from_config(&config),
            concurrency: ConcurrentRequestTest::from_config(&config.concurrency),
            aggregator: ResultAggregator::new(config.base_url.clone()),
            config,
            parts,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.aggregator.run_id()
    }

    pub fn aggregator(&self) -> &ResultAggregator {
        &self.aggregator
    }

    /// Run every configured scenario in order and produce the report.
    pub async fn run(mut self) -> RecoveryReport {
        let scenarios = self.config.scenarios.clone();
        info!(
            run_id = %self.run_id(),
            target = %self.config.base_url,
            scenarios = scenarios.len(),
            "Starting recovery verification run"
        );

        for scenario in &scenarios {
            let started_at = Utc::now();
            let clock = Instant::now();
            let outcome = match AssertUnwindSafe(self.run_scenario(scenario))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(payload) => self.panicked(scenario, started_at, clock.elapsed(), payload),
            };
            self.record(outcome);
        }

        let report = self.aggregator.report();
        let Some(reporter) = &self.parts.reporter else {
            return report;
        };
        match reporter.write_report(&report) {
            Ok(_) => report,
            Err(e) => {
                warn!(error = %e, "Failed to write consolidated report");
                self.aggregator.add_finding(
                    Finding::new(Severity::Medium, "Report could not be written", e.to_string())
                        .with_recommendation("Check that the results directory is writable."),
                );
                self.aggregator.report()
            }
        }
    }

    /// Append an outcome to the run, writing its per-scenario file.
    pub fn record(&mut self, outcome: ScenarioOutcome) {
        telemetry::metrics::record_scenario(&outcome.kind, outcome.status.as_str());
        for finding in &outcome.findings {
            telemetry::metrics::record_finding(finding.severity.as_str());
        }
        for verdict in outcome.verdicts.iter().filter(|v| !v.passed()) {
            telemetry::metrics::record_sla_violation(&verdict.metric);
        }

        if let Some(reporter) = &self.parts.reporter {
            if let Err(e) = reporter.write_scenario(&outcome) {
                warn!(scenario = %outcome.scenario_id, error = %e, "Failed to write scenario results");
                self.aggregator.add_finding(
                    Finding::new(Severity::Medium, "Scenario results could not be written", e.to_string())
                        .for_scenario(outcome.scenario_id.clone()),
                );
            }
        }
        self.aggregator.record(outcome);
    }

    /// Outcome for a scenario whose collaborators panicked mid-run.
    fn panicked(
        &self,
        scenario: &Scenario,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        payload: Box<dyn Any + Send>,
    ) -> ScenarioOutcome {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        warn!(scenario = %scenario.id, panic = %message, "Scenario panicked");

        let measurement = Some(RecoveryMeasurement::failed(
            scenario.id.clone(),
            started_at,
            elapsed,
            "none",
        ));
        let findings = vec![Finding::new(Severity::High, "Scenario panicked", message)
            .with_evidence("error_kind", "panic")
            .with_recommendation("A health check, process control or datastore collaborator panicked; inspect the harness logs.")
            .for_scenario(scenario.id.clone())];
        let status = ScenarioOutcome::judge(&measurement, &[], &findings);

        ScenarioOutcome {
            scenario_id: scenario.id.clone(),
            kind: scenario.kind.as_str().to_string(),
            description: scenario.description.clone(),
            status,
            started_at,
            measurement,
            verdicts: Vec::new(),
            findings,
            details: BTreeMap::new(),
        }
    }

    /// Which collaborator a scenario kind needs but does not have.
    fn missing_requirement(&self, kind: &ScenarioKind) -> Option<&'static str> {
        if kind.requires_process() && !self.parts.injector.has_process() {
            return Some("a target process pattern");
        }
        match kind {
            ScenarioKind::ConnectionDrop
                if self.parts.db_check.is_none() || !self.parts.injector.has_connection_target() =>
            {
                Some("a datastore connection")
            }
            ScenarioKind::DataCorruption { .. }
                if self.parts.store.is_none() || !self.parts.injector.has_datastore() =>
            {
                Some("a datastore connection")
            }
            ScenarioKind::BackupRestore { .. }
                if self.parts.store.is_none() || self.parts.backup.is_none() =>
            {
                Some("a datastore connection and backup tooling")
            }
            _ => None,
        }
    }

    fn skipped(&self, scenario: &Scenario, started_at: DateTime<Utc>, finding: Option<Finding>) -> ScenarioOutcome {
        ScenarioOutcome {
            scenario_id: scenario.id.clone(),
            kind: scenario.kind.as_str().to_string(),
            description: scenario.description.clone(),
            status: ScenarioStatus::Skipped,
            started_at,
            measurement: None,
            verdicts: Vec::new(),
            findings: finding.into_iter().collect(),
            details: BTreeMap::new(),
        }
    }

    /// Execute one scenario end to end. Never fails: errors become findings.
    pub async fn run_scenario(&self, scenario: &Scenario) -> ScenarioOutcome {
        let started_at = Utc::now();
        if !scenario.enabled {
            info!(scenario = %scenario.id, "Scenario disabled, skipping");
            return self.skipped(scenario, started_at, None);
        }
        if let Some(missing) = self.missing_requirement(&scenario.kind) {
            info!(scenario = %scenario.id, missing, "Scenario skipped");
            let finding = Finding::new(
                Severity::Low,
                "Scenario skipped",
                format!("{} needs {}, which is not configured", scenario.id, missing),
            )
            .with_recommendation("Configure the missing target to cover this failure mode.")
            .for_scenario(scenario.id.clone());
            return self.skipped(scenario, started_at, Some(finding));
        }

        let clock = Instant::now();
        let span = ScenarioSpan::new(
            &self.run_id().to_string(),
            &scenario.id,
            scenario.kind.as_str(),
        );
        let mut tracker = PhaseTracker::new(scenario.id.clone());
        info!(scenario = %scenario.id, kind = scenario.kind.as_str(), "Scenario starting");

        let result = self
            .execute(scenario, &mut tracker)
            .instrument(span.clone())
            .await;
        span.record_result(&result);

        let measured = match result {
            Ok(measured) => {
                enter(&mut tracker, ScenarioPhase::Recorded);
                measured
            }
            Err(e) => {
                let phase = tracker.abort();
                warn!(scenario = %scenario.id, %phase, error = %e, "Scenario aborted");
                let mut measured = Measured::new(RecoveryMeasurement::failed(
                    scenario.id.clone(),
                    started_at,
                    clock.elapsed(),
                    "none",
                ));
                measured.findings.push(
                    Finding::new(
                        e.severity(),
                        format!("Scenario failed during {}", phase),
                        e.to_string(),
                    )
                    .with_evidence("error_kind", e.kind())
                    .with_recommendation(recommendation_for(&e)),
                );
                measured
            }
        };
        span.record("elapsed_secs", measured.measurement.duration_secs);

        let Measured {
            measurement,
            verdicts,
            findings,
            mut details,
        } = measured;
        details.insert(
            "phases".to_string(),
            tracker
                .history()
                .iter()
                .map(|(p, _)| p.to_string())
                .collect::<Vec<_>>()
                .join(" -> "),
        );
        let findings: Vec<Finding> = findings
            .into_iter()
            .map(|f| match f.scenario_id {
                Some(_) => f,
                None => f.for_scenario(scenario.id.clone()),
            })
            .collect();

        let measurement = Some(measurement);
        let status = ScenarioOutcome::judge(&measurement, &verdicts, &findings);
        info!(scenario = %scenario.id, %status, "Scenario finished");

        ScenarioOutcome {
            scenario_id: scenario.id.clone(),
            kind: scenario.kind.as_str().to_string(),
            description: scenario.description.clone(),
            status,
            started_at,
            measurement,
            verdicts,
            findings,
            details,
        }
    }

    async fn execute(&self, scenario: &Scenario, tracker: &mut PhaseTracker) -> Result<Measured, HarnessError> {
        match &scenario.kind {
            ScenarioKind::ProcessKill => self.process_fault(scenario, tracker, None).await,
            ScenarioKind::GracefulShutdown { .. } => {
                self.process_fault(scenario, tracker, scenario.kind.shutdown_timeout())
                    .await
            }
            ScenarioKind::ConnectionDrop => self.connection_drop(scenario, tracker).await,
            ScenarioKind::RequestTimeout { budget_ms } => {
                self.request_timeout(scenario, tracker, Duration::from_millis(*budget_ms))
                    .await
            }
            ScenarioKind::DataCorruption { mutation } => {
                self.data_corruption(scenario, tracker, mutation).await
            }
            ScenarioKind::BackupRestore {
                destructive_statement,
            } => {
                self.backup_restore(scenario, tracker, destructive_statement.as_deref())
                    .await
            }
            ScenarioKind::CircuitBreaker => self.circuit_breaker(scenario, tracker).await,
            ScenarioKind::RetryRecovery => self.retry_recovery(scenario, tracker).await,
        }
    }

    /// The target must be healthy before a fault is injected.
    async fn baseline(&self, check: &dyn HealthCheck) -> Result<(), HarnessError> {
        let clock = Instant::now();
        let (healthy, attempts) = self.retry.execute_check(|| check.check()).await;
        if healthy {
            debug!(check = check.name(), attempts, "Baseline healthy");
            Ok(())
        } else {
            Err(ProbeTimeoutError {
                check: format!("{} (baseline)", check.name()),
                timeout_secs: clock.elapsed().as_secs_f64(),
            }
            .into())
        }
    }

    fn db_check(&self) -> Result<&dyn HealthCheck, HarnessError> {
        self.parts
            .db_check
            .as_deref()
            .ok_or_else(|| InjectionError::NotConfigured("datastore health check").into())
    }

    fn store(&self) -> Result<Arc<dyn DataStore>, HarnessError> {
        self.parts
            .store
            .clone()
            .ok_or_else(|| InjectionError::NotConfigured("datastore").into())
    }

    /// Judge a recovery: an RTO verdict when it recovered, a finding when it
    /// did not.
    fn judge_recovery(&self, scenario: &Scenario, outcome: ProbeOutcome, method: &str, m: &mut Measured) {
        match outcome.into_result(method, self.probe.timeout()) {
            Ok(elapsed) => {
                m.verdicts.push(self.sla.evaluate_rto(elapsed.as_secs_f64()));
                self.sla_findings(m);
            }
            Err(timeout) => m.findings.push(
                Finding::new(scenario.severity.max(Severity::High), "Target did not recover", timeout.to_string())
                    .with_evidence("elapsed_secs", format!("{:.3}", outcome.elapsed_secs()))
                    .with_recommendation("Ensure the service is supervised and restarts automatically after failure."),
            ),
        }
    }

    /// One high finding per failed verdict.
    fn sla_findings(&self, m: &mut Measured) {
        let new: Vec<Finding> = m
            .verdicts
            .iter()
            .filter_map(SlaVerdict::violation)
            .map(|v| {
                Finding::new(Severity::High, format!("{} target exceeded", v.metric.to_uppercase()), v.to_string())
                    .with_evidence("sla_metric", &v.metric)
                    .with_evidence("measured", format!("{:.3}", v.measured))
                    .with_evidence("target", format!("{:.3}", v.target))
                    .with_recommendation("Reduce recovery time or revisit the declared objective.")
            })
            .collect();
        m.findings.extend(new);
    }

    /// Fan out requests through a fresh breaker once the target is back.
    async fn concurrency_check(&self, scenario: &Scenario, m: &mut Measured) {
        let breaker = Arc::new(CircuitBreaker::new(
            format!("{}-concurrency", scenario.id),
            self.config.circuit_breaker.clone(),
        ));
        let report = self
            .concurrency
            .run(Arc::clone(&self.parts.app_check), breaker)
            .await;
        let rate = report.success_rate();
        m.detail("concurrent_requests", report.total);
        m.detail("concurrent_success_rate", format!("{:.3}", rate));

        let severity = if rate < CONCURRENCY_FAILED {
            Severity::High
        } else if rate < CONCURRENCY_DEGRADED {
            Severity::Medium
        } else {
            return;
        };
        m.findings.push(
            Finding::new(
                severity,
                "Degraded service after recovery",
                format!(
                    "{} of {} concurrent requests succeeded after recovery",
                    report.succeeded, report.total
                ),
            )
            .with_evidence("success_rate", format!("{:.3}", rate))
            .with_evidence("rejected", report.rejected)
            .with_recommendation("Check warm-up behaviour and connection pools after restart."),
        );
    }

    async fn process_fault(
        &self,
        scenario: &Scenario,
        tracker: &mut PhaseTracker,
        graceful: Option<Duration>,
    ) -> Result<Measured, HarnessError> {
        let check = self.parts.app_check.as_ref();
        self.baseline(check).await?;

        enter(tracker, ScenarioPhase::Injecting);
        let injected = match graceful {
            Some(timeout) => self.parts.injector.graceful_shutdown(timeout).await?,
            None => self.parts.injector.kill_process().await?,
        };
        require_effect(injected, "no running target process matched")?;

        enter(tracker, ScenarioPhase::Measuring);
        let (outcome, measurement) = self.probe.measure(&scenario.id, check).await;
        let mut m = Measured::new(measurement);
        m.detail("checks", outcome.checks);
        if outcome.recovered {
            self.concurrency_check(scenario, &mut m).await;
        }

        enter(tracker, ScenarioPhase::Evaluating);
        self.judge_recovery(scenario, outcome, check.name(), &mut m);
        Ok(m)
    }

    async fn connection_drop(&self, scenario: &Scenario, tracker: &mut PhaseTracker) -> Result<Measured, HarnessError> {
        let check = self.db_check()?;
        self.baseline(check).await?;

        enter(tracker, ScenarioPhase::Injecting);
        require_effect(
            self.parts.injector.drop_connection().await?,
            "datastore was not accepting connections",
        )?;

        enter(tracker, ScenarioPhase::Measuring);
        let (outcome, measurement) = self.probe.measure(&scenario.id, check).await;
        let mut m = Measured::new(measurement);

        enter(tracker, ScenarioPhase::Evaluating);
        self.judge_recovery(scenario, outcome, check.name(), &mut m);
        Ok(m)
    }

    async fn request_timeout(
        &self,
        scenario: &Scenario,
        tracker: &mut PhaseTracker,
        budget: Duration,
    ) -> Result<Measured, HarnessError> {
        let check = self.parts.app_check.as_ref();
        self.baseline(check).await?;

        enter(tracker, ScenarioPhase::Injecting);
        require_effect(
            self.parts.injector.induce_timeout(budget).await?,
            "request completed within the timeout budget",
        )?;

        enter(tracker, ScenarioPhase::Measuring);
        let (outcome, measurement) = self.probe.measure(&scenario.id, check).await;
        let mut m = Measured::new(measurement);
        m.detail("budget_ms", budget.as_millis());

        enter(tracker, ScenarioPhase::Evaluating);
        self.judge_recovery(scenario, outcome, check.name(), &mut m);
        Ok(m)
    }

    async fn data_corruption(
        &self,
        scenario: &Scenario,
        tracker: &mut PhaseTracker,
        mutation: &str,
    ) -> Result<Measured, HarnessError> {
        let integrity = SeededRecordCheck::new(self.store()?, self.config.integrity.clone());
        integrity.verify().await?;

        enter(tracker, ScenarioPhase::Injecting);
        require_effect(
            self.parts.injector.corrupt_data(mutation).await?,
            "mutation changed no rows",
        )?;

        enter(tracker, ScenarioPhase::Measuring);
        let started_at = Utc::now();
        let clock = Instant::now();
        let detection = integrity.verify().await;
        let detected = detection.is_err();
        let mut m = Measured::new(RecoveryMeasurement::new(
            scenario.id.clone(),
            started_at,
            clock.elapsed(),
            detected,
            "integrity_check",
        ));

        enter(tracker, ScenarioPhase::Evaluating);
        match detection {
            Err(e) => {
                info!(scenario = %scenario.id, error = %e, "Corruption detected");
                m.detail("detection", e);
            }
            Ok(_) => {
                m.findings.push(
                    Finding::new(
                        Severity::Critical,
                        "Data corruption went undetected",
                        "Integrity verification passed after the seeded record was corrupted",
                    )
                    .with_evidence("mutation", mutation)
                    .with_recommendation("Verify record values, not only presence, when checking integrity."),
                );
            }
        }

        let repaired = match integrity.repair().await {
            Ok(()) => integrity.verify().await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = repaired {
            m.findings.push(
                Finding::new(Severity::High, "Seeded record could not be repaired", e.to_string())
                    .with_recommendation("Restore the seeded record manually before the next run."),
            );
        }
        Ok(m)
    }

    async fn backup_restore(
        &self,
        scenario: &Scenario,
        tracker: &mut PhaseTracker,
        destructive_statement: Option<&str>,
    ) -> Result<Measured, HarnessError> {
        let store = self.store()?;
        let backup = self
            .parts
            .backup
            .as_ref()
            .ok_or(InjectionError::NotConfigured("backup tooling"))?;
        let baseline = SeededRecordCheck::new(Arc::clone(&store), self.config.integrity.clone())
            .verify()
            .await?;

        enter(tracker, ScenarioPhase::Injecting);
        let artifact = backup.create_backup().await?;
        let mut details = BTreeMap::new();
        details.insert("artifact".to_string(), artifact.path.display().to_string());
        details.insert("artifact_bytes".to_string(), artifact.size_bytes.to_string());
        details.insert("artifact_sha256".to_string(), artifact.sha256.clone());
        if let Some(statement) = destructive_statement {
            let rows = store
                .execute(statement)
                .await
                .map_err(|e| InjectionError::Mutation(e.to_string()))?;
            details.insert("rows_destroyed".to_string(), rows.to_string());
        }
        let failure_at = Utc::now();

        enter(tracker, ScenarioPhase::Measuring);
        let expected = SeededRecordCheck::new(store, self.config.integrity.clone())
            .expect_rows(baseline.row_count);
        let started_at = Utc::now();
        let restore = backup.restore_backup(&artifact, &expected).await?;
        let mut m = Measured::new(RecoveryMeasurement::new(
            scenario.id.clone(),
            started_at,
            restore.restore_duration(),
            true,
            "restore",
        ));
        m.details = details;
        m.detail("rows_restored", restore.integrity.row_count);

        enter(tracker, ScenarioPhase::Evaluating);
        m.verdicts
            .push(self.sla.evaluate_rpo(artifact.recovery_point_secs(failure_at)));
        m.verdicts.push(self.sla.evaluate_rto(restore.restore_secs));
        self.sla_findings(&mut m);
        Ok(m)
    }

    async fn circuit_breaker(&self, scenario: &Scenario, tracker: &mut PhaseTracker) -> Result<Measured, HarnessError> {
        let check = self.parts.app_check.as_ref();
        self.baseline(check).await?;
        let breaker = CircuitBreaker::new(
            format!("{}-breaker", scenario.id),
            self.config.circuit_breaker.clone(),
        );
        let invocations = AtomicU32::new(0);

        enter(tracker, ScenarioPhase::Injecting);
        require_effect(
            self.parts.injector.kill_process().await?,
            "no running target process matched",
        )?;

        enter(tracker, ScenarioPhase::Measuring);
        // The outage starts at the kill; breaker calls below are part of it.
        let started_at = Utc::now();
        let clock = Instant::now();
        let threshold = self.config.circuit_breaker.failure_threshold.max(1);
        for _ in 0..threshold {
            if guarded_check(&breaker, check, &invocations).await.is_ok() {
                break;
            }
        }
        let opened = breaker.state() == CircuitState::Open;
        let cooldown = self.config.circuit_breaker.timeout;
        let mut findings = Vec::new();
        if opened && !cooldown.is_zero() {
            let before = invocations.load(Ordering::SeqCst);
            let rejected = guarded_check(&breaker, check, &invocations)
                .await
                .is_err_and(|e| e.is_circuit_open());
            if !rejected || invocations.load(Ordering::SeqCst) != before {
                findings.push(
                    Finding::new(
                        Severity::High,
                        "Circuit breaker invoked the operation while open",
                        "A call made inside the cooldown reached the failing target",
                    )
                    .with_recommendation("Open breakers must reject calls without invoking them."),
                );
            }
        } else if !opened {
            findings.push(
                Finding::new(
                    Severity::Medium,
                    "Circuit breaker did not open",
                    format!(
                        "The target answered before {} consecutive failures were observed",
                        threshold
                    ),
                )
                .with_recommendation("Lower the failure threshold or slow the target's restart to exercise the breaker."),
            );
        }
        let opened_at = Instant::now();

        let (outcome, measurement) = self
            .probe
            .measure_since(&scenario.id, check, started_at, clock)
            .await;
        let mut m = Measured::new(measurement);
        m.findings = findings;
        m.detail("breaker_opened", opened);

        if outcome.recovered && opened {
            let waited = opened_at.elapsed();
            if waited < cooldown {
                tokio::time::sleep(cooldown - waited).await;
            }
            let trial = guarded_check(&breaker, check, &invocations).await;
            if trial.is_err() || breaker.state() != CircuitState::Closed {
                m.findings.push(
                    Finding::new(
                        Severity::High,
                        "Circuit breaker did not close after recovery",
                        format!("Breaker state after trial call: {}", breaker.state()),
                    )
                    .with_recommendation("A successful half-open trial must close the breaker."),
                );
            }
        }
        let snapshot = breaker.snapshot();
        m.detail("breaker_state", snapshot.state);
        m.detail("breaker_times_opened", snapshot.times_opened);
        m.detail("breaker_rejected_calls", snapshot.rejected_calls);
        m.detail("breaker_invocations", invocations.load(Ordering::SeqCst));

        enter(tracker, ScenarioPhase::Evaluating);
        self.judge_recovery(scenario, outcome, check.name(), &mut m);
        Ok(m)
    }

    async fn retry_recovery(&self, scenario: &Scenario, tracker: &mut PhaseTracker) -> Result<Measured, HarnessError> {
        let check = self.parts.app_check.as_ref();
        self.baseline(check).await?;

        enter(tracker, ScenarioPhase::Injecting);
        require_effect(
            self.parts.injector.kill_process().await?,
            "no running target process matched",
        )?;

        enter(tracker, ScenarioPhase::Measuring);
        let started_at = Utc::now();
        let clock = Instant::now();
        let (within_budget, attempts) = self.retry.execute_check(|| check.check()).await;
        let (recovered, method) = if within_budget {
            (true, "retry")
        } else {
            let remaining = self.probe.timeout().saturating_sub(clock.elapsed());
            let outcome = RecoveryProbe::poll_until_healthy(check, remaining, self.probe.interval()).await;
            (outcome.recovered, check.name())
        };
        let elapsed = clock.elapsed();
        let mut m = Measured::new(RecoveryMeasurement::new(
            scenario.id.clone(),
            started_at,
            elapsed,
            recovered,
            method,
        ));
        m.detail("retry_attempts", attempts);
        m.detail("retry_budget", self.retry.policy().max_attempts);
        m.findings.push(if within_budget {
            Finding::new(
                Severity::Info,
                "Recovered within retry budget",
                format!("Target answered on attempt {} of {}", attempts, self.retry.policy().max_attempts),
            )
        } else {
            Finding::new(
                Severity::Low,
                "Retry budget exhausted before recovery",
                format!(
                    "{} attempts were not enough to ride out the restart",
                    attempts
                ),
            )
            .with_recommendation("Increase RETRY_ATTEMPTS or RETRY_DELAY to cover typical restart time.")
        });

        enter(tracker, ScenarioPhase::Evaluating);
        let outcome = ProbeOutcome {
            recovered,
            elapsed,
            checks: attempts,
        };
        self.judge_recovery(scenario, outcome, method, &mut m);
        Ok(m)
    }
}

/// One health check through `breaker`, counting real invocations.
async fn guarded_check(
    breaker: &CircuitBreaker,
    check: &dyn HealthCheck,
    invocations: &AtomicU32,
) -> Result<(), CallError<()>> {
    breaker
        .call(|| async move {
            invocations.fetch_add(1, Ordering::SeqCst);
            if check.check().await {
                Ok(())
            } else {
                Err(())
            }
        })
        .await
}
