//! Report files and the console summary.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use super::aggregator::{RecoveryReport, ScenarioOutcome};
use super::finding::Severity;
use super::ReportError;

/// Writes JSON and HTML reports into a results directory.
#[derive(Debug, Clone)]
pub struct Reporter {
    dir: PathBuf,
}

impl Reporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> Result<(), ReportError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| ReportError::Io {
            path: self.dir.clone(),
            source,
        })
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf, ReportError> {
        self.ensure_dir()?;
        let path = self.dir.join(name);
        let body = serde_json::to_string_pretty(value)?;
        write_file(&path, &body)?;
        Ok(path)
    }

    /// `<scenario_id>_results.json`
    pub fn write_scenario(&self, outcome: &ScenarioOutcome) -> Result<PathBuf, ReportError> {
        let name = format!("{}_results.json", sanitize(&outcome.scenario_id));
        self.write_json(&name, outcome)
    }

    /// `recovery_report.json` plus `recovery_report.html`.
    pub fn write_report(&self, report: &RecoveryReport) -> Result<(PathBuf, PathBuf), ReportError> {
        let json = self.write_json("recovery_report.json", report)?;
        let html = self.dir.join("recovery_report.html");
        write_file(&html, &render_html(report))?;
        info!(json = %json.display(), html = %html.display(), "Reports written");
        Ok((json, html))
    }
}

fn write_file(path: &Path, body: &str) -> Result<(), ReportError> {
    std::fs::write(path, body).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Keep file names to a safe character set.
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Plain-text summary for the console.
pub fn render_summary(report: &RecoveryReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Recovery verification run {}", report.run_id);
    let _ = writeln!(out, "Target: {}", report.target);
    let _ = writeln!(out);

    for s in &report.scenarios {
        let elapsed = s
            .measurement
            .as_ref()
            .map(|m| format!("{:.2}s", m.duration_secs))
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(out, "  {:<8} {:<32} {}", s.status, s.scenario_id, elapsed);
        for v in &s.verdicts {
            let _ = writeln!(
                out,
                "           {} {}: {:.2}{} (target {:.2}{})",
                v.status, v.metric, v.measured, v.unit, v.target, v.unit
            );
        }
    }

    let _ = writeln!(out);
    let counts = Severity::ALL
        .iter()
        .map(|s| format!("{} {}", report.counts.get(*s), s.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    let _ = writeln!(out, "Findings: {}", counts);
    for f in report.findings.iter().filter(|f| f.severity >= Severity::Medium) {
        let _ = writeln!(out, "  {}", f.to_log_string());
    }
    let _ = writeln!(out, "SLA violations: {}", report.sla_violations);
    let _ = writeln!(out, "Result: {}", if report.passed { "PASS" } else { "FAIL" });
    out
}

/// Self-contained HTML report.
pub fn render_html(report: &RecoveryReport) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Recovery report {id}</title>\
         <style>body{{font-family:sans-serif}}table{{border-collapse:collapse}}\
         td,th{{border:1px solid #ccc;padding:4px 8px}}.passed{{color:#070}}.failed{{color:#b00}}\
         .skipped{{color:#777}}</style></head><body>\n",
        id = report.run_id
    );
    let _ = writeln!(out, "<h1>Recovery verification report</h1>");
    let _ = writeln!(
        out,
        "<p>Run <code>{}</code> against <code>{}</code>, {} to {}. Result: <strong class=\"{}\">{}</strong></p>",
        report.run_id,
        escape(&report.target),
        report.started_at.to_rfc3339(),
        report.finished_at.to_rfc3339(),
        if report.passed { "passed" } else { "failed" },
        if report.passed { "PASS" } else { "FAIL" }
    );

    let _ = writeln!(out, "<h2>Scenarios</h2>\n<table><tr><th>Scenario</th><th>Kind</th><th>Status</th><th>Recovery</th><th>SLA</th></tr>");
    for s in &report.scenarios {
        let recovery = s
            .measurement
            .as_ref()
            .map(|m| format!("{:.2}s via {}", m.duration_secs, escape(&m.method)))
            .unwrap_or_default();
        let sla = s
            .verdicts
            .iter()
            .map(|v| {
                escape(&format!(
                    "{} {} {:.2}/{:.2}{}",
                    v.metric, v.status, v.measured, v.target, v.unit
                ))
            })
            .collect::<Vec<_>>()
            .join("<br>");
        let _ = writeln!(
            out,
            "<tr><td>{}</td><td>{}</td><td class=\"{}\">{}</td><td>{}</td><td>{}</td></tr>",
            escape(&s.scenario_id),
            escape(&s.kind),
            s.status.as_str(),
            s.status,
            recovery,
            sla
        );
    }
    let _ = writeln!(out, "</table>");

    let _ = writeln!(out, "<h2>Findings</h2>\n<table><tr><th>Severity</th><th>Scenario</th><th>Title</th><th>Description</th><th>Recommendation</th></tr>");
    for f in &report.findings {
        let _ = writeln!(
            out,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            f.severity,
            escape(f.scenario_id.as_deref().unwrap_or("")),
            escape(&f.title),
            escape(&f.description),
            escape(&f.recommendation)
        );
    }
    let _ = writeln!(out, "</table>\n</body></html>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{Finding, ResultAggregator, ScenarioStatus};
    use std::collections::BTreeMap;

    fn sample() -> RecoveryReport {
        let mut agg = ResultAggregator::new("http://app<1>");
        let finding = Finding::builder()
            .severity(Severity::High)
            .title("<script>")
            .scenario("crash/1")
            .build()
            .unwrap();
        agg.record(ScenarioOutcome {
            scenario_id: "crash/1".into(),
            kind: "process_kill".into(),
            description: String::new(),
            status: ScenarioStatus::Failed,
            started_at: chrono::Utc::now(),
            measurement: None,
            verdicts: vec![],
            findings: vec![finding],
            details: BTreeMap::new(),
        });
        agg.report()
    }

    #[test]
    fn test_html_is_escaped() {
        let html = render_html(&sample());
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("http://app&lt;1&gt;"));
    }

    #[test]
    fn test_summary_mentions_result() {
        let text = render_summary(&sample());
        assert!(text.contains("FAIL"));
        assert!(text.contains("1 high"));
    }

    #[test]
    fn test_files_written() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = Reporter::new(dir.path().join("results"));
        let report = sample();
        let path = reporter.write_scenario(&report.scenarios[0]).unwrap();
        assert_eq!(path.file_name().unwrap(), "crash_1_results.json");

        let (json, html) = reporter.write_report(&report).unwrap();
        let parsed: RecoveryReport =
            serde_json::from_str(&std::fs::read_to_string(json).unwrap()).unwrap();
        assert_eq!(parsed.run_id, report.run_id);
        assert!(html.exists());
    }
}
