//! Findings: the unit of judgment a scenario leaves behind.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Finding severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info = 0,
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    /// Critical and high findings fail the run.
    pub fn is_blocking(&self) -> bool {
        *self >= Severity::High
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "CRITICAL"),
            Severity::High => write!(f, "HIGH"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::Low => write!(f, "LOW"),
            Severity::Info => write!(f, "INFO"),
        }
    }
}

/// A recorded observation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub recommendation: String,
    pub evidence: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
    pub scenario_id: Option<String>,
}

impl Finding {
    pub fn builder() -> FindingBuilder {
        FindingBuilder::default()
    }

    /// Infallible constructor for findings raised by the engine itself.
    pub fn new(severity: Severity, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.into(),
            description: description.into(),
            recommendation: String::new(),
            evidence: BTreeMap::new(),
            timestamp: Utc::now(),
            scenario_id: None,
        }
    }

    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = recommendation.into();
        self
    }

    pub fn with_evidence(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.evidence.insert(key.into(), value.to_string());
        self
    }

    pub fn for_scenario(mut self, scenario_id: impl Into<String>) -> Self {
        self.scenario_id = Some(scenario_id.into());
        self
    }

    /// One-line form for logs and the text summary.
    pub fn to_log_string(&self) -> String {
        match &self.scenario_id {
            Some(id) => format!("[{}] {} ({}): {}", self.severity, self.title, id, self.description),
            None => format!("[{}] {}: {}", self.severity, self.title, self.description),
        }
    }
}

/// Builder for findings.
#[derive(Debug, Default)]
pub struct FindingBuilder {
    severity: Option<Severity>,
    title: Option<String>,
    description: Option<String>,
    recommendation: Option<String>,
    evidence: BTreeMap<String, String>,
    scenario_id: Option<String>,
}

impl FindingBuilder {
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = Some(recommendation.into());
        self
    }

    pub fn evidence(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.evidence.insert(key.into(), value.to_string());
        self
    }

    pub fn scenario(mut self, scenario_id: impl Into<String>) -> Self {
        self.scenario_id = Some(scenario_id.into());
        self
    }

    /// Build the finding. Severity and title are required.
    pub fn build(self) -> Result<Finding, &'static str> {
        Ok(Finding {
            severity: self.severity.ok_or("severity is required")?,
            title: self.title.ok_or("title is required")?,
            description: self.description.unwrap_or_default(),
            recommendation: self.recommendation.unwrap_or_default(),
            evidence: self.evidence,
            timestamp: Utc::now(),
            scenario_id: self.scenario_id,
        })
    }
}

/// Per-severity counts derived from a finding list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
}

impl SeverityCounts {
    pub fn from_findings<'a>(findings: impl IntoIterator<Item = &'a Finding>) -> Self {
        let mut counts = Self::default();
        for finding in findings {
            match finding.severity {
                Severity::Critical => counts.critical += 1,
                Severity::High => counts.high += 1,
                Severity::Medium => counts.medium += 1,
                Severity::Low => counts.low += 1,
                Severity::Info => counts.info += 1,
            }
        }
        counts
    }

    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Info => self.info,
        }
    }

    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low + self.info
    }

    pub fn blocking(&self) -> usize {
        self.critical + self.high
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert!(Severity::Low > Severity::Info);
        assert!(Severity::High.is_blocking());
        assert!(!Severity::Medium.is_blocking());
    }

    #[test]
    fn test_builder_requires_severity_and_title() {
        assert!(Finding::builder().title("x").build().is_err());
        assert!(Finding::builder().severity(Severity::Low).build().is_err());
        let f = Finding::builder()
            .severity(Severity::Low)
            .title("slow restart")
            .evidence("elapsed_secs", 4.5)
            .scenario("application_crash")
            .build()
            .unwrap();
        assert_eq!(f.evidence.get("elapsed_secs").map(String::as_str), Some("4.5"));
        assert!(f.to_log_string().contains("application_crash"));
    }

    #[test]
    fn test_severity_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"critical\"");
        let parsed: Severity = serde_json::from_str("\"info\"").unwrap();
        assert_eq!(parsed, Severity::Info);
    }

    #[test]
    fn test_counts() {
        let make = |s| Finding::builder().severity(s).title("t").build().unwrap();
        let findings = vec![
            make(Severity::High),
            make(Severity::High),
            make(Severity::Info),
            make(Severity::Critical),
        ];
        let counts = SeverityCounts::from_findings(&findings);
        assert_eq!(counts.high, 2);
        assert_eq!(counts.critical, 1);
        assert_eq!(counts.info, 1);
        assert_eq!(counts.total(), 4);
        assert_eq!(counts.blocking(), 3);
        assert_eq!(counts.get(Severity::Medium), 0);
    }
}
