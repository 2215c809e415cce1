//! Findings, result aggregation and report output.

mod aggregator;
mod finding;
mod writer;

pub use aggregator::{RecoveryReport, ResultAggregator, ScenarioOutcome, ScenarioStatus};
pub use finding::{Finding, FindingBuilder, Severity, SeverityCounts};
pub use writer::{render_html, render_summary, Reporter};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize report: {0}")]
    Serialize(String),
}

impl From<serde_json::Error> for ReportError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialize(e.to_string())
    }
}
