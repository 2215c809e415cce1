//! Span helpers for scenario execution.

use tracing::{info_span, Span};

/// Extension trait for recording results into spans.
pub trait SpanExt {
    /// Record `status` and, on error, `error.message`.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for scenario spans.
pub struct ScenarioSpan;

impl ScenarioSpan {
    /// Span fields:
    /// - `run_id`, `scenario_id`, `kind`: set at creation
    /// - `status`, `error.message`: filled by `SpanExt::record_result`
    /// - `elapsed_secs`: recovery time, once measured
    pub fn new(run_id: &str, scenario_id: &str, kind: &str) -> Span {
        info_span!(
            "scenario",
            run_id = %run_id,
            scenario_id = %scenario_id,
            kind = %kind,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            elapsed_secs = tracing::field::Empty,
        )
    }
}
