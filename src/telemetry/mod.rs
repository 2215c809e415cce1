//! Structured logging, spans and metrics.

mod logging;
pub mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use spans::{ScenarioSpan, SpanExt};
