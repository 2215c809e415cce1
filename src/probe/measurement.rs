use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recovery-time measurement. Exactly one is recorded per scenario run.
///
/// `ended_at` is derived from `started_at` and the monotonic elapsed time, so
/// `ended_at - started_at == duration` always holds and is never negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryMeasurement {
    pub scenario_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub success: bool,
    pub method: String,
}

impl RecoveryMeasurement {
    pub fn new(
        scenario_id: impl Into<String>,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        success: bool,
        method: impl Into<String>,
    ) -> Self {
        let delta = chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero());
        let ended_at = started_at + delta;
        let duration_secs = delta.to_std().map(|d| d.as_secs_f64()).unwrap_or(0.0);
        Self {
            scenario_id: scenario_id.into(),
            started_at,
            ended_at,
            duration_secs,
            success,
            method: method.into(),
        }
    }

    /// Explicit failure record for a scenario that never got as far as a
    /// recovery measurement.
    pub fn failed(
        scenario_id: impl Into<String>,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        method: impl Into<String>,
    ) -> Self {
        Self::new(scenario_id, started_at, elapsed, false, method)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs.max(0.0))
    }
}
