//! SLA judgment: compare a measured value against a declared target.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::HarnessConfig;
use crate::error::SlaViolation;

/// A declared numeric threshold. Lower measured values are better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaTarget {
    pub metric: String,
    pub target: f64,
    pub unit: String,
}

impl SlaTarget {
    pub fn new(metric: impl Into<String>, target: f64, unit: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            target,
            unit: unit.into(),
        }
    }

    /// Recovery time objective in seconds.
    pub fn rto(seconds: f64) -> Self {
        Self::new("rto", seconds, "s")
    }

    /// Recovery point objective in seconds.
    pub fn rpo(seconds: f64) -> Self {
        Self::new("rpo", seconds, "s")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SlaStatus {
    Pass,
    Fail,
}

impl fmt::Display for SlaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlaStatus::Pass => write!(f, "PASS"),
            SlaStatus::Fail => write!(f, "FAIL"),
        }
    }
}

/// Result of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaVerdict {
    pub metric: String,
    pub measured: f64,
    pub target: f64,
    pub unit: String,
    pub status: SlaStatus,
    /// `target - measured`; negative when violated.
    pub margin: f64,
}

impl SlaVerdict {
    pub fn passed(&self) -> bool {
        self.status == SlaStatus::Pass
    }

    /// The violation this verdict represents, if it failed.
    pub fn violation(&self) -> Option<SlaViolation> {
        match self.status {
            SlaStatus::Pass => None,
            SlaStatus::Fail => Some(SlaViolation {
                metric: self.metric.clone(),
                measured: self.measured,
                target: self.target,
                unit: self.unit.clone(),
            }),
        }
    }
}

/// Holds the run's declared targets and judges measurements against them.
#[derive(Debug, Clone)]
pub struct SlaEvaluator {
    rto: SlaTarget,
    rpo: SlaTarget,
}

impl SlaEvaluator {
    pub fn new(rto: SlaTarget, rpo: SlaTarget) -> Self {
        Self { rto, rpo }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(
            SlaTarget::rto(config.rto_target_secs),
            SlaTarget::rpo(config.rpo_target_secs),
        )
    }

    pub fn rto(&self) -> &SlaTarget {
        &self.rto
    }

    pub fn rpo(&self) -> &SlaTarget {
        &self.rpo
    }

    /// `measured <= target` passes, equality included. NaN never passes.
    pub fn evaluate(measured: f64, target: &SlaTarget) -> SlaVerdict {
        let status = if measured <= target.target {
            SlaStatus::Pass
        } else {
            SlaStatus::Fail
        };
        SlaVerdict {
            metric: target.metric.clone(),
            measured,
            target: target.target,
            unit: target.unit.clone(),
            status,
            margin: target.target - measured,
        }
    }

    pub fn evaluate_rto(&self, measured_secs: f64) -> SlaVerdict {
        Self::evaluate(measured_secs, &self.rto)
    }

    pub fn evaluate_rpo(&self, measured_secs: f64) -> SlaVerdict {
        Self::evaluate(measured_secs, &self.rpo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_target_passes_with_positive_margin() {
        let v = SlaEvaluator::evaluate(7.5, &SlaTarget::rto(3600.0));
        assert_eq!(v.status, SlaStatus::Pass);
        assert_eq!(v.margin, 3592.5);
        assert!(v.violation().is_none());
    }

    #[test]
    fn test_equality_passes() {
        let v = SlaEvaluator::evaluate(10.0, &SlaTarget::rto(10.0));
        assert!(v.passed());
        assert_eq!(v.margin, 0.0);
    }

    #[test]
    fn test_above_target_fails() {
        let v = SlaEvaluator::evaluate(10.001, &SlaTarget::rpo(10.0));
        assert_eq!(v.status, SlaStatus::Fail);
        assert!(v.margin < 0.0);
        let violation = v.violation().unwrap();
        assert_eq!(violation.metric, "rpo");
        assert_eq!(violation.target, 10.0);
    }

    #[test]
    fn test_nan_fails() {
        let v = SlaEvaluator::evaluate(f64::NAN, &SlaTarget::rto(10.0));
        assert_eq!(v.status, SlaStatus::Fail);
    }

    #[test]
    fn test_from_config_uses_targets() {
        let cfg = HarnessConfig {
            rto_target_secs: 30.0,
            rpo_target_secs: 60.0,
            ..Default::default()
        };
        let eval = SlaEvaluator::from_config(&cfg);
        assert!(eval.evaluate_rto(30.0).passed());
        assert!(!eval.evaluate_rpo(60.5).passed());
    }

    #[test]
    fn test_status_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&SlaStatus::Pass).unwrap(), "\"PASS\"");
    }
}
