//! Scenario lifecycle state machine.
//!
//! ```text
//! Pending -> Injecting -> Measuring -> Evaluating -> Recorded
//!    \__________\____________\____________________/ (abort)
//! ```
//!
//! Phases only move forward one step at a time, except that any
//! unfinished phase may jump straight to `Recorded` when the scenario
//! is abandoned.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioPhase {
    Pending,
    Injecting,
    Measuring,
    Evaluating,
    Recorded,
}

impl ScenarioPhase {
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Injecting),
            Self::Injecting => Some(Self::Measuring),
            Self::Measuring => Some(Self::Evaluating),
            Self::Evaluating => Some(Self::Recorded),
            Self::Recorded => None,
        }
    }

    pub fn can_transition_to(self, to: Self) -> bool {
        self.next() == Some(to) || (to == Self::Recorded && self != Self::Recorded)
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Recorded
    }
}

impl fmt::Display for ScenarioPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Injecting => "injecting",
            Self::Measuring => "measuring",
            Self::Evaluating => "evaluating",
            Self::Recorded => "recorded",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Illegal phase transition for {scenario_id}: {from} -> {to}")]
pub struct PhaseError {
    pub scenario_id: String,
    pub from: ScenarioPhase,
    pub to: ScenarioPhase,
}

/// Tracks one scenario's phase and when each phase was entered.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    scenario_id: String,
    phase: ScenarioPhase,
    history: Vec<(ScenarioPhase, DateTime<Utc>)>,
}

impl PhaseTracker {
    pub fn new(scenario_id: impl Into<String>) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            phase: ScenarioPhase::Pending,
            history: vec![(ScenarioPhase::Pending, Utc::now())],
        }
    }

    pub fn phase(&self) -> ScenarioPhase {
        self.phase
    }

    pub fn history(&self) -> &[(ScenarioPhase, DateTime<Utc>)] {
        &self.history
    }

    pub fn advance(&mut self, to: ScenarioPhase) -> Result<(), PhaseError> {
        if !self.phase.can_transition_to(to) {
            return Err(PhaseError {
                scenario_id: self.scenario_id.clone(),
                from: self.phase,
                to,
            });
        }
        self.phase = to;
        self.history.push((to, Utc::now()));
        Ok(())
    }

    /// Abandon the scenario, jumping to `Recorded` from wherever it is.
    /// Returns the phase it was in.
    pub fn abort(&mut self) -> ScenarioPhase {
        let from = self.phase;
        if !from.is_terminal() {
            self.phase = ScenarioPhase::Recorded;
            self.history.push((ScenarioPhase::Recorded, Utc::now()));
        }
        from
    }
}
