//! Scenario outcomes and the per-scenario state machine

use serde::Serialize;

use crate::error::{ErrorKind, HarnessError};
use crate::scenario::Category;

/// Terminal status of a scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    Passed,
    Failed,
    Errored,
}

impl OutcomeStatus {
    pub fn label(self) -> &'static str {
        match self {
            OutcomeStatus::Passed => "PASSED",
            OutcomeStatus::Failed => "FAILED",
            OutcomeStatus::Errored => "ERRORED",
        }
    }
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle of a registered scenario
///
/// `Pending -> Running -> Finished(_)`. Finished is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioState {
    Pending,
    Running,
    Finished(OutcomeStatus),
}

impl ScenarioState {
    /// Move to the next state, or `None` if the transition is not allowed
    pub fn advance(self, next: ScenarioState) -> Option<ScenarioState> {
        if self.is_terminal() {
            return None;
        }
        match (self, next) {
            (ScenarioState::Pending, ScenarioState::Running) => Some(next),
            (ScenarioState::Running, ScenarioState::Finished(_)) => Some(next),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ScenarioState::Finished(_))
    }
}

/// Recorded result of running one scenario
///
/// Outcomes carry no timing so that two runs of the same catalogue compare
/// equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    /// Scenario identifier
    pub id: String,

    /// Scenario category
    pub category: Category,

    /// Terminal status
    pub status: OutcomeStatus,

    /// Diagnostic for non-passing outcomes (and a few informative passes)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Error variant that produced a non-passing outcome
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

impl Outcome {
    /// Create a passing outcome
    pub fn passed(id: impl Into<String>, category: Category, message: Option<String>) -> Self {
        Self {
            id: id.into(),
            category,
            status: OutcomeStatus::Passed,
            message,
            error: None,
        }
    }

    /// Convert a scenario error into its outcome
    pub fn from_error(id: impl Into<String>, category: Category, err: &HarnessError) -> Self {
        Self {
            id: id.into(),
            category,
            status: err.status(),
            message: Some(err.to_string()),
            error: Some(err.kind()),
        }
    }

    pub fn is_passed(&self) -> bool {
        self.status == OutcomeStatus::Passed
    }
}
