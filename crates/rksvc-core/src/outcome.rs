//! Per-step outcomes collected into command reports.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Changed,
    NoOp,
}

impl Outcome {
    pub fn from_changed(changed: bool) -> Self {
        if changed { Outcome::Changed } else { Outcome::NoOp }
    }

    pub fn changed(self) -> bool {
        self == Outcome::Changed
    }

    /// `Changed` if either side changed.
    pub fn or(self, other: Outcome) -> Outcome {
        Outcome::from_changed(self.changed() || other.changed())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: String,
    pub outcome: Outcome,
    pub detail: String,
}

impl StepReport {
    pub fn new(step: impl Into<String>, outcome: Outcome, detail: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            outcome,
            detail: detail.into(),
        }
    }
}
