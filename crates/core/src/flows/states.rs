use serde::{Deserialize, Serialize};

use crate::domain::approval::{ApprovalStep, StepStatus};
use crate::domain::expense::{ExpenseId, ExpenseStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Approve,
    Reject,
}

impl DecisionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }

    pub fn step_status(&self) -> StepStatus {
        match self {
            Self::Approve => StepStatus::Approved,
            Self::Reject => StepStatus::Rejected,
        }
    }
}

/// Result of applying one decision to a chain. Nothing is persisted yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub expense_id: ExpenseId,
    pub action: DecisionAction,
    pub from: ExpenseStatus,
    pub to: ExpenseStatus,
    pub previous_index: u32,
    pub current_index: u32,
    /// The decided step with its new status, comment and timestamp applied.
    pub step: ApprovalStep,
}

impl DecisionOutcome {
    pub fn is_terminal(&self) -> bool {
        self.to.is_terminal()
    }
}
