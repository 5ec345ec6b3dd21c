use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::approval::{ApprovalStep, StepStatus};
use crate::domain::expense::{Expense, ExpenseId, ExpenseStatus};
use crate::domain::user::UserId;
use crate::errors::WorkflowError;
use crate::flows::states::{DecisionAction, DecisionOutcome};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecisionError {
    #[error("expense `{}` is already {}", .expense_id.0, .status.as_str())]
    ExpenseClosed { expense_id: ExpenseId, status: ExpenseStatus },
    #[error("approver `{}` has no open gate on expense `{}`", .approver_id.0, .expense_id.0)]
    NoOpenGate { expense_id: ExpenseId, approver_id: UserId },
}

impl From<DecisionError> for WorkflowError {
    fn from(value: DecisionError) -> Self {
        Self::Authorization(value.to_string())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("chain of expense `{}` is inconsistent: {reason}", .expense_id.0)]
pub struct ChainInvariantViolation {
    pub expense_id: ExpenseId,
    pub reason: String,
}

/// The step the cursor points at, if the expense is under review and that step
/// is still undecided.
pub fn open_gate<'a>(expense: &Expense, steps: &'a [ApprovalStep]) -> Option<&'a ApprovalStep> {
    if expense.status != ExpenseStatus::InReview {
        return None;
    }

    steps.iter().find(|step| step.sequence == expense.current_approver_index && step.is_open())
}

/// Checks that status, cursor and step statuses agree.
///
/// Steps before the cursor are approved. Under review the cursor step is open;
/// after a rejection the cursor step is the rejected one; everything past the
/// cursor stays pending. An approved expense has every step approved.
pub fn verify_chain(expense: &Expense, steps: &[ApprovalStep]) -> Result<(), ChainInvariantViolation> {
    let violation = |reason: String| ChainInvariantViolation {
        expense_id: expense.id.clone(),
        reason,
    };

    let mut ordered: Vec<&ApprovalStep> = steps.iter().collect();
    ordered.sort_by_key(|step| step.sequence);
    for (position, step) in (0u32..).zip(ordered.iter()) {
        if step.sequence != position {
            return Err(violation(format!(
                "sequence {} found at position {position}",
                step.sequence
            )));
        }
    }

    let cursor = expense.current_approver_index;
    let expected_at_cursor = match expense.status {
        ExpenseStatus::Pending => {
            if !ordered.is_empty() || cursor != 0 {
                return Err(violation("pending expense must have no chain".to_string()));
            }
            return Ok(());
        }
        ExpenseStatus::Approved if ordered.is_empty() => {
            return if cursor == 0 {
                Ok(())
            } else {
                Err(violation("auto-approved expense must keep cursor at 0".to_string()))
            };
        }
        ExpenseStatus::Approved => {
            if cursor as usize + 1 != ordered.len() {
                return Err(violation(format!(
                    "approved expense cursor {cursor} is not on the last step"
                )));
            }
            StepStatus::Approved
        }
        ExpenseStatus::InReview => StepStatus::Pending,
        ExpenseStatus::Rejected => StepStatus::Rejected,
    };

    if cursor as usize >= ordered.len() {
        return Err(violation(format!("cursor {cursor} is past the end of the chain")));
    }

    for step in ordered {
        let expected = match step.sequence.cmp(&cursor) {
            std::cmp::Ordering::Less => StepStatus::Approved,
            std::cmp::Ordering::Equal => expected_at_cursor,
            std::cmp::Ordering::Greater => StepStatus::Pending,
        };
        if step.status != expected {
            return Err(violation(format!(
                "step {} is {} but {} was expected",
                step.sequence,
                step.status.as_str(),
                expected.as_str()
            )));
        }
    }

    Ok(())
}

/// Sequential single-approver gating: one open gate at a time, any rejection
/// ends the chain, approval of the last gate approves the expense.
#[derive(Clone, Copy, Debug, Default)]
pub struct ApprovalStateMachine;

impl ApprovalStateMachine {
    pub fn decide(
        &self,
        expense: &Expense,
        steps: &[ApprovalStep],
        approver_id: &UserId,
        action: DecisionAction,
        comment: Option<&str>,
        decided_at: DateTime<Utc>,
    ) -> Result<DecisionOutcome, DecisionError> {
        if expense.status.is_terminal() {
            return Err(DecisionError::ExpenseClosed {
                expense_id: expense.id.clone(),
                status: expense.status,
            });
        }

        let gate = open_gate(expense, steps)
            .filter(|step| &step.approver_id == approver_id)
            .ok_or_else(|| DecisionError::NoOpenGate {
                expense_id: expense.id.clone(),
                approver_id: approver_id.clone(),
            })?;

        let mut step = gate.clone();
        step.status = action.step_status();
        step.decided_at = Some(decided_at);
        if let Some(comment) = comment.map(str::trim).filter(|comment| !comment.is_empty()) {
            step.comment = Some(comment.to_string());
        }

        let cursor = expense.current_approver_index;
        let (to, current_index) = match action {
            DecisionAction::Reject => (ExpenseStatus::Rejected, cursor),
            DecisionAction::Approve => {
                let has_next = steps.iter().any(|candidate| candidate.sequence == gate.sequence + 1);
                if has_next {
                    (ExpenseStatus::InReview, cursor + 1)
                } else {
                    (ExpenseStatus::Approved, cursor)
                }
            }
        };

        Ok(DecisionOutcome {
            expense_id: expense.id.clone(),
            action,
            from: expense.status,
            to,
            previous_index: cursor,
            current_index,
            step,
        })
    }
}
