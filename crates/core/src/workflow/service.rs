use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::approvals::{plan_chain, RuleMatcher};
use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::approval::{ApprovalStep, ApprovalStepId, StepStatus};
use crate::domain::company::CompanyId;
use crate::domain::expense::{Expense, ExpenseDraft, ExpenseId, ExpenseStatus};
use crate::domain::timestamp_now;
use crate::domain::user::{User, UserId};
use crate::errors::{ValidationError, WorkflowError};
use crate::flows::{open_gate, verify_chain, ApprovalStateMachine, DecisionAction, DecisionOutcome};
use crate::workflow::locks::ExpenseLocks;
use crate::workflow::store::{CommitOutcome, DecisionCommit, WorkflowStore};
use crate::workflow::validation::{validate_draft, DEFAULT_MIN_DESCRIPTION_LEN};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowSettings {
    /// Approve submissions that match no rule (or an empty chain) outright.
    /// When off they stay `pending` with no chain.
    pub auto_approve_unmatched: bool,
    pub min_description_len: usize,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self { auto_approve_unmatched: true, min_description_len: DEFAULT_MIN_DESCRIPTION_LEN }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionReceipt {
    pub expense: Expense,
    pub outcome: DecisionOutcome,
}

/// One row of the approval chain as shown to callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
    pub step_id: ApprovalStepId,
    pub sequence: u32,
    pub approver_id: UserId,
    pub approver_name: Option<String>,
    pub status: StepStatus,
    pub comment: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    /// Derived: the open gate of an in-review expense.
    pub current: bool,
}

pub struct WorkflowService {
    store: Arc<dyn WorkflowStore>,
    audit: Arc<dyn AuditSink>,
    locks: ExpenseLocks,
    machine: ApprovalStateMachine,
    settings: WorkflowSettings,
}

impl WorkflowService {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        audit: Arc<dyn AuditSink>,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            store,
            audit,
            locks: ExpenseLocks::default(),
            machine: ApprovalStateMachine,
            settings,
        }
    }

    pub async fn submit(
        &self,
        draft: ExpenseDraft,
        employee_id: &UserId,
        context: &AuditContext,
    ) -> Result<Expense, WorkflowError> {
        validate_draft(&draft, self.settings.min_description_len)?;

        let employee = self.require_user(employee_id).await?;
        let company_id = employee
            .company_id
            .clone()
            .ok_or_else(|| ValidationError::MissingCompany { user_id: employee.id.0.clone() })?;

        let matcher = RuleMatcher::new(self.store.list_rules(&company_id).await?);
        let matched_rule = matcher.match_rule(&company_id, draft.amount).map(|rule| rule.id.clone());
        let chain = plan_chain(&matcher, &employee, &company_id, draft.amount);
        let manager_prepended = chain.as_ref().is_some_and(|chain| chain.manager_prepended);

        let now = timestamp_now();
        let id = ExpenseId::generate();
        let (status, steps) = match chain {
            Some(chain) => (ExpenseStatus::InReview, chain.into_steps(&id)),
            None if self.settings.auto_approve_unmatched => (ExpenseStatus::Approved, Vec::new()),
            None => (ExpenseStatus::Pending, Vec::new()),
        };

        let expense = Expense {
            id,
            employee_id: employee.id.clone(),
            company_id,
            amount: draft.amount,
            currency: draft.currency.trim().to_ascii_uppercase(),
            category: draft.category.trim().to_string(),
            description: draft.description.trim().to_string(),
            date: draft.date,
            receipt_ref: draft.receipt_ref.filter(|receipt| !receipt.trim().is_empty()),
            status,
            current_approver_index: 0,
            created_at: now,
            updated_at: now,
        };

        let approvers = steps.len();
        self.store.create_expense(expense.clone(), steps).await?;

        info!(
            event_name = "expense.submitted",
            correlation_id = %context.correlation_id,
            expense_id = %expense.id.0,
            status = expense.status.as_str(),
            approvers,
            "expense submitted"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(expense.id.clone()),
                context,
                "expense.submitted",
                AuditCategory::Submission,
                AuditOutcome::Success,
            )
            .with_metadata("status", expense.status.as_str())
            .with_metadata("amount", expense.amount.to_string())
            .with_metadata(
                "rule_id",
                matched_rule.map(|rule_id| rule_id.0).unwrap_or_else(|| "none".to_string()),
            )
            .with_metadata("approvers", approvers.to_string())
            .with_metadata("manager_prepended", manager_prepended.to_string()),
        );

        Ok(expense)
    }

    pub async fn decide(
        &self,
        expense_id: &ExpenseId,
        approver_id: &UserId,
        action: DecisionAction,
        comment: Option<&str>,
        context: &AuditContext,
    ) -> Result<DecisionReceipt, WorkflowError> {
        let _guard = self.locks.acquire(expense_id).await;

        let result = self.decide_locked(expense_id, approver_id, action, comment).await;
        match &result {
            Ok(receipt) => {
                info!(
                    event_name = "expense.step_decided",
                    correlation_id = %context.correlation_id,
                    expense_id = %expense_id.0,
                    approver_id = %approver_id.0,
                    action = action.as_str(),
                    status = receipt.expense.status.as_str(),
                    "approval step decided"
                );
                self.audit.emit(
                    AuditEvent::new(
                        Some(expense_id.clone()),
                        context,
                        "expense.step_decided",
                        AuditCategory::Decision,
                        AuditOutcome::Success,
                    )
                    .with_metadata("action", action.as_str())
                    .with_metadata("sequence", receipt.outcome.step.sequence.to_string())
                    .with_metadata("from", receipt.outcome.from.as_str())
                    .with_metadata("to", receipt.outcome.to.as_str()),
                );
            }
            Err(error) => {
                warn!(
                    event_name = "expense.decision_refused",
                    correlation_id = %context.correlation_id,
                    expense_id = %expense_id.0,
                    approver_id = %approver_id.0,
                    error_class = error.class(),
                    error = %error,
                    "decision refused"
                );
                let outcome = match error {
                    WorkflowError::Persistence(_) => AuditOutcome::Failed,
                    _ => AuditOutcome::Rejected,
                };
                self.audit.emit(
                    AuditEvent::new(
                        Some(expense_id.clone()),
                        context,
                        "expense.decision_refused",
                        AuditCategory::Decision,
                        outcome,
                    )
                    .with_metadata("action", action.as_str())
                    .with_metadata("error_class", error.class())
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }

    async fn decide_locked(
        &self,
        expense_id: &ExpenseId,
        approver_id: &UserId,
        action: DecisionAction,
        comment: Option<&str>,
    ) -> Result<DecisionReceipt, WorkflowError> {
        let expense = self.require_expense(expense_id).await?;
        let actor = self.require_user(approver_id).await?;
        if !actor.belongs_to(&expense.company_id) {
            return Err(WorkflowError::Authorization(format!(
                "user `{}` does not belong to the company of expense `{}`",
                actor.id.0, expense.id.0
            )));
        }
        if !actor.role.can_approve() {
            return Err(WorkflowError::Authorization(format!(
                "user `{}` has role `{}` and cannot approve expenses",
                actor.id.0,
                actor.role.as_str()
            )));
        }

        let steps = self.store.list_steps(&expense.id).await?;
        let now = timestamp_now();
        let outcome = self.machine.decide(&expense, &steps, &actor.id, action, comment, now)?;

        let mut updated = expense.clone();
        updated.status = outcome.to;
        updated.current_approver_index = outcome.current_index;
        updated.updated_at = now;

        let commit = DecisionCommit {
            expense: updated.clone(),
            expected_status: expense.status,
            expected_index: expense.current_approver_index,
            step: outcome.step.clone(),
        };
        match self.store.commit_decision(commit).await? {
            CommitOutcome::Applied => Ok(DecisionReceipt { expense: updated, outcome }),
            CommitOutcome::Stale => Err(WorkflowError::Conflict { expense_id: expense.id }),
        }
    }

    pub async fn get_chain(&self, expense_id: &ExpenseId) -> Result<Vec<ChainEntry>, WorkflowError> {
        let expense = self.require_expense(expense_id).await?;
        let mut steps = self.store.list_steps(expense_id).await?;
        steps.sort_by_key(|step| step.sequence);

        if let Err(violation) = verify_chain(&expense, &steps) {
            warn!(
                event_name = "expense.chain_inconsistent",
                expense_id = %expense_id.0,
                reason = %violation.reason,
                "approval chain failed consistency check"
            );
        }

        let current = open_gate(&expense, &steps).map(|step| step.id.clone());
        let names = self.approver_names(&steps).await?;

        Ok(steps
            .into_iter()
            .map(|step| ChainEntry {
                current: current.as_ref() == Some(&step.id),
                approver_name: names.get(&step.approver_id.0).cloned(),
                step_id: step.id,
                sequence: step.sequence,
                approver_id: step.approver_id,
                status: step.status,
                comment: step.comment,
                decided_at: step.decided_at,
            })
            .collect())
    }

    pub async fn find_expense(&self, expense_id: &ExpenseId) -> Result<Expense, WorkflowError> {
        self.require_expense(expense_id).await
    }

    /// Expenses currently waiting on `approver_id`.
    pub async fn inbox(&self, approver_id: &UserId) -> Result<Vec<Expense>, WorkflowError> {
        self.require_user(approver_id).await?;
        Ok(self.store.list_awaiting_approver(approver_id).await?)
    }

    pub async fn list_by_employee(&self, employee_id: &UserId) -> Result<Vec<Expense>, WorkflowError> {
        self.require_user(employee_id).await?;
        Ok(self.store.list_by_employee(employee_id).await?)
    }

    pub async fn list_by_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<Expense>, WorkflowError> {
        if self.store.find_company(company_id).await?.is_none() {
            return Err(WorkflowError::not_found("company", company_id.0.clone()));
        }
        Ok(self.store.list_by_company(company_id).await?)
    }

    async fn require_user(&self, id: &UserId) -> Result<User, WorkflowError> {
        self.store.find_user(id).await?.ok_or_else(|| WorkflowError::not_found("user", id.0.clone()))
    }

    async fn require_expense(&self, id: &ExpenseId) -> Result<Expense, WorkflowError> {
        self.store
            .find_expense(id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("expense", id.0.clone()))
    }

    async fn approver_names(
        &self,
        steps: &[ApprovalStep],
    ) -> Result<HashMap<String, String>, WorkflowError> {
        let mut names = HashMap::new();
        for step in steps {
            if names.contains_key(&step.approver_id.0) {
                continue;
            }
            if let Some(user) = self.store.find_user(&step.approver_id).await? {
                names.insert(user.id.0, user.name);
            }
        }
        Ok(names)
    }
}
