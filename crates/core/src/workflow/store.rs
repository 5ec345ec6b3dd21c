use async_trait::async_trait;
use thiserror::Error;

use crate::domain::approval::{ApprovalRule, ApprovalStep};
use crate::domain::company::{Company, CompanyId};
use crate::domain::expense::{Expense, ExpenseId, ExpenseStatus};
use crate::domain::user::{User, UserId};
use crate::errors::WorkflowError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("decode error: {0}")]
    Decode(String),
    /// A uniqueness constraint refused the write.
    #[error("duplicate record: {0}")]
    Duplicate(String),
}

impl From<StoreError> for WorkflowError {
    fn from(value: StoreError) -> Self {
        Self::Persistence(value.to_string())
    }
}

#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn find_user(&self, id: &UserId) -> Result<Option<User>, StoreError>;
    /// Email lookup ignores ASCII case.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn list_users_by_company(&self, company_id: &CompanyId)
        -> Result<Vec<User>, StoreError>;
    /// Upsert by id. A different user already holding the email is `Duplicate`.
    async fn save_user(&self, user: User) -> Result<(), StoreError>;
    async fn find_company(&self, id: &CompanyId) -> Result<Option<Company>, StoreError>;
    async fn save_company(&self, company: Company) -> Result<(), StoreError>;
    /// Inserts a new company together with its first admin, all or nothing.
    async fn create_company_with_admin(
        &self,
        company: Company,
        admin: User,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Rules of one company, oldest first.
    async fn list_rules(&self, company_id: &CompanyId) -> Result<Vec<ApprovalRule>, StoreError>;
    async fn save_rule(&self, rule: ApprovalRule) -> Result<(), StoreError>;
}

/// Everything written by one decision, applied only if the expense is still
/// where the decision found it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecisionCommit {
    pub expense: Expense,
    pub expected_status: ExpenseStatus,
    pub expected_index: u32,
    pub step: ApprovalStep,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied,
    Stale,
}

#[async_trait]
pub trait ExpenseStore: Send + Sync {
    /// Inserts the expense with its full chain, all or nothing.
    async fn create_expense(
        &self,
        expense: Expense,
        steps: Vec<ApprovalStep>,
    ) -> Result<(), StoreError>;
    async fn find_expense(&self, id: &ExpenseId) -> Result<Option<Expense>, StoreError>;
    /// Steps of one expense ordered by sequence.
    async fn list_steps(&self, expense_id: &ExpenseId) -> Result<Vec<ApprovalStep>, StoreError>;
    async fn commit_decision(&self, commit: DecisionCommit) -> Result<CommitOutcome, StoreError>;
    /// Newest first.
    async fn list_by_employee(&self, employee_id: &UserId) -> Result<Vec<Expense>, StoreError>;
    /// Newest first.
    async fn list_by_company(&self, company_id: &CompanyId) -> Result<Vec<Expense>, StoreError>;
    /// In-review expenses whose open gate belongs to `approver_id`, oldest first.
    async fn list_awaiting_approver(
        &self,
        approver_id: &UserId,
    ) -> Result<Vec<Expense>, StoreError>;
}

/// Single handle over the three stores, used by the workflow service.
pub trait WorkflowStore: DirectoryStore + RuleStore + ExpenseStore {}

impl<T> WorkflowStore for T where T: DirectoryStore + RuleStore + ExpenseStore {}
