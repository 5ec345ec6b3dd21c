pub mod admin;
pub mod approvals;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod workflow;

pub use admin::{CompanyRegistration, DirectoryAdmin, NewUser, RuleAdmin, RuleDraft};
pub use approvals::{plan_chain, ApprovalChain, RuleMatcher};
pub use audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use domain::approval::{ApprovalRule, ApprovalRuleId, ApprovalStep, RuleKind, StepStatus};
pub use domain::company::{Company, CompanyId};
pub use domain::expense::{Expense, ExpenseDraft, ExpenseId, ExpenseStatus};
pub use domain::user::{User, UserId, UserRole};
pub use errors::{InterfaceError, ValidationError, WorkflowError};
pub use flows::{ApprovalStateMachine, DecisionAction, DecisionOutcome};
pub use workflow::{
    ChainEntry, DecisionReceipt, InMemoryWorkflowStore, WorkflowService, WorkflowSettings,
    WorkflowStore,
};
