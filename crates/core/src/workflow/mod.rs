//! Expense submission and approval orchestration over injected stores.

pub mod locks;
pub mod memory;
pub mod service;
pub mod store;
pub mod validation;

pub use locks::ExpenseLocks;
pub use memory::InMemoryWorkflowStore;
pub use service::{ChainEntry, DecisionReceipt, WorkflowService, WorkflowSettings};
pub use store::{
    CommitOutcome, DecisionCommit, DirectoryStore, ExpenseStore, RuleStore, StoreError,
    WorkflowStore,
};
pub use validation::{
    check_amount_scale, validate_draft, DEFAULT_MIN_DESCRIPTION_LEN, MAX_AMOUNT_SCALE,
};
