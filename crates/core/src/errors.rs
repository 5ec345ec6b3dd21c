use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::expense::ExpenseId;

/// A single failed input check. The first failing check is reported.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("amount must be positive, got {amount}")]
    NonPositiveAmount { amount: Decimal },
    #[error("amount must not be negative, got {amount}")]
    NegativeAmount { amount: Decimal },
    #[error("amount {amount} has more than {max_scale} decimal places")]
    ExcessAmountPrecision { amount: Decimal, max_scale: u32 },
    #[error("{field} is required")]
    MissingField { field: &'static str },
    #[error("currency `{currency}` must be a three-letter ISO code")]
    InvalidCurrency { currency: String },
    #[error("description must be at least {min_len} characters, got {actual_len}")]
    DescriptionTooShort { min_len: usize, actual_len: usize },
    #[error("percentage threshold must be within 0..=100, got {threshold}")]
    ThresholdOutOfRange { threshold: u8 },
    #[error("min_amount {min_amount} exceeds max_amount {max_amount}")]
    InvertedAmountRange { min_amount: Decimal, max_amount: Decimal },
    #[error("`{email}` is not a valid email address")]
    InvalidEmail { email: String },
    #[error("email `{email}` is already registered")]
    DuplicateEmail { email: String },
    #[error("user `{user_id}` does not belong to company `{company_id}`")]
    ForeignUser { user_id: String, company_id: String },
    #[error("user `{user_id}` has role `{role}` and cannot approve expenses")]
    IneligibleApprover { user_id: String, role: String },
    #[error("user `{user_id}` cannot be their own manager")]
    SelfManaged { user_id: String },
    #[error("user `{user_id}` is not attached to a company")]
    MissingCompany { user_id: String },
    #[error("user `{user_id}` still manages {reports} users and must keep an approving role")]
    ManagerWithReports { user_id: String, reports: usize },
    #[error("user `{user_id}` approves under rule `{rule_id}` and must keep an approving role")]
    ApproverInRule { user_id: String, rule_id: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
    #[error("not authorized: {0}")]
    Authorization(String),
    #[error("expense `{}` was decided concurrently", .expense_id.0)]
    Conflict { expense_id: ExpenseId },
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl WorkflowError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    /// Stable machine-readable class, shared by audit metadata and CLI output.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound { .. } => "not_found",
            Self::Authorization(_) => "authorization",
            Self::Conflict { .. } => "conflict",
            Self::Persistence(_) => "persistence",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::Forbidden { .. } => "You are not allowed to act on this expense right now.",
            Self::Conflict { .. } => "This expense was already handled by another request.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::Forbidden { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 409,
            Self::ServiceUnavailable { .. } => 503,
        }
    }
}

impl WorkflowError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<WorkflowError> for InterfaceError {
    fn from(value: WorkflowError) -> Self {
        let message = value.to_string();
        let correlation_id = "unassigned".to_owned();
        match value {
            WorkflowError::Validation(_) => Self::BadRequest { message, correlation_id },
            WorkflowError::NotFound { .. } => Self::NotFound { message, correlation_id },
            WorkflowError::Authorization(_) => Self::Forbidden { message, correlation_id },
            WorkflowError::Conflict { .. } => Self::Conflict { message, correlation_id },
            WorkflowError::Persistence(_) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
        }
    }
}
