use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::company::CompanyId;
use crate::domain::user::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExpenseId(pub String);

impl ExpenseId {
    pub fn generate() -> Self {
        Self(super::generate_id("exp"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExpenseStatus {
    Pending,
    InReview,
    Approved,
    Rejected,
}

impl ExpenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InReview => "in-review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "in-review" | "in_review" => Some(Self::InReview),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

/// What an employee hands in; ids, status and timestamps are assigned on submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseDraft {
    pub amount: Decimal,
    pub currency: String,
    pub category: String,
    pub description: String,
    pub date: NaiveDate,
    pub receipt_ref: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub employee_id: UserId,
    pub company_id: CompanyId,
    pub amount: Decimal,
    pub currency: String,
    pub category: String,
    pub description: String,
    pub date: NaiveDate,
    pub receipt_ref: Option<String>,
    pub status: ExpenseStatus,
    /// Position of the open gate in the approval chain.
    pub current_approver_index: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::ExpenseStatus;

    #[test]
    fn status_strings_use_kebab_case() {
        assert_eq!(ExpenseStatus::InReview.as_str(), "in-review");
        assert_eq!(ExpenseStatus::parse("in-review"), Some(ExpenseStatus::InReview));
        assert_eq!(
            serde_json::to_string(&ExpenseStatus::InReview).expect("serialize"),
            "\"in-review\""
        );
    }

    #[test]
    fn only_approved_and_rejected_are_terminal() {
        assert!(ExpenseStatus::Approved.is_terminal());
        assert!(ExpenseStatus::Rejected.is_terminal());
        assert!(!ExpenseStatus::Pending.is_terminal());
        assert!(!ExpenseStatus::InReview.is_terminal());
    }
}
