use chrono::{DateTime, SubsecRound, Utc};

pub mod approval;
pub mod company;
pub mod expense;
pub mod user;

pub use approval::{ApprovalRule, ApprovalRuleId, ApprovalStep, ApprovalStepId, RuleKind, StepStatus};
pub use company::{Company, CompanyId};
pub use expense::{Expense, ExpenseDraft, ExpenseId, ExpenseStatus};
pub use user::{User, UserId, UserRole};

pub(crate) fn generate_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
}

/// Current UTC time truncated to microseconds, the resolution the SQL store keeps.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

#[cfg(test)]
mod tests {
    use chrono::Timelike;

    use super::timestamp_now;

    #[test]
    fn timestamps_carry_whole_microseconds() {
        assert_eq!(timestamp_now().nanosecond() % 1_000, 0);
    }
}
