use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::company::CompanyId;
use crate::domain::expense::ExpenseId;
use crate::domain::user::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApprovalRuleId(pub String);

impl ApprovalRuleId {
    pub fn generate() -> Self {
        Self(super::generate_id("rule"))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApprovalStepId(pub String);

impl ApprovalStepId {
    pub fn generate() -> Self {
        Self(super::generate_id("step"))
    }
}

/// Authoring-time flavour of a rule.
///
/// Decisions are always taken one gate at a time; the thresholds carried here are
/// stored for a consensus mode that the decision path does not read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleKind {
    Percentage { threshold: u8 },
    SpecificApprover { approver_id: UserId },
    Hybrid { threshold: u8, approver_id: UserId },
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Percentage { .. } => "percentage",
            Self::SpecificApprover { .. } => "specific_approver",
            Self::Hybrid { .. } => "hybrid",
        }
    }

    pub fn threshold(&self) -> Option<u8> {
        match self {
            Self::Percentage { threshold } | Self::Hybrid { threshold, .. } => Some(*threshold),
            Self::SpecificApprover { .. } => None,
        }
    }

    pub fn specific_approver(&self) -> Option<&UserId> {
        match self {
            Self::SpecificApprover { approver_id } | Self::Hybrid { approver_id, .. } => {
                Some(approver_id)
            }
            Self::Percentage { .. } => None,
        }
    }

    /// Rebuilds a kind from its flattened storage columns.
    pub fn from_parts(
        kind: &str,
        threshold: Option<u8>,
        approver_id: Option<UserId>,
    ) -> Option<Self> {
        match (kind.trim().to_ascii_lowercase().as_str(), threshold, approver_id) {
            ("percentage", Some(threshold), _) => Some(Self::Percentage { threshold }),
            ("specific_approver", _, Some(approver_id)) => {
                Some(Self::SpecificApprover { approver_id })
            }
            ("hybrid", Some(threshold), Some(approver_id)) => {
                Some(Self::Hybrid { threshold, approver_id })
            }
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRule {
    pub id: ApprovalRuleId,
    pub company_id: CompanyId,
    pub name: String,
    pub kind: RuleKind,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub approver_sequence: Vec<UserId>,
    pub is_manager_approver: bool,
    pub created_at: DateTime<Utc>,
}

impl ApprovalRule {
    /// Inclusive range check scoped to the owning company. Missing bounds are open.
    pub fn covers(&self, company_id: &CompanyId, amount: Decimal) -> bool {
        if &self.company_id != company_id {
            return false;
        }

        if let Some(min_amount) = self.min_amount {
            if amount < min_amount {
                return false;
            }
        }

        if let Some(max_amount) = self.max_amount {
            if amount > max_amount {
                return false;
            }
        }

        true
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Approved,
    Rejected,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// One gate in an expense's chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub id: ApprovalStepId,
    pub expense_id: ExpenseId,
    pub approver_id: UserId,
    pub sequence: u32,
    pub status: StepStatus,
    pub comment: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl ApprovalStep {
    pub fn is_open(&self) -> bool {
        self.status == StepStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{ApprovalRule, ApprovalRuleId, RuleKind};
    use crate::domain::company::CompanyId;
    use crate::domain::user::UserId;

    fn rule(min_amount: Option<Decimal>, max_amount: Option<Decimal>) -> ApprovalRule {
        ApprovalRule {
            id: ApprovalRuleId("rule-1".to_string()),
            company_id: CompanyId("co-1".to_string()),
            name: "travel".to_string(),
            kind: RuleKind::Percentage { threshold: 60 },
            min_amount,
            max_amount,
            approver_sequence: vec![UserId("u-finance".to_string())],
            is_manager_approver: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn bounds_are_inclusive() {
        let rule = rule(Some(Decimal::new(100, 0)), Some(Decimal::new(1000, 0)));
        let company = CompanyId("co-1".to_string());

        assert!(rule.covers(&company, Decimal::new(100, 0)));
        assert!(rule.covers(&company, Decimal::new(1000, 0)));
        assert!(!rule.covers(&company, Decimal::new(9999, 2)));
        assert!(!rule.covers(&company, Decimal::new(100001, 2)));
    }

    #[test]
    fn unbounded_rule_covers_every_amount_of_its_company_only() {
        let rule = rule(None, None);

        assert!(rule.covers(&CompanyId("co-1".to_string()), Decimal::new(1, 2)));
        assert!(rule.covers(&CompanyId("co-1".to_string()), Decimal::new(10_000_000, 0)));
        assert!(!rule.covers(&CompanyId("co-2".to_string()), Decimal::new(5, 0)));
    }

    #[test]
    fn kind_is_tagged_by_type() {
        let kind = RuleKind::Hybrid { threshold: 50, approver_id: UserId("u-cfo".to_string()) };
        let json = serde_json::to_value(&kind).expect("serialize kind");

        assert_eq!(json["type"], "hybrid");
        assert_eq!(json["threshold"], 50);
        assert_eq!(kind.specific_approver().map(|id| id.0.as_str()), Some("u-cfo"));
    }

    #[test]
    fn kind_rebuilds_from_storage_columns() {
        assert_eq!(
            RuleKind::from_parts("percentage", Some(70), None),
            Some(RuleKind::Percentage { threshold: 70 })
        );
        assert_eq!(RuleKind::from_parts("hybrid", Some(70), None), None);
        assert_eq!(RuleKind::from_parts("consensus", Some(70), None), None);
    }
}
