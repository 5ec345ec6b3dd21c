use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::approval::{ApprovalRule, ApprovalRuleId, ApprovalStep, ApprovalStepId, StepStatus};
use crate::domain::company::CompanyId;
use crate::domain::expense::ExpenseId;
use crate::domain::user::{User, UserId};

/// Picks the rule governing an (amount, company) pair.
///
/// Rules are held in creation order so that overlapping ranges resolve to the
/// oldest rule; ties on `created_at` fall back to the rule id.
#[derive(Clone, Debug, Default)]
pub struct RuleMatcher {
    rules: Vec<ApprovalRule>,
}

impl RuleMatcher {
    pub fn new(mut rules: Vec<ApprovalRule>) -> Self {
        rules.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.cmp(&right.id))
        });
        Self { rules }
    }

    pub fn match_rule(&self, company_id: &CompanyId, amount: Decimal) -> Option<&ApprovalRule> {
        self.rules.iter().find(|rule| rule.covers(company_id, amount))
    }
}

/// Ordered approvers materialised for one expense.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalChain {
    pub rule_id: ApprovalRuleId,
    pub approvers: Vec<UserId>,
    pub manager_prepended: bool,
}

impl ApprovalChain {
    /// Prepends the employee's manager when the rule asks for it. Repeated
    /// approvers are kept: each occurrence is its own gate.
    pub fn build(rule: &ApprovalRule, employee: &User) -> Self {
        let manager = employee.manager_id.as_ref().filter(|_| rule.is_manager_approver);

        let mut approvers = Vec::with_capacity(rule.approver_sequence.len() + 1);
        if let Some(manager_id) = manager {
            approvers.push(manager_id.clone());
        }
        approvers.extend(rule.approver_sequence.iter().cloned());

        Self { rule_id: rule.id.clone(), approvers, manager_prepended: manager.is_some() }
    }

    pub fn is_empty(&self) -> bool {
        self.approvers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.approvers.len()
    }

    /// One pending step per approver, `sequence` being the position in the chain.
    pub fn into_steps(self, expense_id: &ExpenseId) -> Vec<ApprovalStep> {
        self.approvers
            .into_iter()
            .zip(0u32..)
            .map(|(approver_id, sequence)| ApprovalStep {
                id: ApprovalStepId::generate(),
                expense_id: expense_id.clone(),
                approver_id,
                sequence,
                status: StepStatus::Pending,
                comment: None,
                decided_at: None,
            })
            .collect()
    }
}

/// Matches a rule and builds its chain. `None` when nothing matches or the
/// matched rule yields no approvers; both mean the expense needs no sign-off.
pub fn plan_chain(
    matcher: &RuleMatcher,
    employee: &User,
    company_id: &CompanyId,
    amount: Decimal,
) -> Option<ApprovalChain> {
    let rule = matcher.match_rule(company_id, amount)?;
    let chain = ApprovalChain::build(rule, employee);
    (!chain.is_empty()).then_some(chain)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use super::{plan_chain, ApprovalChain, RuleMatcher};
    use crate::domain::approval::{ApprovalRule, ApprovalRuleId, RuleKind, StepStatus};
    use crate::domain::company::CompanyId;
    use crate::domain::expense::ExpenseId;
    use crate::domain::user::{User, UserId, UserRole};

    fn company() -> CompanyId {
        CompanyId("co-acme".to_string())
    }

    fn rule(
        id: &str,
        min_amount: Option<i64>,
        max_amount: Option<i64>,
        sequence: &[&str],
        is_manager_approver: bool,
        age_minutes: i64,
    ) -> ApprovalRule {
        ApprovalRule {
            id: ApprovalRuleId(id.to_string()),
            company_id: company(),
            name: id.to_string(),
            kind: RuleKind::Percentage { threshold: 100 },
            min_amount: min_amount.map(|value| Decimal::new(value, 0)),
            max_amount: max_amount.map(|value| Decimal::new(value, 0)),
            approver_sequence: sequence.iter().map(|id| UserId((*id).to_string())).collect(),
            is_manager_approver,
            created_at: Utc::now() - Duration::minutes(age_minutes),
        }
    }

    fn employee(manager: Option<&str>) -> User {
        User {
            id: UserId("u-emp".to_string()),
            email: "emp@acme.test".to_string(),
            name: "Emp".to_string(),
            role: UserRole::Employee,
            manager_id: manager.map(|id| UserId(id.to_string())),
            company_id: Some(company()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn matcher_selects_rule_whose_range_contains_amount() {
        let matcher = RuleMatcher::new(vec![
            rule("rule-small", Some(0), Some(1000), &["mgr-approver"], false, 10),
            rule("rule-large", Some(1001), None, &["cfo"], false, 5),
        ]);

        let small = matcher.match_rule(&company(), Decimal::new(500, 0)).expect("small rule");
        let large = matcher.match_rule(&company(), Decimal::new(5000, 0)).expect("large rule");

        assert_eq!(small.id.0, "rule-small");
        assert_eq!(large.id.0, "rule-large");
    }

    #[test]
    fn overlapping_rules_resolve_to_oldest() {
        let matcher = RuleMatcher::new(vec![
            rule("rule-newer-default", None, None, &["b"], false, 1),
            rule("rule-older-range", Some(0), Some(100), &["a"], false, 60),
        ]);

        let matched = matcher.match_rule(&company(), Decimal::new(50, 0)).expect("match");
        assert_eq!(matched.id.0, "rule-older-range");

        let fallback = matcher.match_rule(&company(), Decimal::new(500, 0)).expect("default");
        assert_eq!(fallback.id.0, "rule-newer-default");
    }

    #[test]
    fn amount_outside_every_range_matches_nothing() {
        let matcher = RuleMatcher::new(vec![rule("rule-a", Some(0), Some(1000), &["a"], false, 1)]);

        assert!(matcher.match_rule(&company(), Decimal::new(1500, 0)).is_none());
        assert!(matcher
            .match_rule(&CompanyId("co-other".to_string()), Decimal::new(10, 0))
            .is_none());
    }

    #[test]
    fn manager_is_prepended_when_rule_requests_it() {
        let rule = rule("rule-a", None, None, &["finance"], true, 1);
        let chain = ApprovalChain::build(&rule, &employee(Some("M")));

        assert!(chain.manager_prepended);
        assert_eq!(
            chain.approvers,
            vec![UserId("M".to_string()), UserId("finance".to_string())]
        );
    }

    #[test]
    fn sequence_is_used_verbatim_without_manager() {
        let with_flag = rule("rule-a", None, None, &["finance"], true, 1);
        let without_flag = rule("rule-b", None, None, &["finance"], false, 1);

        let no_manager = ApprovalChain::build(&with_flag, &employee(None));
        let flag_off = ApprovalChain::build(&without_flag, &employee(Some("M")));

        assert_eq!(no_manager.approvers, vec![UserId("finance".to_string())]);
        assert!(!no_manager.manager_prepended);
        assert_eq!(flag_off.approvers, vec![UserId("finance".to_string())]);
    }

    #[test]
    fn repeated_approver_keeps_both_gates() {
        let rule = rule("rule-a", None, None, &["M", "finance"], true, 1);
        let chain = ApprovalChain::build(&rule, &employee(Some("M")));

        assert_eq!(chain.len(), 3);
        assert_eq!(chain.approvers[0], chain.approvers[1]);
    }

    #[test]
    fn steps_are_pending_and_contiguous() {
        let rule = rule("rule-a", None, None, &["a", "b", "c"], false, 1);
        let steps = ApprovalChain::build(&rule, &employee(None))
            .into_steps(&ExpenseId("exp-1".to_string()));

        assert_eq!(steps.iter().map(|step| step.sequence).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(steps.iter().all(|step| step.status == StepStatus::Pending));
        assert!(steps.iter().all(|step| step.expense_id.0 == "exp-1"));
    }

    #[test]
    fn empty_chain_plans_as_no_approval() {
        let matcher = RuleMatcher::new(vec![rule("rule-empty", None, None, &[], true, 1)]);

        assert!(plan_chain(&matcher, &employee(None), &company(), Decimal::ONE).is_none());
        assert!(plan_chain(&matcher, &employee(Some("M")), &company(), Decimal::ONE).is_some());
    }
}
