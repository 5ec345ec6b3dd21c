use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::approval::{ApprovalRule, ApprovalStep};
use crate::domain::company::{Company, CompanyId};
use crate::domain::expense::{Expense, ExpenseId, ExpenseStatus};
use crate::domain::user::{User, UserId};
use crate::workflow::store::{
    CommitOutcome, DecisionCommit, DirectoryStore, ExpenseStore, RuleStore, StoreError,
};

#[derive(Default)]
struct State {
    companies: HashMap<String, Company>,
    users: HashMap<String, User>,
    rules: Vec<ApprovalRule>,
    expenses: HashMap<String, Expense>,
    steps: HashMap<String, Vec<ApprovalStep>>,
}

impl State {
    fn ensure_email_free(&self, user: &User) -> Result<(), StoreError> {
        let taken = self
            .users
            .values()
            .any(|other| other.id != user.id && other.email.eq_ignore_ascii_case(&user.email));
        if taken {
            return Err(StoreError::Duplicate(format!("email `{}` is already registered", user.email)));
        }
        Ok(())
    }
}

/// Process-local store. One lock guards every table, so multi-row writes are
/// atomic with respect to readers.
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    state: RwLock<State>,
}

fn newest_first(mut expenses: Vec<Expense>) -> Vec<Expense> {
    expenses.sort_by(|left, right| {
        right.created_at.cmp(&left.created_at).then_with(|| right.id.cmp(&left.id))
    });
    expenses
}

#[async_trait]
impl DirectoryStore for InMemoryWorkflowStore {
    async fn find_user(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        let state = self.state.read().await;
        Ok(state.users.get(&id.0).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let state = self.state.read().await;
        Ok(state.users.values().find(|user| user.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn list_users_by_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<User>, StoreError> {
        let state = self.state.read().await;
        let mut users: Vec<User> =
            state.users.values().filter(|user| user.belongs_to(company_id)).cloned().collect();
        users.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.cmp(&right.id))
        });
        Ok(users)
    }

    async fn save_user(&self, user: User) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.ensure_email_free(&user)?;
        state.users.insert(user.id.0.clone(), user);
        Ok(())
    }

    async fn find_company(&self, id: &CompanyId) -> Result<Option<Company>, StoreError> {
        let state = self.state.read().await;
        Ok(state.companies.get(&id.0).cloned())
    }

    async fn save_company(&self, company: Company) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.companies.insert(company.id.0.clone(), company);
        Ok(())
    }

    async fn create_company_with_admin(
        &self,
        company: Company,
        admin: User,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.companies.contains_key(&company.id.0) {
            return Err(StoreError::Duplicate(format!("company `{}` already exists", company.id.0)));
        }
        state.ensure_email_free(&admin)?;
        state.companies.insert(company.id.0.clone(), company);
        state.users.insert(admin.id.0.clone(), admin);
        Ok(())
    }
}

#[async_trait]
impl RuleStore for InMemoryWorkflowStore {
    async fn list_rules(&self, company_id: &CompanyId) -> Result<Vec<ApprovalRule>, StoreError> {
        let state = self.state.read().await;
        let mut rules: Vec<ApprovalRule> =
            state.rules.iter().filter(|rule| &rule.company_id == company_id).cloned().collect();
        rules.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.cmp(&right.id))
        });
        Ok(rules)
    }

    async fn save_rule(&self, rule: ApprovalRule) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        match state.rules.iter_mut().find(|existing| existing.id == rule.id) {
            Some(existing) => *existing = rule,
            None => state.rules.push(rule),
        }
        Ok(())
    }
}

#[async_trait]
impl ExpenseStore for InMemoryWorkflowStore {
    async fn create_expense(
        &self,
        expense: Expense,
        mut steps: Vec<ApprovalStep>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.expenses.contains_key(&expense.id.0) {
            return Err(StoreError::Backend(format!("expense `{}` already exists", expense.id.0)));
        }
        steps.sort_by_key(|step| step.sequence);
        state.steps.insert(expense.id.0.clone(), steps);
        state.expenses.insert(expense.id.0.clone(), expense);
        Ok(())
    }

    async fn find_expense(&self, id: &ExpenseId) -> Result<Option<Expense>, StoreError> {
        let state = self.state.read().await;
        Ok(state.expenses.get(&id.0).cloned())
    }

    async fn list_steps(&self, expense_id: &ExpenseId) -> Result<Vec<ApprovalStep>, StoreError> {
        let state = self.state.read().await;
        Ok(state.steps.get(&expense_id.0).cloned().unwrap_or_default())
    }

    async fn commit_decision(&self, commit: DecisionCommit) -> Result<CommitOutcome, StoreError> {
        let mut state = self.state.write().await;
        let key = commit.expense.id.0.clone();

        let expense_current = state.expenses.get(&key).is_some_and(|stored| {
            stored.status == commit.expected_status
                && stored.current_approver_index == commit.expected_index
        });
        let step_open = state.steps.get(&key).is_some_and(|steps| {
            steps.iter().any(|step| step.id == commit.step.id && step.is_open())
        });
        if !expense_current || !step_open {
            return Ok(CommitOutcome::Stale);
        }

        if let Some(steps) = state.steps.get_mut(&key) {
            if let Some(step) = steps.iter_mut().find(|step| step.id == commit.step.id) {
                *step = commit.step;
            }
        }
        state.expenses.insert(key, commit.expense);
        Ok(CommitOutcome::Applied)
    }

    async fn list_by_employee(&self, employee_id: &UserId) -> Result<Vec<Expense>, StoreError> {
        let state = self.state.read().await;
        Ok(newest_first(
            state
                .expenses
                .values()
                .filter(|expense| &expense.employee_id == employee_id)
                .cloned()
                .collect(),
        ))
    }

    async fn list_by_company(&self, company_id: &CompanyId) -> Result<Vec<Expense>, StoreError> {
        let state = self.state.read().await;
        Ok(newest_first(
            state
                .expenses
                .values()
                .filter(|expense| &expense.company_id == company_id)
                .cloned()
                .collect(),
        ))
    }

    async fn list_awaiting_approver(
        &self,
        approver_id: &UserId,
    ) -> Result<Vec<Expense>, StoreError> {
        let state = self.state.read().await;
        let mut awaiting: Vec<Expense> = state
            .expenses
            .values()
            .filter(|expense| expense.status == ExpenseStatus::InReview)
            .filter(|expense| {
                state.steps.get(&expense.id.0).is_some_and(|steps| {
                    steps.iter().any(|step| {
                        step.sequence == expense.current_approver_index
                            && step.is_open()
                            && &step.approver_id == approver_id
                    })
                })
            })
            .cloned()
            .collect();
        awaiting.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.cmp(&right.id))
        });
        Ok(awaiting)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, Utc};
    use rust_decimal::Decimal;

    use crate::domain::approval::{ApprovalStep, ApprovalStepId, StepStatus};
    use crate::domain::company::{Company, CompanyId};
    use crate::domain::expense::{Expense, ExpenseId, ExpenseStatus};
    use crate::domain::user::{User, UserId, UserRole};
    use crate::workflow::memory::InMemoryWorkflowStore;
    use crate::workflow::store::{
        CommitOutcome, DecisionCommit, DirectoryStore, ExpenseStore, StoreError,
    };

    fn expense(id: &str, age_minutes: i64) -> Expense {
        let created_at = Utc::now() - Duration::minutes(age_minutes);
        Expense {
            id: ExpenseId(id.to_string()),
            employee_id: UserId("u-emp".to_string()),
            company_id: CompanyId("co-1".to_string()),
            amount: Decimal::new(12_000, 2),
            currency: "EUR".to_string(),
            category: "meals".to_string(),
            description: "Team dinner after launch".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 5, 1).expect("valid date"),
            receipt_ref: None,
            status: ExpenseStatus::InReview,
            current_approver_index: 0,
            created_at,
            updated_at: created_at,
        }
    }

    fn step(expense_id: &str, approver: &str, sequence: u32) -> ApprovalStep {
        ApprovalStep {
            id: ApprovalStepId(format!("{expense_id}-step-{sequence}")),
            expense_id: ExpenseId(expense_id.to_string()),
            approver_id: UserId(approver.to_string()),
            sequence,
            status: StepStatus::Pending,
            comment: None,
            decided_at: None,
        }
    }

    fn member(id: &str, email: &str) -> User {
        User {
            id: UserId(id.to_string()),
            email: email.to_string(),
            name: id.to_string(),
            role: UserRole::Manager,
            manager_id: None,
            company_id: Some(CompanyId("co-1".to_string())),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn email_lookup_ignores_case() {
        let store = InMemoryWorkflowStore::default();
        store.save_user(member("u-1", "Ana@Acme.test")).await.expect("save user");

        let found = store.find_user_by_email("ana@acme.test").await.expect("lookup");
        assert_eq!(found.map(|user| user.id.0), Some("u-1".to_string()));
    }

    #[tokio::test]
    async fn taken_email_refuses_other_users_but_not_the_holder() {
        let store = InMemoryWorkflowStore::default();
        store.save_user(member("u-1", "ana@acme.test")).await.expect("save user");

        let clash = store.save_user(member("u-2", "ANA@acme.test")).await;
        assert!(matches!(clash, Err(StoreError::Duplicate(_))));

        let mut renamed = member("u-1", "ana@acme.test");
        renamed.name = "Ana Maria".to_string();
        store.save_user(renamed).await.expect("holder may update itself");
    }

    #[tokio::test]
    async fn failed_signup_leaves_no_company_behind() {
        let store = InMemoryWorkflowStore::default();
        store.save_user(member("u-1", "ana@acme.test")).await.expect("save user");
        let company = Company {
            id: CompanyId("co-2".to_string()),
            name: "Globex".to_string(),
            country: "Spain".to_string(),
            base_currency: "EUR".to_string(),
            created_at: Utc::now(),
        };

        let result =
            store.create_company_with_admin(company.clone(), member("u-2", "ana@acme.test")).await;

        assert!(matches!(result, Err(StoreError::Duplicate(_))));
        assert_eq!(store.find_company(&company.id).await.expect("find"), None);
        assert_eq!(store.find_user(&UserId("u-2".to_string())).await.expect("find"), None);
    }

    #[tokio::test]
    async fn stale_commit_is_refused_and_leaves_state_untouched() {
        let store = InMemoryWorkflowStore::default();
        let original = expense("exp-1", 1);
        store
            .create_expense(original.clone(), vec![step("exp-1", "M", 0), step("exp-1", "F", 1)])
            .await
            .expect("create");

        let mut advanced = original.clone();
        advanced.current_approver_index = 1;
        let mut decided = step("exp-1", "M", 0);
        decided.status = StepStatus::Approved;
        decided.decided_at = Some(Utc::now());

        let commit = DecisionCommit {
            expense: advanced,
            expected_status: ExpenseStatus::InReview,
            expected_index: 0,
            step: decided,
        };
        assert_eq!(
            store.commit_decision(commit.clone()).await.expect("first commit"),
            CommitOutcome::Applied
        );
        assert_eq!(
            store.commit_decision(commit).await.expect("second commit"),
            CommitOutcome::Stale
        );

        let stored = store.find_expense(&original.id).await.expect("find").expect("exists");
        assert_eq!(stored.current_approver_index, 1);
    }

    #[tokio::test]
    async fn listings_are_ordered_and_inbox_follows_the_cursor() {
        let store = InMemoryWorkflowStore::default();
        store
            .create_expense(expense("exp-old", 30), vec![step("exp-old", "M", 0)])
            .await
            .expect("create old");
        store
            .create_expense(expense("exp-new", 5), vec![step("exp-new", "F", 0), step("exp-new", "M", 1)])
            .await
            .expect("create new");

        let listed = store.list_by_employee(&UserId("u-emp".to_string())).await.expect("list");
        assert_eq!(
            listed.iter().map(|expense| expense.id.0.as_str()).collect::<Vec<_>>(),
            vec!["exp-new", "exp-old"]
        );

        let inbox = store.list_awaiting_approver(&UserId("M".to_string())).await.expect("inbox");
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].id.0, "exp-old");
    }
}
