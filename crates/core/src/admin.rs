use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::approval::{ApprovalRule, ApprovalRuleId, RuleKind};
use crate::domain::company::{Company, CompanyId};
use crate::domain::timestamp_now;
use crate::domain::user::{User, UserId, UserRole};
use crate::errors::{ValidationError, WorkflowError};
use crate::workflow::store::{StoreError, WorkflowStore};
use crate::workflow::validation::check_amount_scale;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRegistration {
    pub company_name: String,
    pub country: String,
    pub base_currency: String,
    pub admin_name: String,
    pub admin_email: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub company_id: CompanyId,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub manager_id: Option<UserId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDraft {
    pub company_id: CompanyId,
    pub name: String,
    pub kind: RuleKind,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub approver_sequence: Vec<UserId>,
    pub is_manager_approver: bool,
}

fn required(value: &str, field: &'static str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField { field });
    }
    Ok(trimmed.to_string())
}

fn normalize_email(email: &str) -> Result<String, ValidationError> {
    let email = email.trim().to_ascii_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(email)
    } else {
        Err(ValidationError::InvalidEmail { email })
    }
}

fn normalize_currency(currency: &str) -> Result<String, ValidationError> {
    let currency = currency.trim();
    if currency.is_empty() {
        return Err(ValidationError::MissingField { field: "base_currency" });
    }
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::InvalidCurrency { currency: currency.to_string() });
    }
    Ok(currency.to_ascii_uppercase())
}

/// A uniqueness failure on a user write means the email was taken meanwhile.
fn email_taken(email: &str) -> impl FnOnce(StoreError) -> WorkflowError + '_ {
    move |error| match error {
        StoreError::Duplicate(_) => ValidationError::DuplicateEmail { email: email.to_string() }.into(),
        other => other.into(),
    }
}

/// Companies and their people.
pub struct DirectoryAdmin {
    store: Arc<dyn WorkflowStore>,
    audit: Arc<dyn AuditSink>,
}

impl DirectoryAdmin {
    pub fn new(store: Arc<dyn WorkflowStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    /// Signup: a new company and the admin who created it.
    pub async fn register_company(
        &self,
        registration: CompanyRegistration,
        context: &AuditContext,
    ) -> Result<(Company, User), WorkflowError> {
        let company_name = required(&registration.company_name, "company_name")?;
        let country = required(&registration.country, "country")?;
        let base_currency = normalize_currency(&registration.base_currency)?;
        let admin_name = required(&registration.admin_name, "admin_name")?;
        let admin_email = self.unused_email(&registration.admin_email).await?;

        let now = timestamp_now();
        let company = Company {
            id: CompanyId::generate(),
            name: company_name,
            country,
            base_currency,
            created_at: now,
        };
        let admin = User {
            id: UserId::generate(),
            email: admin_email,
            name: admin_name,
            role: UserRole::Admin,
            manager_id: None,
            company_id: Some(company.id.clone()),
            created_at: now,
        };

        self.store
            .create_company_with_admin(company.clone(), admin.clone())
            .await
            .map_err(email_taken(&admin.email))?;

        info!(
            event_name = "directory.company_registered",
            correlation_id = %context.correlation_id,
            company_id = %company.id.0,
            "company registered"
        );
        self.audit.emit(
            AuditEvent::new(
                None,
                context,
                "directory.company_registered",
                AuditCategory::Administration,
                AuditOutcome::Success,
            )
            .with_metadata("company_id", company.id.0.clone())
            .with_metadata("admin_id", admin.id.0.clone()),
        );

        Ok((company, admin))
    }

    pub async fn add_user(&self, new_user: NewUser, context: &AuditContext) -> Result<User, WorkflowError> {
        if self.store.find_company(&new_user.company_id).await?.is_none() {
            return Err(WorkflowError::not_found("company", new_user.company_id.0.clone()));
        }
        let name = required(&new_user.name, "name")?;
        let email = self.unused_email(&new_user.email).await?;

        let id = UserId::generate();
        if let Some(manager_id) = &new_user.manager_id {
            self.check_manager(&id, manager_id, &new_user.company_id).await?;
        }

        let user = User {
            id,
            email,
            name,
            role: new_user.role,
            manager_id: new_user.manager_id,
            company_id: Some(new_user.company_id),
            created_at: timestamp_now(),
        };
        self.store.save_user(user.clone()).await.map_err(email_taken(&user.email))?;

        self.audit.emit(
            AuditEvent::new(
                None,
                context,
                "directory.user_added",
                AuditCategory::Administration,
                AuditOutcome::Success,
            )
            .with_metadata("user_id", user.id.0.clone())
            .with_metadata("role", user.role.as_str()),
        );

        Ok(user)
    }

    /// Changes role and manager together; `manager_id: None` clears the manager.
    /// A user others depend on for approval cannot lose the approving role.
    pub async fn update_user(
        &self,
        user_id: &UserId,
        role: UserRole,
        manager_id: Option<UserId>,
        context: &AuditContext,
    ) -> Result<User, WorkflowError> {
        let mut user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("user", user_id.0.clone()))?;
        let company_id = user
            .company_id
            .clone()
            .ok_or_else(|| ValidationError::MissingCompany { user_id: user_id.0.clone() })?;

        if let Some(manager_id) = &manager_id {
            self.check_manager(user_id, manager_id, &company_id).await?;
        }
        if user.role.can_approve() && !role.can_approve() {
            self.check_not_relied_on(user_id, &company_id).await?;
        }

        user.role = role;
        user.manager_id = manager_id;
        self.store.save_user(user.clone()).await.map_err(email_taken(&user.email))?;

        self.audit.emit(
            AuditEvent::new(
                None,
                context,
                "directory.user_updated",
                AuditCategory::Administration,
                AuditOutcome::Success,
            )
            .with_metadata("user_id", user.id.0.clone())
            .with_metadata("role", user.role.as_str()),
        );

        Ok(user)
    }

    async fn unused_email(&self, email: &str) -> Result<String, WorkflowError> {
        let email = normalize_email(email)?;
        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(ValidationError::DuplicateEmail { email }.into());
        }
        Ok(email)
    }

    async fn check_manager(
        &self,
        user_id: &UserId,
        manager_id: &UserId,
        company_id: &CompanyId,
    ) -> Result<(), WorkflowError> {
        if manager_id == user_id {
            return Err(ValidationError::SelfManaged { user_id: user_id.0.clone() }.into());
        }
        let manager = self
            .store
            .find_user(manager_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("user", manager_id.0.clone()))?;
        check_approver(&manager, company_id)?;
        Ok(())
    }

    async fn check_not_relied_on(
        &self,
        user_id: &UserId,
        company_id: &CompanyId,
    ) -> Result<(), WorkflowError> {
        let reports = self
            .store
            .list_users_by_company(company_id)
            .await?
            .iter()
            .filter(|member| member.manager_id.as_ref() == Some(user_id))
            .count();
        if reports > 0 {
            return Err(ValidationError::ManagerWithReports { user_id: user_id.0.clone(), reports }.into());
        }

        let rules = self.store.list_rules(company_id).await?;
        let naming_rule = rules.iter().find(|rule| {
            rule.approver_sequence.contains(user_id) || rule.kind.specific_approver() == Some(user_id)
        });
        if let Some(rule) = naming_rule {
            return Err(ValidationError::ApproverInRule {
                user_id: user_id.0.clone(),
                rule_id: rule.id.0.clone(),
            }
            .into());
        }
        Ok(())
    }
}

fn check_approver(user: &User, company_id: &CompanyId) -> Result<(), ValidationError> {
    if !user.belongs_to(company_id) {
        return Err(ValidationError::ForeignUser {
            user_id: user.id.0.clone(),
            company_id: company_id.0.clone(),
        });
    }
    if !user.role.can_approve() {
        return Err(ValidationError::IneligibleApprover {
            user_id: user.id.0.clone(),
            role: user.role.as_str().to_string(),
        });
    }
    Ok(())
}

/// Authoring of approval rules.
pub struct RuleAdmin {
    store: Arc<dyn WorkflowStore>,
    audit: Arc<dyn AuditSink>,
}

impl RuleAdmin {
    pub fn new(store: Arc<dyn WorkflowStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    pub async fn create_rule(
        &self,
        draft: RuleDraft,
        context: &AuditContext,
    ) -> Result<ApprovalRule, WorkflowError> {
        if self.store.find_company(&draft.company_id).await?.is_none() {
            return Err(WorkflowError::not_found("company", draft.company_id.0.clone()));
        }
        let name = required(&draft.name, "name")?;

        if let Some(threshold) = draft.kind.threshold() {
            if threshold > 100 {
                return Err(ValidationError::ThresholdOutOfRange { threshold }.into());
            }
        }
        for amount in [draft.min_amount, draft.max_amount].into_iter().flatten() {
            if amount < Decimal::ZERO {
                return Err(ValidationError::NegativeAmount { amount }.into());
            }
            check_amount_scale(amount)?;
        }
        if let (Some(min_amount), Some(max_amount)) = (draft.min_amount, draft.max_amount) {
            if min_amount > max_amount {
                return Err(ValidationError::InvertedAmountRange { min_amount, max_amount }.into());
            }
        }

        let approvers = draft.approver_sequence.iter().chain(draft.kind.specific_approver());
        for approver_id in approvers {
            let approver = self
                .store
                .find_user(approver_id)
                .await?
                .ok_or_else(|| WorkflowError::not_found("user", approver_id.0.clone()))?;
            check_approver(&approver, &draft.company_id)?;
        }

        let rule = ApprovalRule {
            id: ApprovalRuleId::generate(),
            company_id: draft.company_id,
            name,
            kind: draft.kind,
            min_amount: draft.min_amount,
            max_amount: draft.max_amount,
            approver_sequence: draft.approver_sequence,
            is_manager_approver: draft.is_manager_approver,
            created_at: timestamp_now(),
        };
        self.store.save_rule(rule.clone()).await?;

        info!(
            event_name = "rules.rule_created",
            correlation_id = %context.correlation_id,
            rule_id = %rule.id.0,
            company_id = %rule.company_id.0,
            "approval rule created"
        );
        self.audit.emit(
            AuditEvent::new(
                None,
                context,
                "rules.rule_created",
                AuditCategory::Administration,
                AuditOutcome::Success,
            )
            .with_metadata("rule_id", rule.id.0.clone())
            .with_metadata("kind", rule.kind.as_str())
            .with_metadata("approvers", rule.approver_sequence.len().to_string()),
        );

        Ok(rule)
    }
}
