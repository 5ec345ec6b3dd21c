use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Demo tenant contract: the ids the seed SQL creates and what each must look like.
const SEED_COMPANY_ID: &str = "co-demo";

const SEED_USERS: &[SeedUserContract] = &[
    SeedUserContract { id: "usr-demo-admin", role: "admin", manager_id: None },
    SeedUserContract { id: "usr-demo-manager", role: "manager", manager_id: Some("usr-demo-admin") },
    SeedUserContract { id: "usr-demo-finance", role: "manager", manager_id: Some("usr-demo-admin") },
    SeedUserContract { id: "usr-demo-cfo", role: "admin", manager_id: None },
    SeedUserContract {
        id: "usr-demo-employee",
        role: "employee",
        manager_id: Some("usr-demo-manager"),
    },
];

const SEED_RULES: &[SeedRuleContract] = &[
    SeedRuleContract {
        id: "rule-demo-small",
        approvers: &[],
        description: "up to 500: employee's manager only",
    },
    SeedRuleContract {
        id: "rule-demo-standard",
        approvers: &["usr-demo-finance"],
        description: "500.01 to 5000: manager then finance",
    },
    SeedRuleContract {
        id: "rule-demo-large",
        approvers: &["usr-demo-finance", "usr-demo-cfo"],
        description: "above 5000: manager, finance, then CFO",
    },
];

/// Deterministic demo company with users and tiered approval rules.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    pub const COMPANY_ID: &str = SEED_COMPANY_ID;
    pub const EMPLOYEE_ID: &str = "usr-demo-employee";

    /// Loads the dataset. Safe to run repeatedly.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            company_id: SEED_COMPANY_ID,
            user_ids: SEED_USERS.iter().map(|user| user.id).collect(),
            rules_seeded: SEED_RULES
                .iter()
                .map(|rule| RuleSeedInfo { rule_id: rule.id, description: rule.description })
                .collect(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let company_exists: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM company WHERE id = ?1)")
                .bind(SEED_COMPANY_ID)
                .fetch_one(pool)
                .await?;
        checks.push((SEED_COMPANY_ID, company_exists == 1));

        for user in SEED_USERS {
            let user_matches: i64 = sqlx::query_scalar(
                "SELECT EXISTS(
                    SELECT 1 FROM app_user
                    WHERE id = ?1 AND role = ?2 AND company_id = ?3
                      AND manager_id IS ?4
                 )",
            )
            .bind(user.id)
            .bind(user.role)
            .bind(SEED_COMPANY_ID)
            .bind(user.manager_id)
            .fetch_one(pool)
            .await?;
            checks.push((user.id, user_matches == 1));
        }

        for rule in SEED_RULES {
            let approvers: Vec<String> = sqlx::query_scalar(
                "SELECT approver_id FROM approval_rule_approver WHERE rule_id = ?1 ORDER BY position",
            )
            .bind(rule.id)
            .fetch_all(pool)
            .await?;
            let rule_exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM approval_rule WHERE id = ?1 AND company_id = ?2)",
            )
            .bind(rule.id)
            .bind(SEED_COMPANY_ID)
            .fetch_one(pool)
            .await?;
            let sequence_matches = approvers.len() == rule.approvers.len()
                && approvers
                    .iter()
                    .zip(rule.approvers)
                    .all(|(actual, expected)| actual.as_str() == *expected);
            checks.push((rule.id, rule_exists == 1 && sequence_matches));
        }

        Ok(VerificationResult { all_present: checks.iter().all(|(_, ok)| *ok), checks })
    }

    /// Removes the demo company and everything that cascades from it.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            "DELETE FROM approval_step
             WHERE expense_id IN (SELECT id FROM expense WHERE company_id = ?1)",
        )
        .bind(SEED_COMPANY_ID)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM expense WHERE company_id = ?1")
            .bind(SEED_COMPANY_ID)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM approval_rule WHERE company_id = ?1")
            .bind(SEED_COMPANY_ID)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE app_user SET manager_id = NULL WHERE company_id = ?1")
            .bind(SEED_COMPANY_ID)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM app_user WHERE company_id = ?1")
            .bind(SEED_COMPANY_ID)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM company WHERE id = ?1")
            .bind(SEED_COMPANY_ID)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedUserContract {
    id: &'static str,
    role: &'static str,
    manager_id: Option<&'static str>,
}

#[derive(Debug, Clone, Copy)]
struct SeedRuleContract {
    id: &'static str,
    approvers: &'static [&'static str],
    description: &'static str,
}

#[derive(Debug)]
pub struct SeedResult {
    pub company_id: &'static str,
    pub user_ids: Vec<&'static str>,
    pub rules_seeded: Vec<RuleSeedInfo>,
}

#[derive(Debug)]
pub struct RuleSeedInfo {
    pub rule_id: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
