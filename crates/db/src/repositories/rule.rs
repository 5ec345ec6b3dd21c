use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;

use claimflow_core::domain::approval::{ApprovalRule, ApprovalRuleId, RuleKind};
use claimflow_core::domain::company::CompanyId;
use claimflow_core::domain::user::UserId;
use claimflow_core::workflow::{RuleStore, StoreError};

use super::{
    decode_decimal, decode_timestamp, encode_timestamp, get, RepositoryError, SqlWorkflowStore,
};

fn row_to_rule(row: &SqliteRow, approvers: Vec<UserId>) -> Result<ApprovalRule, RepositoryError> {
    let kind: String = get(row, "kind")?;
    let threshold: Option<i64> = get(row, "threshold")?;
    let threshold = threshold
        .map(|value| {
            u8::try_from(value)
                .map_err(|_| RepositoryError::Decode(format!("threshold `{value}` is out of range")))
        })
        .transpose()?;
    let specific_approver = get::<Option<String>>(row, "specific_approver_id")?.map(UserId);
    let min_amount: Option<String> = get(row, "min_amount")?;
    let max_amount: Option<String> = get(row, "max_amount")?;
    let created_at: String = get(row, "created_at")?;

    Ok(ApprovalRule {
        id: ApprovalRuleId(get(row, "id")?),
        company_id: CompanyId(get(row, "company_id")?),
        name: get(row, "name")?,
        kind: RuleKind::from_parts(&kind, threshold, specific_approver)
            .ok_or_else(|| RepositoryError::Decode(format!("incomplete rule kind `{kind}`")))?,
        min_amount: min_amount
            .map(|value| decode_decimal("approval_rule.min_amount", &value))
            .transpose()?,
        max_amount: max_amount
            .map(|value| decode_decimal("approval_rule.max_amount", &value))
            .transpose()?,
        approver_sequence: approvers,
        is_manager_approver: get::<i64>(row, "is_manager_approver")? != 0,
        created_at: decode_timestamp("approval_rule.created_at", &created_at)?,
    })
}

impl SqlWorkflowStore {
    async fn fetch_rules(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<ApprovalRule>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, company_id, name, kind, threshold, specific_approver_id,
                    min_amount, max_amount, is_manager_approver, created_at
             FROM approval_rule
             WHERE company_id = ?
             ORDER BY created_at, id",
        )
        .bind(&company_id.0)
        .fetch_all(&self.pool)
        .await?;

        let approver_rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT a.rule_id, a.approver_id
             FROM approval_rule_approver a
             JOIN approval_rule r ON r.id = a.rule_id
             WHERE r.company_id = ?
             ORDER BY a.rule_id, a.position",
        )
        .bind(&company_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut sequences: HashMap<String, Vec<UserId>> = HashMap::new();
        for (rule_id, approver_id) in approver_rows {
            sequences.entry(rule_id).or_default().push(UserId(approver_id));
        }

        rows.iter()
            .map(|row| {
                let id: String = get(row, "id")?;
                row_to_rule(row, sequences.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    async fn upsert_rule(&self, rule: &ApprovalRule) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO approval_rule
                (id, company_id, name, kind, threshold, specific_approver_id,
                 min_amount, max_amount, is_manager_approver, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                kind = excluded.kind,
                threshold = excluded.threshold,
                specific_approver_id = excluded.specific_approver_id,
                min_amount = excluded.min_amount,
                max_amount = excluded.max_amount,
                is_manager_approver = excluded.is_manager_approver",
        )
        .bind(&rule.id.0)
        .bind(&rule.company_id.0)
        .bind(&rule.name)
        .bind(rule.kind.as_str())
        .bind(rule.kind.threshold().map(i64::from))
        .bind(rule.kind.specific_approver().map(|id| id.0.as_str()))
        .bind(rule.min_amount.map(|amount| amount.to_string()))
        .bind(rule.max_amount.map(|amount| amount.to_string()))
        .bind(rule.is_manager_approver)
        .bind(encode_timestamp(&rule.created_at))
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM approval_rule_approver WHERE rule_id = ?")
            .bind(&rule.id.0)
            .execute(&mut *tx)
            .await?;

        for (position, approver_id) in (0i64..).zip(rule.approver_sequence.iter()) {
            sqlx::query(
                "INSERT INTO approval_rule_approver (rule_id, position, approver_id) VALUES (?, ?, ?)",
            )
            .bind(&rule.id.0)
            .bind(position)
            .bind(&approver_id.0)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl RuleStore for SqlWorkflowStore {
    async fn list_rules(&self, company_id: &CompanyId) -> Result<Vec<ApprovalRule>, StoreError> {
        Ok(self.fetch_rules(company_id).await?)
    }

    async fn save_rule(&self, rule: ApprovalRule) -> Result<(), StoreError> {
        Ok(self.upsert_rule(&rule).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, SubsecRound, Utc};
    use rust_decimal::Decimal;

    use claimflow_core::domain::approval::{ApprovalRule, ApprovalRuleId, RuleKind};
    use claimflow_core::domain::user::UserId;
    use claimflow_core::workflow::RuleStore;

    use crate::repositories::test_support::{company_id, seeded_store};

    fn rule(id: &str, kind: RuleKind, approvers: &[&str], age_minutes: i64) -> ApprovalRule {
        ApprovalRule {
            id: ApprovalRuleId(id.to_string()),
            company_id: company_id(),
            name: format!("Rule {id}"),
            kind,
            min_amount: Some(Decimal::new(10_050, 2)),
            max_amount: None,
            approver_sequence: approvers.iter().map(|id| UserId((*id).to_string())).collect(),
            is_manager_approver: true,
            created_at: (Utc::now() - Duration::minutes(age_minutes)).trunc_subsecs(6),
        }
    }

    #[tokio::test]
    async fn rules_round_trip_in_creation_order() {
        let store = seeded_store().await;
        let newer = rule("rule-b", RuleKind::Percentage { threshold: 60 }, &["finance"], 1);
        let older = rule(
            "rule-a",
            RuleKind::Hybrid { threshold: 50, approver_id: UserId("finance".to_string()) },
            &["mgr", "finance", "mgr"],
            60,
        );
        store.save_rule(newer.clone()).await.expect("save newer");
        store.save_rule(older.clone()).await.expect("save older");

        let listed = store.list_rules(&company_id()).await.expect("list");

        assert_eq!(listed, vec![older, newer]);
    }

    #[tokio::test]
    async fn resaving_rule_replaces_its_sequence() {
        let store = seeded_store().await;
        let mut original =
            rule("rule-a", RuleKind::Percentage { threshold: 100 }, &["mgr", "finance"], 5);
        store.save_rule(original.clone()).await.expect("save");

        original.approver_sequence = vec![UserId("finance".to_string())];
        original.max_amount = Some(Decimal::new(500, 0));
        store.save_rule(original.clone()).await.expect("resave");

        let listed = store.list_rules(&company_id()).await.expect("list");
        assert_eq!(listed, vec![original]);
    }
}
