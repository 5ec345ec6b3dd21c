use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use tracing::{debug, warn};

use claimflow_core::domain::approval::{ApprovalStep, ApprovalStepId, StepStatus};
use claimflow_core::domain::company::CompanyId;
use claimflow_core::domain::expense::{Expense, ExpenseId, ExpenseStatus};
use claimflow_core::domain::user::UserId;
use claimflow_core::workflow::{CommitOutcome, DecisionCommit, ExpenseStore, StoreError};

use super::{
    decode_date, decode_decimal, decode_index, decode_timestamp, encode_timestamp, get,
    RepositoryError, SqlWorkflowStore,
};

const EXPENSE_COLUMNS: &str = "e.id, e.employee_id, e.company_id, e.amount, e.currency, \
     e.category, e.description, e.expense_date, e.receipt_ref, e.status, \
     e.current_approver_index, e.created_at, e.updated_at";

fn row_to_expense(row: &SqliteRow) -> Result<Expense, RepositoryError> {
    let amount: String = get(row, "amount")?;
    let date: String = get(row, "expense_date")?;
    let status: String = get(row, "status")?;
    let created_at: String = get(row, "created_at")?;
    let updated_at: String = get(row, "updated_at")?;

    Ok(Expense {
        id: ExpenseId(get(row, "id")?),
        employee_id: UserId(get(row, "employee_id")?),
        company_id: CompanyId(get(row, "company_id")?),
        amount: decode_decimal("expense.amount", &amount)?,
        currency: get(row, "currency")?,
        category: get(row, "category")?,
        description: get(row, "description")?,
        date: decode_date("expense.expense_date", &date)?,
        receipt_ref: get(row, "receipt_ref")?,
        status: ExpenseStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown expense status `{status}`")))?,
        current_approver_index: decode_index(
            "expense.current_approver_index",
            get(row, "current_approver_index")?,
        )?,
        created_at: decode_timestamp("expense.created_at", &created_at)?,
        updated_at: decode_timestamp("expense.updated_at", &updated_at)?,
    })
}

fn row_to_step(row: &SqliteRow) -> Result<ApprovalStep, RepositoryError> {
    let status: String = get(row, "status")?;
    let decided_at: Option<String> = get(row, "decided_at")?;

    Ok(ApprovalStep {
        id: ApprovalStepId(get(row, "id")?),
        expense_id: ExpenseId(get(row, "expense_id")?),
        approver_id: UserId(get(row, "approver_id")?),
        sequence: decode_index("approval_step.sequence", get(row, "sequence")?)?,
        status: StepStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown step status `{status}`")))?,
        comment: get(row, "comment")?,
        decided_at: decided_at
            .map(|value| decode_timestamp("approval_step.decided_at", &value))
            .transpose()?,
    })
}

impl SqlWorkflowStore {
    async fn insert_expense(
        &self,
        expense: &Expense,
        steps: &[ApprovalStep],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO expense
                (id, employee_id, company_id, amount, currency, category, description,
                 expense_date, receipt_ref, status, current_approver_index, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&expense.id.0)
        .bind(&expense.employee_id.0)
        .bind(&expense.company_id.0)
        .bind(expense.amount.to_string())
        .bind(&expense.currency)
        .bind(&expense.category)
        .bind(&expense.description)
        .bind(expense.date.format("%Y-%m-%d").to_string())
        .bind(&expense.receipt_ref)
        .bind(expense.status.as_str())
        .bind(i64::from(expense.current_approver_index))
        .bind(encode_timestamp(&expense.created_at))
        .bind(encode_timestamp(&expense.updated_at))
        .execute(&mut *tx)
        .await?;

        for step in steps {
            sqlx::query(
                "INSERT INTO approval_step
                    (id, expense_id, approver_id, sequence, status, comment, decided_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&step.id.0)
            .bind(&step.expense_id.0)
            .bind(&step.approver_id.0)
            .bind(i64::from(step.sequence))
            .bind(step.status.as_str())
            .bind(&step.comment)
            .bind(step.decided_at.as_ref().map(encode_timestamp))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            event_name = "db.expense_created",
            expense_id = %expense.id.0,
            steps = steps.len(),
            "expense and chain persisted"
        );
        Ok(())
    }

    async fn fetch_expense(&self, id: &ExpenseId) -> Result<Option<Expense>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {EXPENSE_COLUMNS} FROM expense e WHERE e.id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_expense).transpose()
    }

    async fn fetch_steps(&self, expense_id: &ExpenseId) -> Result<Vec<ApprovalStep>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, expense_id, approver_id, sequence, status, comment, decided_at
             FROM approval_step
             WHERE expense_id = ?
             ORDER BY sequence",
        )
        .bind(&expense_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_step).collect()
    }

    async fn apply_decision(&self, commit: &DecisionCommit) -> Result<CommitOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let step_update = sqlx::query(
            "UPDATE approval_step
             SET status = ?, comment = ?, decided_at = ?
             WHERE id = ? AND expense_id = ? AND status = 'pending'",
        )
        .bind(commit.step.status.as_str())
        .bind(&commit.step.comment)
        .bind(commit.step.decided_at.as_ref().map(encode_timestamp))
        .bind(&commit.step.id.0)
        .bind(&commit.expense.id.0)
        .execute(&mut *tx)
        .await?;

        if step_update.rows_affected() == 0 {
            tx.rollback().await?;
            warn!(
                event_name = "db.decision_stale",
                expense_id = %commit.expense.id.0,
                step_id = %commit.step.id.0,
                "step was no longer pending"
            );
            return Ok(CommitOutcome::Stale);
        }

        let expense_update = sqlx::query(
            "UPDATE expense
             SET status = ?, current_approver_index = ?, updated_at = ?
             WHERE id = ? AND status = ? AND current_approver_index = ?",
        )
        .bind(commit.expense.status.as_str())
        .bind(i64::from(commit.expense.current_approver_index))
        .bind(encode_timestamp(&commit.expense.updated_at))
        .bind(&commit.expense.id.0)
        .bind(commit.expected_status.as_str())
        .bind(i64::from(commit.expected_index))
        .execute(&mut *tx)
        .await?;

        if expense_update.rows_affected() == 0 {
            tx.rollback().await?;
            warn!(
                event_name = "db.decision_stale",
                expense_id = %commit.expense.id.0,
                expected_status = commit.expected_status.as_str(),
                expected_index = commit.expected_index,
                "expense moved since it was read"
            );
            return Ok(CommitOutcome::Stale);
        }

        tx.commit().await?;
        debug!(
            event_name = "db.decision_committed",
            expense_id = %commit.expense.id.0,
            status = commit.expense.status.as_str(),
            "decision committed"
        );
        Ok(CommitOutcome::Applied)
    }

    async fn fetch_expenses_where(
        &self,
        filter: &str,
        value: &str,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expense e WHERE {filter} = ? \
             ORDER BY e.created_at DESC, e.id DESC"
        ))
        .bind(value)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_expense).collect()
    }

    async fn fetch_awaiting(&self, approver_id: &UserId) -> Result<Vec<Expense>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {EXPENSE_COLUMNS}
             FROM expense e
             JOIN approval_step s
               ON s.expense_id = e.id AND s.sequence = e.current_approver_index
             WHERE e.status = 'in-review' AND s.status = 'pending' AND s.approver_id = ?
             ORDER BY e.created_at, e.id"
        ))
        .bind(&approver_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_expense).collect()
    }
}

#[async_trait]
impl ExpenseStore for SqlWorkflowStore {
    async fn create_expense(
        &self,
        expense: Expense,
        steps: Vec<ApprovalStep>,
    ) -> Result<(), StoreError> {
        Ok(self.insert_expense(&expense, &steps).await?)
    }

    async fn find_expense(&self, id: &ExpenseId) -> Result<Option<Expense>, StoreError> {
        Ok(self.fetch_expense(id).await?)
    }

    async fn list_steps(&self, expense_id: &ExpenseId) -> Result<Vec<ApprovalStep>, StoreError> {
        Ok(self.fetch_steps(expense_id).await?)
    }

    async fn commit_decision(&self, commit: DecisionCommit) -> Result<CommitOutcome, StoreError> {
        Ok(self.apply_decision(&commit).await?)
    }

    async fn list_by_employee(&self, employee_id: &UserId) -> Result<Vec<Expense>, StoreError> {
        Ok(self.fetch_expenses_where("e.employee_id", &employee_id.0).await?)
    }

    async fn list_by_company(&self, company_id: &CompanyId) -> Result<Vec<Expense>, StoreError> {
        Ok(self.fetch_expenses_where("e.company_id", &company_id.0).await?)
    }

    async fn list_awaiting_approver(
        &self,
        approver_id: &UserId,
    ) -> Result<Vec<Expense>, StoreError> {
        Ok(self.fetch_awaiting(approver_id).await?)
    }
}
