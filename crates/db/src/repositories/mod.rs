use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use thiserror::Error;

use claimflow_core::workflow::StoreError;

use crate::DbPool;

pub mod directory;
pub mod expense;
pub mod rule;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Database(sqlx::Error::Database(error)) if error.is_unique_violation() => {
                Self::Duplicate(error.message().to_string())
            }
            RepositoryError::Database(error) => Self::Backend(error.to_string()),
            RepositoryError::Decode(message) => Self::Decode(message),
        }
    }
}

/// SQLite implementation of every workflow store. Directory, rule and expense
/// access live in their own modules.
#[derive(Clone)]
pub struct SqlWorkflowStore {
    pool: DbPool,
}

impl SqlWorkflowStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

/// Fixed-width UTC timestamps so that text ordering matches time ordering.
pub(crate) fn encode_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn get<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column).map_err(|error| RepositoryError::Decode(error.to_string()))
}

pub(crate) fn decode_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column} `{value}`: {error}")))
}

pub(crate) fn decode_decimal(column: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value)
        .map_err(|error| RepositoryError::Decode(format!("{column} `{value}`: {error}")))
}

pub(crate) fn decode_date(column: &str, value: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|error| RepositoryError::Decode(format!("{column} `{value}`: {error}")))
}

pub(crate) fn decode_index(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("{column} `{value}` is out of range")))
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{Duration, Utc};

    use claimflow_core::domain::company::{Company, CompanyId};
    use claimflow_core::domain::user::{User, UserId, UserRole};
    use claimflow_core::workflow::DirectoryStore;

    use super::SqlWorkflowStore;
    use crate::{connect_with_settings, migrations::run_pending};

    pub async fn migrated_store() -> SqlWorkflowStore {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        SqlWorkflowStore::new(pool)
    }

    pub fn company_id() -> CompanyId {
        CompanyId("co-acme".to_string())
    }

    pub fn user(id: &str, role: UserRole, manager: Option<&str>, age_minutes: i64) -> User {
        User {
            id: UserId(id.to_string()),
            email: format!("{id}@acme.test"),
            name: id.to_uppercase(),
            role,
            manager_id: manager.map(|manager| UserId(manager.to_string())),
            company_id: Some(company_id()),
            created_at: Utc::now() - Duration::minutes(age_minutes),
        }
    }

    /// Company plus `mgr`, `finance` and `emp` (managed by `mgr`).
    pub async fn seeded_store() -> SqlWorkflowStore {
        let store = migrated_store().await;
        store
            .save_company(Company {
                id: company_id(),
                name: "Acme".to_string(),
                country: "US".to_string(),
                base_currency: "USD".to_string(),
                created_at: Utc::now(),
            })
            .await
            .expect("save company");
        for user in [
            user("mgr", UserRole::Manager, None, 30),
            user("finance", UserRole::Manager, None, 20),
            user("emp", UserRole::Employee, Some("mgr"), 10),
        ] {
            store.save_user(user).await.expect("save user");
        }
        store
    }
}
