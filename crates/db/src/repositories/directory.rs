use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;

use claimflow_core::domain::company::{Company, CompanyId};
use claimflow_core::domain::user::{User, UserId, UserRole};
use claimflow_core::workflow::{DirectoryStore, StoreError};

use super::{decode_timestamp, encode_timestamp, get, RepositoryError, SqlWorkflowStore};

const USER_COLUMNS: &str = "id, email, name, role, manager_id, company_id, created_at";

fn row_to_company(row: &SqliteRow) -> Result<Company, RepositoryError> {
    let created_at: String = get(row, "created_at")?;
    Ok(Company {
        id: CompanyId(get(row, "id")?),
        name: get(row, "name")?,
        country: get(row, "country")?,
        base_currency: get(row, "base_currency")?,
        created_at: decode_timestamp("company.created_at", &created_at)?,
    })
}

fn row_to_user(row: &SqliteRow) -> Result<User, RepositoryError> {
    let role: String = get(row, "role")?;
    let created_at: String = get(row, "created_at")?;
    Ok(User {
        id: UserId(get(row, "id")?),
        email: get(row, "email")?,
        name: get(row, "name")?,
        role: UserRole::parse(&role)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown user role `{role}`")))?,
        manager_id: get::<Option<String>>(row, "manager_id")?.map(UserId),
        company_id: get::<Option<String>>(row, "company_id")?.map(CompanyId),
        created_at: decode_timestamp("app_user.created_at", &created_at)?,
    })
}

impl SqlWorkflowStore {
    async fn fetch_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM app_user WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn fetch_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM app_user WHERE email = ? COLLATE NOCASE"
        ))
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn fetch_users_by_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM app_user WHERE company_id = ? ORDER BY created_at, id"
        ))
        .bind(&company_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_user).collect()
    }

    async fn upsert_user(&self, user: &User) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO app_user (id, email, name, role, manager_id, company_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                name = excluded.name,
                role = excluded.role,
                manager_id = excluded.manager_id,
                company_id = excluded.company_id",
        )
        .bind(&user.id.0)
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(user.manager_id.as_ref().map(|id| id.0.as_str()))
        .bind(user.company_id.as_ref().map(|id| id.0.as_str()))
        .bind(encode_timestamp(&user.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_company(&self, id: &CompanyId) -> Result<Option<Company>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, country, base_currency, created_at FROM company WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_company).transpose()
    }

    async fn upsert_company(&self, company: &Company) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO company (id, name, country, base_currency, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                country = excluded.country,
                base_currency = excluded.base_currency",
        )
        .bind(&company.id.0)
        .bind(&company.name)
        .bind(&company.country)
        .bind(&company.base_currency)
        .bind(encode_timestamp(&company.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_company_with_admin(
        &self,
        company: &Company,
        admin: &User,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO company (id, name, country, base_currency, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&company.id.0)
        .bind(&company.name)
        .bind(&company.country)
        .bind(&company.base_currency)
        .bind(encode_timestamp(&company.created_at))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO app_user (id, email, name, role, manager_id, company_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&admin.id.0)
        .bind(&admin.email)
        .bind(&admin.name)
        .bind(admin.role.as_str())
        .bind(admin.manager_id.as_ref().map(|id| id.0.as_str()))
        .bind(admin.company_id.as_ref().map(|id| id.0.as_str()))
        .bind(encode_timestamp(&admin.created_at))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl DirectoryStore for SqlWorkflowStore {
    async fn find_user(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        Ok(self.fetch_user(id).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.fetch_user_by_email(email).await?)
    }

    async fn list_users_by_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<User>, StoreError> {
        Ok(self.fetch_users_by_company(company_id).await?)
    }

    async fn save_user(&self, user: User) -> Result<(), StoreError> {
        Ok(self.upsert_user(&user).await?)
    }

    async fn find_company(&self, id: &CompanyId) -> Result<Option<Company>, StoreError> {
        Ok(self.fetch_company(id).await?)
    }

    async fn save_company(&self, company: Company) -> Result<(), StoreError> {
        Ok(self.upsert_company(&company).await?)
    }

    async fn create_company_with_admin(
        &self,
        company: Company,
        admin: User,
    ) -> Result<(), StoreError> {
        Ok(self.insert_company_with_admin(&company, &admin).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use claimflow_core::domain::company::{Company, CompanyId};
    use claimflow_core::domain::user::{UserId, UserRole};
    use claimflow_core::workflow::{DirectoryStore, StoreError};

    use crate::repositories::test_support::{company_id, seeded_store, user};

    #[tokio::test]
    async fn users_round_trip_with_manager_and_company() {
        let store = seeded_store().await;

        let employee =
            store.find_user(&UserId("emp".to_string())).await.expect("find").expect("exists");
        assert_eq!(employee.role, UserRole::Employee);
        assert_eq!(employee.manager_id, Some(UserId("mgr".to_string())));
        assert_eq!(employee.company_id, Some(company_id()));

        let listed = store.list_users_by_company(&company_id()).await.expect("list");
        assert_eq!(
            listed.iter().map(|user| user.id.0.as_str()).collect::<Vec<_>>(),
            vec!["mgr", "finance", "emp"]
        );
    }

    #[tokio::test]
    async fn email_lookup_is_case_insensitive() {
        let store = seeded_store().await;

        let found = store.find_user_by_email("FINANCE@ACME.TEST").await.expect("lookup");
        assert_eq!(found.map(|user| user.id.0), Some("finance".to_string()));
    }

    #[tokio::test]
    async fn saving_existing_user_updates_role() {
        let store = seeded_store().await;

        let mut promoted = user("emp", UserRole::Manager, None, 10);
        promoted.name = "Promoted".to_string();
        store.save_user(promoted).await.expect("update");

        let stored =
            store.find_user(&UserId("emp".to_string())).await.expect("find").expect("exists");
        assert_eq!(stored.role, UserRole::Manager);
        assert_eq!(stored.manager_id, None);
        assert_eq!(stored.name, "Promoted");
    }

    #[tokio::test]
    async fn email_clash_is_reported_as_duplicate() {
        let store = seeded_store().await;

        let mut impostor = user("other", UserRole::Employee, None, 5);
        impostor.email = "MGR@acme.test".to_string();
        let result = store.save_user(impostor).await;

        assert!(matches!(result, Err(StoreError::Duplicate(_))));
    }

    #[tokio::test]
    async fn signup_rolls_back_company_when_admin_insert_fails() {
        let store = seeded_store().await;
        let company = Company {
            id: CompanyId("co-globex".to_string()),
            name: "Globex".to_string(),
            country: "Spain".to_string(),
            base_currency: "EUR".to_string(),
            created_at: Utc::now(),
        };
        let mut admin = user("globex-admin", UserRole::Admin, None, 0);
        admin.company_id = Some(company.id.clone());
        admin.email = "finance@acme.test".to_string();

        let result = store.create_company_with_admin(company.clone(), admin.clone()).await;
        assert!(matches!(result, Err(StoreError::Duplicate(_))));
        assert!(store.find_company(&company.id).await.expect("find").is_none());

        admin.email = "admin@globex.test".to_string();
        store.create_company_with_admin(company.clone(), admin).await.expect("signup");
        assert!(store.find_company(&company.id).await.expect("find").is_some());
    }
}
