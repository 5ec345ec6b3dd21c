use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::company::CompanyId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn generate() -> Self {
        Self(super::generate_id("usr"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Manager,
    Employee,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Employee => "employee",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "manager" => Some(Self::Manager),
            "employee" => Some(Self::Employee),
            _ => None,
        }
    }

    /// Whether a user holding this role may sit on an approval gate.
    pub fn can_approve(&self) -> bool {
        matches!(self, Self::Admin | Self::Manager)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub manager_id: Option<UserId>,
    pub company_id: Option<CompanyId>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn belongs_to(&self, company_id: &CompanyId) -> bool {
        self.company_id.as_ref() == Some(company_id)
    }
}

#[cfg(test)]
mod tests {
    use super::UserRole;

    #[test]
    fn role_parse_is_case_insensitive_and_round_trips() {
        for role in [UserRole::Admin, UserRole::Manager, UserRole::Employee] {
            assert_eq!(UserRole::parse(&role.as_str().to_ascii_uppercase()), Some(role));
        }
        assert_eq!(UserRole::parse("intern"), None);
    }

    #[test]
    fn only_managers_and_admins_can_approve() {
        assert!(UserRole::Admin.can_approve());
        assert!(UserRole::Manager.can_approve());
        assert!(!UserRole::Employee.can_approve());
    }
}
