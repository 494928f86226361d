use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A registered user and owner of a set of monitored domains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub is_logged_in: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn new(email: &str, now: DateTime<Utc>) -> Self {
        Tenant {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: None,
            picture: None,
            is_logged_in: false,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A sender domain monitored for a tenant. Removal is a soft delete
/// (`is_active = false`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Domain {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub last_scrape: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Domain {
    pub fn new(tenant_id: Uuid, name: &str, now: DateTime<Utc>) -> Self {
        Domain {
            id: Uuid::new_v4(),
            tenant_id,
            name: name.to_string(),
            is_active: true,
            last_scrape: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Login details recorded when a tenant connects.
#[derive(Debug, Clone, Default)]
pub struct TenantLogin {
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

impl TenantLogin {
    pub fn email_only(email: &str) -> Self {
        TenantLogin {
            email: normalize_email(email),
            ..Default::default()
        }
    }
}

/// Result of renaming a tenant's active domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainRename {
    Renamed,
    NotFound,
    AlreadyExists,
}

/// Tenant identity is case-insensitive and whitespace-insensitive.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Domains are stored trimmed; case is preserved.
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().to_string()
}
