//! Persistence seams for leads and tenants.
//!
//! `AppState` carries `Arc<dyn LeadStore>` and `Arc<dyn TenantStore>`; the
//! Postgres backend is used in production and the in-memory backend when no
//! `DATABASE_URL` is configured (and in tests).

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::lead::{Lead, LeadDraft, LeadStatus, UnknownStatus};
use crate::models::tenant::{Domain, DomainRename, Tenant, TenantLogin};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Store call timed out")]
    Timeout,
}

impl From<UnknownStatus> for StoreError {
    fn from(e: UnknownStatus) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of offering a draft to the lead store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(Lead),
    Duplicate,
}

#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Persists the draft unless a lead with the same (name, category, date)
    /// already exists. Existing leads are never modified.
    async fn insert_if_absent(&self, draft: &LeadDraft) -> StoreResult<InsertOutcome>;

    /// Most recently created first.
    async fn list_recent(&self, limit: i64) -> StoreResult<Vec<Lead>>;

    async fn update_status(&self, id: Uuid, status: LeadStatus) -> StoreResult<Option<Lead>>;

    async fn update_date(&self, id: Uuid, date: NaiveDate) -> StoreResult<Option<Lead>>;

    /// Returns `false` when no lead has this id.
    async fn delete(&self, id: Uuid) -> StoreResult<bool>;
}

/// Tenants and their monitored domains. Emails passed in are expected to be
/// normalized already.
#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn find_tenant(&self, email: &str) -> StoreResult<Option<Tenant>>;

    /// Upserts the tenant as connected with `last_login = now`.
    async fn record_login(&self, login: &TenantLogin) -> StoreResult<Tenant>;

    /// Returns `false` when the tenant does not exist. Never creates one.
    async fn set_connected(&self, email: &str, connected: bool) -> StoreResult<bool>;

    async fn connected_tenants(&self) -> StoreResult<Vec<Tenant>>;

    /// Active domains in the order they were added.
    async fn active_domains(&self, tenant_id: Uuid) -> StoreResult<Vec<Domain>>;

    /// Adds (or reactivates) a domain, creating the tenant if needed.
    /// Returns the tenant's active domain names afterwards.
    async fn add_domain(&self, email: &str, domain: &str) -> StoreResult<Vec<String>>;

    async fn rename_domain(
        &self,
        tenant_id: Uuid,
        from: &str,
        to: &str,
    ) -> StoreResult<DomainRename>;

    /// Soft delete. Returns `false` when no active domain has this name.
    async fn deactivate_domain(&self, tenant_id: Uuid, name: &str) -> StoreResult<bool>;

    async fn mark_scraped(&self, domain_ids: &[Uuid], at: DateTime<Utc>) -> StoreResult<()>;
}
