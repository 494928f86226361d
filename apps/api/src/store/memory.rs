//! In-process store. Used when no database is configured, and by tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{InsertOutcome, LeadStore, StoreResult, TenantStore};
use crate::models::lead::{Lead, LeadDraft, LeadStatus};
use crate::models::tenant::{Domain, DomainRename, Tenant, TenantLogin};

#[derive(Default)]
struct Inner {
    leads: Vec<Lead>,
    tenants: HashMap<String, Tenant>,
    domains: Vec<Domain>,
}

impl Inner {
    fn active_names(&self, tenant_id: Uuid) -> Vec<String> {
        self.domains
            .iter()
            .filter(|d| d.tenant_id == tenant_id && d.is_active)
            .map(|d| d.name.clone())
            .collect()
    }

    fn lead_mut(&mut self, id: Uuid) -> Option<&mut Lead> {
        self.leads.iter_mut().find(|l| l.id == id)
    }
}

fn is_active(domain: &Domain, tenant_id: Uuid, name: &str) -> bool {
    domain.tenant_id == tenant_id && domain.is_active && domain.name == name
}

/// Cloning shares the underlying data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    async fn insert_if_absent(&self, draft: &LeadDraft) -> StoreResult<InsertOutcome> {
        // Check and insert under one write lock so concurrent submissions
        // of the same identity cannot both succeed.
        let mut inner = self.inner.write().await;
        if inner.leads.iter().any(|l| l.identity() == draft.identity()) {
            return Ok(InsertOutcome::Duplicate);
        }
        let lead = Lead::from_draft(draft, Utc::now());
        inner.leads.push(lead.clone());
        Ok(InsertOutcome::Inserted(lead))
    }

    async fn list_recent(&self, limit: i64) -> StoreResult<Vec<Lead>> {
        let inner = self.inner.read().await;
        let mut leads: Vec<Lead> = inner.leads.iter().rev().cloned().collect();
        leads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        leads.truncate(limit.max(0) as usize);
        Ok(leads)
    }

    async fn update_status(&self, id: Uuid, status: LeadStatus) -> StoreResult<Option<Lead>> {
        let mut inner = self.inner.write().await;
        Ok(inner.lead_mut(id).map(|lead| {
            lead.status = status;
            lead.updated_at = Utc::now();
            lead.clone()
        }))
    }

    async fn update_date(&self, id: Uuid, date: NaiveDate) -> StoreResult<Option<Lead>> {
        let mut inner = self.inner.write().await;
        Ok(inner.lead_mut(id).map(|lead| {
            lead.date = date;
            lead.updated_at = Utc::now();
            lead.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        let before = inner.leads.len();
        inner.leads.retain(|l| l.id != id);
        Ok(inner.leads.len() != before)
    }
}

#[async_trait]
impl TenantStore for MemoryStore {
    async fn find_tenant(&self, email: &str) -> StoreResult<Option<Tenant>> {
        Ok(self.inner.read().await.tenants.get(email).cloned())
    }

    async fn record_login(&self, login: &TenantLogin) -> StoreResult<Tenant> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        let tenant = inner
            .tenants
            .entry(login.email.clone())
            .or_insert_with(|| Tenant::new(&login.email, now));
        tenant.is_logged_in = true;
        tenant.last_login = Some(now);
        tenant.updated_at = now;
        if login.name.is_some() {
            tenant.name = login.name.clone();
        }
        if login.picture.is_some() {
            tenant.picture = login.picture.clone();
        }
        Ok(tenant.clone())
    }

    async fn set_connected(&self, email: &str, connected: bool) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        match inner.tenants.get_mut(email) {
            Some(tenant) => {
                tenant.is_logged_in = connected;
                tenant.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn connected_tenants(&self) -> StoreResult<Vec<Tenant>> {
        let inner = self.inner.read().await;
        Ok(inner
            .tenants
            .values()
            .filter(|t| t.is_logged_in)
            .cloned()
            .collect())
    }

    async fn active_domains(&self, tenant_id: Uuid) -> StoreResult<Vec<Domain>> {
        let inner = self.inner.read().await;
        Ok(inner
            .domains
            .iter()
            .filter(|d| d.tenant_id == tenant_id && d.is_active)
            .cloned()
            .collect())
    }

    async fn add_domain(&self, email: &str, domain: &str) -> StoreResult<Vec<String>> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        let tenant_id = inner
            .tenants
            .entry(email.to_string())
            .or_insert_with(|| Tenant::new(email, now))
            .id;

        let already_active = inner
            .domains
            .iter()
            .any(|d| is_active(d, tenant_id, domain));
        if !already_active {
            let inactive = inner
                .domains
                .iter()
                .enumerate()
                .filter(|(_, d)| d.tenant_id == tenant_id && d.name == domain)
                .max_by_key(|(_, d)| d.updated_at)
                .map(|(idx, _)| idx);
            match inactive {
                Some(idx) => {
                    let existing = &mut inner.domains[idx];
                    existing.is_active = true;
                    existing.updated_at = now;
                }
                None => inner.domains.push(Domain::new(tenant_id, domain, now)),
            }
        }
        Ok(inner.active_names(tenant_id))
    }

    async fn rename_domain(
        &self,
        tenant_id: Uuid,
        from: &str,
        to: &str,
    ) -> StoreResult<DomainRename> {
        let mut inner = self.inner.write().await;
        if inner.domains.iter().any(|d| is_active(d, tenant_id, to)) {
            return Ok(DomainRename::AlreadyExists);
        }
        match inner
            .domains
            .iter_mut()
            .find(|d| is_active(d, tenant_id, from))
        {
            Some(domain) => {
                domain.name = to.to_string();
                domain.updated_at = Utc::now();
                Ok(DomainRename::Renamed)
            }
            None => Ok(DomainRename::NotFound),
        }
    }

    async fn deactivate_domain(&self, tenant_id: Uuid, name: &str) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        match inner
            .domains
            .iter_mut()
            .find(|d| is_active(d, tenant_id, name))
        {
            Some(domain) => {
                domain.is_active = false;
                domain.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_scraped(&self, domain_ids: &[Uuid], at: DateTime<Utc>) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        for domain in inner.domains.iter_mut().filter(|d| domain_ids.contains(&d.id)) {
            // Overlapping ticks may finish out of order; keep the latest.
            domain.last_scrape = Some(domain.last_scrape.map_or(at, |prev| prev.max(at)));
        }
        Ok(())
    }
}
