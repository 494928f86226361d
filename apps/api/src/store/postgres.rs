use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use super::{InsertOutcome, LeadStore, StoreResult, TenantStore};
use crate::models::lead::{Lead, LeadDraft, LeadRow, LeadStatus};
use crate::models::tenant::{Domain, DomainRename, Tenant, TenantLogin};

/// Postgres-backed store for leads, tenants and domains.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn into_lead(row: LeadRow) -> StoreResult<Lead> {
    Ok(Lead::try_from(row)?)
}

#[async_trait]
impl LeadStore for PgStore {
    async fn insert_if_absent(&self, draft: &LeadDraft) -> StoreResult<InsertOutcome> {
        // The unique identity index turns a concurrent duplicate into a no-op
        // instead of a second row.
        let now = Utc::now();
        let row: Option<LeadRow> = sqlx::query_as(
            r#"
            INSERT INTO leads
                (id, name, category, date, phone, email, budget, source, status,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            ON CONFLICT (name, category, date) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&draft.name)
        .bind(&draft.category)
        .bind(draft.date)
        .bind(&draft.phone)
        .bind(&draft.email)
        .bind(&draft.budget)
        .bind(&draft.source)
        .bind(draft.status.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(InsertOutcome::Inserted(into_lead(row)?)),
            None => Ok(InsertOutcome::Duplicate),
        }
    }

    async fn list_recent(&self, limit: i64) -> StoreResult<Vec<Lead>> {
        let rows: Vec<LeadRow> =
            sqlx::query_as("SELECT * FROM leads ORDER BY created_at DESC LIMIT $1")
                .bind(limit.max(0))
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(into_lead).collect()
    }

    async fn update_status(&self, id: Uuid, status: LeadStatus) -> StoreResult<Option<Lead>> {
        let row: Option<LeadRow> = sqlx::query_as(
            "UPDATE leads SET status = $1, updated_at = now() WHERE id = $2 RETURNING *",
        )
        .bind(status.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(into_lead).transpose()
    }

    async fn update_date(&self, id: Uuid, date: NaiveDate) -> StoreResult<Option<Lead>> {
        let row: Option<LeadRow> = sqlx::query_as(
            "UPDATE leads SET date = $1, updated_at = now() WHERE id = $2 RETURNING *",
        )
        .bind(date)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(into_lead).transpose()
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM leads WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl TenantStore for PgStore {
    async fn find_tenant(&self, email: &str) -> StoreResult<Option<Tenant>> {
        Ok(
            sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE email = $1")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn record_login(&self, login: &TenantLogin) -> StoreResult<Tenant> {
        Ok(sqlx::query_as::<_, Tenant>(
            r#"
            INSERT INTO tenants
                (id, email, name, picture, is_logged_in, last_login, created_at, updated_at)
            VALUES ($1, $2, $3, $4, TRUE, $5, $5, $5)
            ON CONFLICT (email) DO UPDATE SET
                is_logged_in = TRUE,
                last_login = EXCLUDED.last_login,
                name = COALESCE(EXCLUDED.name, tenants.name),
                picture = COALESCE(EXCLUDED.picture, tenants.picture),
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&login.email)
        .bind(&login.name)
        .bind(&login.picture)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?)
    }

    async fn set_connected(&self, email: &str, connected: bool) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE tenants SET is_logged_in = $1, updated_at = now() WHERE email = $2",
        )
        .bind(connected)
        .bind(email)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn connected_tenants(&self) -> StoreResult<Vec<Tenant>> {
        Ok(
            sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE is_logged_in")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn active_domains(&self, tenant_id: Uuid) -> StoreResult<Vec<Domain>> {
        Ok(sqlx::query_as::<_, Domain>(
            "SELECT * FROM domains WHERE tenant_id = $1 AND is_active ORDER BY created_at",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn add_domain(&self, email: &str, domain: &str) -> StoreResult<Vec<String>> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        // No-op update on conflict so RETURNING yields the existing id.
        let tenant_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO tenants (id, email, created_at, updated_at)
            VALUES ($1, $2, $3, $3)
            ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let already_active: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM domains WHERE tenant_id = $1 AND name = $2 AND is_active)",
        )
        .bind(tenant_id)
        .bind(domain)
        .fetch_one(&mut *tx)
        .await?;

        if !already_active {
            let reactivated = sqlx::query(
                r#"
                UPDATE domains SET is_active = TRUE, updated_at = $3
                WHERE id = (
                    SELECT id FROM domains
                    WHERE tenant_id = $1 AND name = $2 AND NOT is_active
                    ORDER BY updated_at DESC
                    LIMIT 1
                )
                "#,
            )
            .bind(tenant_id)
            .bind(domain)
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if reactivated == 0 {
                sqlx::query(
                    r#"
                    INSERT INTO domains (id, tenant_id, name, is_active, created_at, updated_at)
                    VALUES ($1, $2, $3, TRUE, $4, $4)
                    ON CONFLICT (tenant_id, name) WHERE is_active DO NOTHING
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(tenant_id)
                .bind(domain)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            } else {
                debug!(email, domain, "Reactivated soft-deleted domain");
            }
        }

        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM domains WHERE tenant_id = $1 AND is_active ORDER BY created_at",
        )
        .bind(tenant_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(names)
    }

    async fn rename_domain(
        &self,
        tenant_id: Uuid,
        from: &str,
        to: &str,
    ) -> StoreResult<DomainRename> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM domains WHERE tenant_id = $1 AND name = $2 AND is_active)",
        )
        .bind(tenant_id)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;
        if taken {
            return Ok(DomainRename::AlreadyExists);
        }

        let result = sqlx::query(
            r#"
            UPDATE domains SET name = $3, updated_at = now()
            WHERE tenant_id = $1 AND name = $2 AND is_active
            "#,
        )
        .bind(tenant_id)
        .bind(from)
        .bind(to)
        .execute(&self.pool)
        .await;

        match result {
            Ok(r) if r.rows_affected() == 0 => Ok(DomainRename::NotFound),
            Ok(_) => Ok(DomainRename::Renamed),
            // Lost a race against a concurrent add of the same name.
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Ok(DomainRename::AlreadyExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn deactivate_domain(&self, tenant_id: Uuid, name: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE domains SET is_active = FALSE, updated_at = now()
            WHERE tenant_id = $1 AND name = $2 AND is_active
            "#,
        )
        .bind(tenant_id)
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_scraped(&self, domain_ids: &[Uuid], at: DateTime<Utc>) -> StoreResult<()> {
        // GREATEST keeps the update order-insensitive across overlapping ticks.
        sqlx::query(
            r#"
            UPDATE domains
            SET last_scrape = GREATEST(COALESCE(last_scrape, $2), $2), updated_at = now()
            WHERE id = ANY($1)
            "#,
        )
        .bind(domain_ids)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
