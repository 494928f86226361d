//! Scrape scheduler. On a fixed interval, pushes a scrape trigger to every
//! connected tenant that has active domains and an open push-channel session.
//!
//! Delivery is best effort: a tenant without an open session at tick time
//! misses that tick, and nothing is queued for later.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::channel::protocol::ServerMessage;
use crate::channel::registry::ConnectionManager;
use crate::models::tenant::Tenant;
use crate::store::{StoreError, StoreResult, TenantStore};

#[derive(Debug, Error)]
pub enum TickError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// What one tick did for one tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantOutcome {
    Triggered { domains: usize },
    NoActiveDomains,
    /// Active domains but no open session.
    Offline,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tenants: usize,
    pub triggered: usize,
    pub no_domains: usize,
    pub offline: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct ScrapeScheduler {
    tenants: Arc<dyn TenantStore>,
    connections: Arc<ConnectionManager>,
    interval: Duration,
    io_timeout: Duration,
}

impl ScrapeScheduler {
    pub fn new(
        tenants: Arc<dyn TenantStore>,
        connections: Arc<ConnectionManager>,
        interval: Duration,
        io_timeout: Duration,
    ) -> Self {
        Self {
            tenants,
            connections,
            interval,
            io_timeout,
        }
    }

    /// Starts the timer. Each tick runs in its own task, so a slow tick can
    /// overlap the next one; per-tenant writes are idempotent.
    pub fn spawn(self) -> JoinHandle<()> {
        info!(interval = ?self.interval, "Starting scrape scheduler");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; wait a full interval instead.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let scheduler = self.clone();
                tokio::spawn(async move {
                    scheduler.run_tick().await;
                });
            }
        })
    }

    /// One pass over all connected tenants. Tenants are handled concurrently
    /// and a failure for one never affects the others.
    pub async fn run_tick(&self) -> TickReport {
        let tick_at = Utc::now();
        let tenants = match self.bounded(self.tenants.connected_tenants()).await {
            Ok(tenants) => tenants,
            Err(e) => {
                error!("Scrape tick aborted, could not list connected tenants: {e}");
                return TickReport::default();
            }
        };
        debug!(count = tenants.len(), "Scrape tick started");

        let mut tasks = JoinSet::new();
        for tenant in tenants {
            let scheduler = self.clone();
            tasks.spawn(async move {
                let email = tenant.email.clone();
                (email, scheduler.notify_tenant(tenant, tick_at).await)
            });
        }

        let mut report = TickReport {
            tenants: tasks.len(),
            ..Default::default()
        };
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((email, Ok(TenantOutcome::Triggered { domains }))) => {
                    debug!(email = %email, domains, "Scrape trigger sent");
                    report.triggered += 1;
                }
                Ok((_, Ok(TenantOutcome::NoActiveDomains))) => report.no_domains += 1,
                Ok((_, Ok(TenantOutcome::Offline))) => report.offline += 1,
                Ok((email, Err(e))) => {
                    warn!(email = %email, "Scrape trigger failed: {e}");
                    report.failed += 1;
                }
                Err(e) => {
                    error!("Scrape task panicked: {e}");
                    report.failed += 1;
                }
            }
        }

        info!(
            tenants = report.tenants,
            triggered = report.triggered,
            no_domains = report.no_domains,
            offline = report.offline,
            failed = report.failed,
            "Scrape tick finished"
        );
        report
    }

    async fn notify_tenant(
        &self,
        tenant: Tenant,
        tick_at: DateTime<Utc>,
    ) -> Result<TenantOutcome, TickError> {
        let domains = self.bounded(self.tenants.active_domains(tenant.id)).await?;
        if domains.is_empty() {
            debug!(email = %tenant.email, "No active domains");
            return Ok(TenantOutcome::NoActiveDomains);
        }

        let ids: Vec<Uuid> = domains.iter().map(|d| d.id).collect();
        let names: Vec<String> = domains.into_iter().map(|d| d.name).collect();
        let trigger = ServerMessage::scrape_trigger(&tenant.email, names);

        let sent = tokio::time::timeout(
            self.io_timeout,
            self.connections.send(&tenant.email, trigger),
        )
        .await
        .map_err(|_| TickError::Timeout(self.io_timeout))?;
        if let Err(e) = sent {
            debug!(email = %tenant.email, "Skipping scrape trigger: {e}");
            return Ok(TenantOutcome::Offline);
        }

        // Only advanced after the trigger was accepted by the transport.
        self.bounded(self.tenants.mark_scraped(&ids, tick_at)).await?;
        Ok(TenantOutcome::Triggered { domains: ids.len() })
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = StoreResult<T>>,
    ) -> Result<T, TickError> {
        match tokio::time::timeout(self.io_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(TickError::Timeout(self.io_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use crate::channel::registry::SessionHandle;
    use crate::models::tenant::{Domain, DomainRename, TenantLogin};
    use crate::store::memory::MemoryStore;

    const INTERVAL: Duration = Duration::from_secs(60);
    const TIMEOUT: Duration = Duration::from_secs(5);

    fn scheduler_for(store: Arc<dyn TenantStore>) -> (ScrapeScheduler, Arc<ConnectionManager>) {
        let connections = Arc::new(ConnectionManager::new(store.clone()));
        (
            ScrapeScheduler::new(store, connections.clone(), INTERVAL, TIMEOUT),
            connections,
        )
    }

    async fn open_session(
        connections: &ConnectionManager,
        email: &str,
    ) -> (Uuid, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = SessionHandle::new(tx);
        let id = handle.id();
        connections
            .connect(&TenantLogin::email_only(email))
            .await
            .unwrap();
        connections.register(email, handle).await;
        (id, rx)
    }

    #[tokio::test]
    async fn test_trigger_carries_all_active_domains() {
        let store = MemoryStore::new();
        let (scheduler, connections) = scheduler_for(Arc::new(store.clone()));
        store.add_domain("user@x.com", "a.com").await.unwrap();
        store.add_domain("user@x.com", "b.com").await.unwrap();
        let (_, mut rx) = open_session(&connections, "user@x.com").await;

        let report = scheduler.run_tick().await;

        assert_eq!(report.triggered, 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            ServerMessage::scrape_trigger("user@x.com", vec!["a.com".into(), "b.com".into()])
        );
        assert!(rx.try_recv().is_err(), "exactly one trigger per tick");

        let tenant = store.find_tenant("user@x.com").await.unwrap().unwrap();
        let domains = store.active_domains(tenant.id).await.unwrap();
        assert!(domains.iter().all(|d| d.last_scrape.is_some()));
    }

    #[tokio::test]
    async fn test_tenant_without_active_domains_gets_nothing() {
        let store = MemoryStore::new();
        let (scheduler, connections) = scheduler_for(Arc::new(store.clone()));
        store.add_domain("user@x.com", "a.com").await.unwrap();
        let tenant = store.find_tenant("user@x.com").await.unwrap().unwrap();
        store.deactivate_domain(tenant.id, "a.com").await.unwrap();
        let (_, mut rx) = open_session(&connections, "user@x.com").await;

        let report = scheduler.run_tick().await;

        assert_eq!(report.no_domains, 1);
        assert_eq!(report.triggered, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connected_tenant_without_session_is_skipped() {
        let store = MemoryStore::new();
        let (scheduler, connections) = scheduler_for(Arc::new(store.clone()));
        store.add_domain("user@x.com", "a.com").await.unwrap();
        connections
            .connect(&TenantLogin::email_only("user@x.com"))
            .await
            .unwrap();

        let report = scheduler.run_tick().await;

        assert_eq!(report.offline, 1);
        let tenant = store.find_tenant("user@x.com").await.unwrap().unwrap();
        let domains = store.active_domains(tenant.id).await.unwrap();
        assert!(domains[0].last_scrape.is_none());
    }

    #[tokio::test]
    async fn test_transport_close_without_logout_stops_triggers() {
        let store = MemoryStore::new();
        let (scheduler, connections) = scheduler_for(Arc::new(store.clone()));
        store.add_domain("user@x.com", "a.com").await.unwrap();
        let (session_id, mut rx) = open_session(&connections, "user@x.com").await;

        connections
            .session_closed("user@x.com", session_id)
            .await
            .unwrap();
        let report = scheduler.run_tick().await;

        assert_eq!(report.tenants, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_writer_counts_as_offline() {
        let store = MemoryStore::new();
        let (scheduler, connections) = scheduler_for(Arc::new(store.clone()));
        store.add_domain("user@x.com", "a.com").await.unwrap();
        let (_, rx) = open_session(&connections, "user@x.com").await;
        drop(rx);

        assert_eq!(scheduler.run_tick().await.offline, 1);
    }

    /// Delegates to a `MemoryStore` but fails or hangs for chosen tenants.
    struct FaultyStore {
        inner: MemoryStore,
        fail_for: Option<Uuid>,
        hang_for: Option<Uuid>,
    }

    #[async_trait]
    impl TenantStore for FaultyStore {
        async fn find_tenant(&self, email: &str) -> StoreResult<Option<Tenant>> {
            self.inner.find_tenant(email).await
        }
        async fn record_login(&self, login: &TenantLogin) -> StoreResult<Tenant> {
            self.inner.record_login(login).await
        }
        async fn set_connected(&self, email: &str, connected: bool) -> StoreResult<bool> {
            self.inner.set_connected(email, connected).await
        }
        async fn connected_tenants(&self) -> StoreResult<Vec<Tenant>> {
            self.inner.connected_tenants().await
        }
        async fn active_domains(&self, tenant_id: Uuid) -> StoreResult<Vec<Domain>> {
            if self.fail_for == Some(tenant_id) {
                return Err(StoreError::Corrupt("boom".into()));
            }
            if self.hang_for == Some(tenant_id) {
                std::future::pending::<()>().await;
            }
            self.inner.active_domains(tenant_id).await
        }
        async fn add_domain(&self, email: &str, domain: &str) -> StoreResult<Vec<String>> {
            self.inner.add_domain(email, domain).await
        }
        async fn rename_domain(
            &self,
            tenant_id: Uuid,
            from: &str,
            to: &str,
        ) -> StoreResult<DomainRename> {
            self.inner.rename_domain(tenant_id, from, to).await
        }
        async fn deactivate_domain(&self, tenant_id: Uuid, name: &str) -> StoreResult<bool> {
            self.inner.deactivate_domain(tenant_id, name).await
        }
        async fn mark_scraped(&self, ids: &[Uuid], at: DateTime<Utc>) -> StoreResult<()> {
            self.inner.mark_scraped(ids, at).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_failing_tenant_does_not_block_others() {
        let inner = MemoryStore::new();
        for email in ["bad@x.com", "slow@x.com", "good@x.com"] {
            inner.add_domain(email, "a.com").await.unwrap();
        }
        let bad = inner.find_tenant("bad@x.com").await.unwrap().unwrap().id;
        let slow = inner.find_tenant("slow@x.com").await.unwrap().unwrap().id;
        let store: Arc<dyn TenantStore> = Arc::new(FaultyStore {
            inner,
            fail_for: Some(bad),
            hang_for: Some(slow),
        });
        let (scheduler, connections) = scheduler_for(store);
        let (_, _bad_rx) = open_session(&connections, "bad@x.com").await;
        let (_, _slow_rx) = open_session(&connections, "slow@x.com").await;
        let (_, mut good_rx) = open_session(&connections, "good@x.com").await;

        let report = scheduler.run_tick().await;

        assert_eq!(report.tenants, 3);
        assert_eq!(report.triggered, 1);
        assert_eq!(report.failed, 2);
        assert!(matches!(
            good_rx.try_recv(),
            Ok(ServerMessage::EmailScrapeTrigger { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_scheduler_fires_after_interval() {
        let store = MemoryStore::new();
        let (scheduler, connections) = scheduler_for(Arc::new(store.clone()));
        store.add_domain("user@x.com", "a.com").await.unwrap();
        let (_, mut rx) = open_session(&connections, "user@x.com").await;

        let handle = scheduler.spawn();
        let first = tokio::time::timeout(INTERVAL * 2, rx.recv()).await;
        handle.abort();

        assert!(matches!(
            first,
            Ok(Some(ServerMessage::EmailScrapeTrigger { .. }))
        ));
    }
}
