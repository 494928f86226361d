use std::sync::Arc;

use crate::channel::registry::ConnectionManager;
use crate::config::Config;
use crate::store::{LeadStore, TenantStore};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub leads: Arc<dyn LeadStore>,
    pub tenants: Arc<dyn TenantStore>,
    /// Session registry and sole writer of the tenant "connected" flag.
    pub connections: Arc<ConnectionManager>,
    pub config: Config,
}

impl AppState {
    pub fn new(
        leads: Arc<dyn LeadStore>,
        tenants: Arc<dyn TenantStore>,
        config: Config,
    ) -> Self {
        let connections = Arc::new(ConnectionManager::new(tenants.clone()));
        Self {
            leads,
            tenants,
            connections,
            config,
        }
    }
}
