mod channel;
mod config;
mod db;
mod errors;
mod extract;
mod leads;
mod models;
mod routes;
mod scheduler;
mod state;
mod store;
mod tenants;

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::routes::{build_channel_router, build_router};
use crate::scheduler::ScrapeScheduler;
use crate::state::AppState;
use crate::store::memory::MemoryStore;
use crate::store::postgres::PgStore;
use crate::store::{LeadStore, TenantStore};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Leadflow v{}", env!("CARGO_PKG_VERSION"));

    let (leads, tenants): (Arc<dyn LeadStore>, Arc<dyn TenantStore>) =
        match &config.database_url {
            Some(url) => {
                let store = PgStore::new(create_pool(url).await?);
                (Arc::new(store.clone()), Arc::new(store))
            }
            None => {
                warn!("DATABASE_URL not set; using in-memory store (data is lost on restart)");
                let store = MemoryStore::new();
                (Arc::new(store.clone()), Arc::new(store))
            }
        };

    let state = AppState::new(leads, tenants, config.clone());

    let scheduler = ScrapeScheduler::new(
        state.tenants.clone(),
        state.connections.clone(),
        config.scrape_interval,
        config.io_timeout,
    )
    .spawn();

    let app = build_router(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());
    let channel = build_channel_router(state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let ws_addr: SocketAddr = format!("0.0.0.0:{}", config.ws_port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let ws_listener = tokio::net::TcpListener::bind(ws_addr).await?;
    info!("REST API listening on {addr}");
    info!("Push channel listening on ws://{ws_addr}");

    let served = tokio::try_join!(
        axum::serve(listener, app).into_future(),
        axum::serve(ws_listener, channel).into_future(),
    );
    scheduler.abort();
    served?;

    Ok(())
}
