use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// When unset, the service runs on the in-memory store.
    pub database_url: Option<String>,
    pub port: u16,
    /// Push-channel port, distinct from the REST port.
    pub ws_port: u16,
    pub scrape_interval: Duration,
    /// Upper bound for a single store call or push during a scheduler tick,
    /// and for a whole REST request.
    pub io_timeout: Duration,
    pub leads_list_limit: i64,
    pub rust_log: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: None,
            port: 8083,
            ws_port: 8084,
            scrape_interval: Duration::from_secs(60),
            io_timeout: Duration::from_secs(10),
            leads_list_limit: 50,
            rust_log: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = Config::default();
        Ok(Config {
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            port: parse_env("PORT", defaults.port)?,
            ws_port: parse_env("WS_PORT", defaults.ws_port)?,
            scrape_interval: Duration::from_secs(
                parse_env("SCRAPE_INTERVAL_SECS", defaults.scrape_interval.as_secs())?.max(1),
            ),
            io_timeout: Duration::from_secs(
                parse_env("IO_TIMEOUT_SECS", defaults.io_timeout.as_secs())?.max(1),
            ),
            leads_list_limit: parse_env("LEADS_LIST_LIMIT", defaults.leads_list_limit)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or(defaults.rust_log),
        })
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("{key} must be a valid number, got '{raw}'"))
}
