//! Connection manager: owns the email → live session map and the tenant
//! "connected" flag.
//!
//! REST login/logout and push-channel login/logout/close all go through
//! this type, so the flag has a single writer. The scheduler only uses
//! `lookup`/`send`; it never touches the map directly.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::channel::protocol::ServerMessage;
use crate::models::tenant::{normalize_email, Tenant, TenantLogin};
use crate::store::{StoreResult, TenantStore};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("no open session for {0}")]
    NoSession(String),

    #[error("session for {0} is closed")]
    Closed(String),
}

/// Write side of one push-channel connection. Frames are queued to the
/// socket's writer task; a send only means the writer accepted the frame.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: Uuid,
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl SessionHandle {
    pub fn new(tx: mpsc::UnboundedSender<ServerMessage>) -> Self {
        SessionHandle {
            id: Uuid::new_v4(),
            tx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// False once the writer task has gone away.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queues a frame for the writer. Returns `false` if the writer is gone.
    pub fn deliver(&self, msg: ServerMessage) -> bool {
        self.tx.send(msg).is_ok()
    }
}

pub struct ConnectionManager {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    tenants: Arc<dyn TenantStore>,
}

impl ConnectionManager {
    pub fn new(tenants: Arc<dyn TenantStore>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            tenants,
        }
    }

    // ── Session registry ────────────────────────────────────────────────

    /// Tracks `handle` as the session for `email`, replacing any previous
    /// one. The replaced socket is not closed; it simply stops receiving
    /// triggers.
    pub async fn register(&self, email: &str, handle: SessionHandle) -> Option<SessionHandle> {
        let email = normalize_email(email);
        let replaced = self.sessions.write().await.insert(email.clone(), handle);
        if let Some(old) = &replaced {
            warn!(email = %email, old_session = %old.id, "Replaced tracked session; previous socket left open");
        }
        replaced
    }

    /// Removes the tracked session for `email`. With `Some(id)`, only removes
    /// it if it is still that session. Returns whether anything was removed.
    pub async fn deregister(&self, email: &str, session_id: Option<Uuid>) -> bool {
        let email = normalize_email(email);
        let mut sessions = self.sessions.write().await;
        let tracked = sessions.get(&email).map(|s| s.id);
        match (tracked, session_id) {
            (Some(current), Some(id)) if current != id => false,
            (Some(_), _) => sessions.remove(&email).is_some(),
            (None, _) => false,
        }
    }

    pub async fn lookup(&self, email: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(&normalize_email(email)).cloned()
    }

    pub async fn open_sessions(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.is_open())
            .count()
    }

    /// Fire-and-forget push. Transport state is checked right before the
    /// write; there is no acknowledgement from the peer.
    pub async fn send(&self, email: &str, msg: ServerMessage) -> Result<(), ChannelError> {
        let handle = self
            .lookup(email)
            .await
            .ok_or_else(|| ChannelError::NoSession(email.to_string()))?;
        if !handle.is_open() || !handle.deliver(msg) {
            return Err(ChannelError::Closed(email.to_string()));
        }
        Ok(())
    }

    // ── Connection state ────────────────────────────────────────────────

    /// Marks the tenant connected (creating it if needed).
    pub async fn connect(&self, login: &TenantLogin) -> StoreResult<Tenant> {
        let login = TenantLogin {
            email: normalize_email(&login.email),
            ..login.clone()
        };
        let tenant = self.tenants.record_login(&login).await?;
        info!(email = %tenant.email, "Tenant connected");
        Ok(tenant)
    }

    /// Explicit logout: drops whatever session is tracked for the tenant and
    /// marks it disconnected. Returns `false` for an unknown tenant.
    pub async fn disconnect(&self, email: &str) -> StoreResult<bool> {
        let email = normalize_email(email);
        self.deregister(&email, None).await;
        let known = self.tenants.set_connected(&email, false).await?;
        if known {
            info!(email = %email, "Tenant disconnected");
        }
        Ok(known)
    }

    /// Transport closed. Only the currently tracked session may flip the
    /// tenant to disconnected; a stale, replaced socket closing is ignored.
    pub async fn session_closed(&self, email: &str, session_id: Uuid) -> StoreResult<bool> {
        if !self.deregister(email, Some(session_id)).await {
            return Ok(false);
        }
        let email = normalize_email(email);
        self.tenants.set_connected(&email, false).await?;
        info!(email = %email, session = %session_id, "Session closed; tenant disconnected");
        Ok(true)
    }
}
