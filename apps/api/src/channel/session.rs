//! WebSocket endpoint for the push channel.
//!
//! Each socket gets a writer task fed by an unbounded queue (the
//! `SessionHandle`) and a reader loop that dispatches client frames.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::channel::protocol::{ClientMessage, ServerMessage};
use crate::channel::registry::{ConnectionManager, SessionHandle};
use crate::models::tenant::{normalize_email, TenantLogin};
use crate::state::AppState;

/// GET / (push-channel port)
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| run_socket(socket, state.connections))
}

async fn run_socket(socket: WebSocket, connections: Arc<ConnectionManager>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let mut session = Session::new(SessionHandle::new(tx));
    debug!(session = %session.handle.id(), "Push channel opened");

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode push-channel frame: {e}");
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(text)).await {
                debug!("Push channel write failed: {e}");
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => session.handle_text(&text, &connections).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Push channel read failed: {e}");
                break;
            }
        }
    }

    session.closed(&connections).await;
    // Dropping the receiver makes any handle still held elsewhere report closed.
    writer.abort();
}

/// Per-socket protocol state.
struct Session {
    handle: SessionHandle,
    /// Every email that logged in on this socket, oldest first. Each one may
    /// still be tracked to this handle, so all are released on close.
    emails: Vec<String>,
}

impl Session {
    fn new(handle: SessionHandle) -> Self {
        Self {
            handle,
            emails: Vec::new(),
        }
    }

    async fn handle_text(&mut self, text: &str, connections: &ConnectionManager) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(msg) => self.handle_message(msg, connections).await,
            Err(e) => warn!("Ignoring malformed push-channel frame: {e}"),
        }
    }

    async fn handle_message(&mut self, msg: ClientMessage, connections: &ConnectionManager) {
        match msg {
            ClientMessage::Login { email } => {
                let email = normalize_email(&email);
                if email.is_empty() {
                    warn!("Ignoring push-channel login without email");
                    return;
                }
                info!(email = %email, session = %self.handle.id(), "Push-channel login");
                self.emails.retain(|e| e != &email);
                self.emails.push(email.clone());
                connections.register(&email, self.handle.clone()).await;

                match connections.connect(&TenantLogin::email_only(&email)).await {
                    Ok(tenant) => {
                        self.handle.deliver(ServerMessage::LoginSuccess {
                            user_id: tenant.id,
                            message: "Login successful".to_string(),
                        });
                    }
                    Err(e) => error!(email = %email, "Failed to record push-channel login: {e}"),
                }
            }
            ClientMessage::Logout { email } => {
                let Some(email) = email
                    .map(|e| normalize_email(&e))
                    .or_else(|| self.emails.last().cloned())
                else {
                    warn!("Ignoring push-channel logout without email");
                    return;
                };
                self.emails.retain(|e| e != &email);
                if let Err(e) = connections.disconnect(&email).await {
                    error!(email = %email, "Failed to record push-channel logout: {e}");
                }
            }
            ClientMessage::ScrapingResults {
                email,
                total_emails,
                matching_emails,
            } => {
                info!(
                    email = %email,
                    total_emails,
                    matching_emails,
                    "Scrape finished on client"
                );
            }
            ClientMessage::ScrapingError { email, error } => {
                warn!(email = %email, "Scrape failed on client: {error}");
            }
        }
    }

    /// Transport closed, with or without a prior `logout`.
    async fn closed(&mut self, connections: &ConnectionManager) {
        for email in self.emails.drain(..) {
            if let Err(e) = connections.session_closed(&email, self.handle.id()).await {
                error!(email = %email, "Failed to record disconnect: {e}");
            }
        }
    }
}
