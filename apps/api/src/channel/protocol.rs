//! Push-channel frames. Every frame is a JSON text message tagged by `type`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Frames sent by the mail client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Login {
        email: String,
    },
    /// Falls back to the session's login email when `email` is absent.
    Logout {
        #[serde(default)]
        email: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ScrapingResults {
        email: String,
        #[serde(default)]
        total_emails: u64,
        #[serde(default)]
        matching_emails: u64,
    },
    ScrapingError {
        email: String,
        #[serde(default)]
        error: String,
    },
}

/// Frames pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    LoginSuccess { user_id: Uuid, message: String },
    EmailScrapeTrigger { email: String, domains: Vec<String> },
}

impl ServerMessage {
    pub fn scrape_trigger(email: &str, domains: Vec<String>) -> Self {
        ServerMessage::EmailScrapeTrigger {
            email: email.to_string(),
            domains,
        }
    }
}
