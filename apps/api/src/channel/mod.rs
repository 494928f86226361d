// Push channel: per-tenant WebSocket sessions used to deliver scrape triggers
// and receive scrape outcomes from the mail client.

pub mod protocol;
pub mod registry;
pub mod session;
