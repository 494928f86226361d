// Tenant management: monitored domains and REST login/logout.

pub mod handlers;
pub mod validation;
