use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::extract::{ApiJson, ApiPath};
use crate::models::tenant::{normalize_domain, normalize_email, DomainRename, Tenant, TenantLogin};
use crate::state::AppState;
use crate::tenants::validation::is_valid_domain;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AddDomainRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameDomainRequest {
    #[serde(default)]
    pub new_domain: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DomainTestRequest {
    #[serde(default)]
    pub domain: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DomainListResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub domains: Vec<String>,
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct DomainCountResponse {
    pub count: usize,
    pub success: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainTestResponse {
    pub is_valid: bool,
    pub message: String,
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub user: Tenant,
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub message: String,
    pub success: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /user/domains
///
/// Adds a monitored domain, creating the tenant on first use. A previously
/// removed domain of the same name is reactivated.
pub async fn handle_add_domain(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AddDomainRequest>,
) -> Result<(StatusCode, Json<DomainListResponse>), AppError> {
    let (email, domain) = match (non_empty(req.email), non_empty(req.domain)) {
        (Some(email), Some(domain)) => (normalize_email(&email), normalize_domain(&domain)),
        _ => {
            return Err(AppError::Validation(
                "Email and domain are required".to_string(),
            ))
        }
    };

    let domains = state.tenants.add_domain(&email, &domain).await?;
    Ok((
        StatusCode::CREATED,
        Json(DomainListResponse {
            message: Some("Domain saved successfully".to_string()),
            domains,
            success: true,
        }),
    ))
}

/// GET /user/domains/:email
///
/// An unknown tenant simply has no domains.
pub async fn handle_list_domains(
    State(state): State<AppState>,
    ApiPath(email): ApiPath<String>,
) -> Result<Json<DomainListResponse>, AppError> {
    let domains = match state.tenants.find_tenant(&normalize_email(&email)).await? {
        Some(tenant) => active_domain_names(&state, tenant.id).await?,
        None => Vec::new(),
    };
    Ok(Json(DomainListResponse {
        message: None,
        domains,
        success: true,
    }))
}

/// GET /user/domains/:email/count
pub async fn handle_count_domains(
    State(state): State<AppState>,
    ApiPath(email): ApiPath<String>,
) -> Result<Json<DomainCountResponse>, AppError> {
    let count = match state.tenants.find_tenant(&normalize_email(&email)).await? {
        Some(tenant) => state.tenants.active_domains(tenant.id).await?.len(),
        None => 0,
    };
    Ok(Json(DomainCountResponse {
        count,
        success: true,
    }))
}

/// PUT /user/domains/:email/:domain
pub async fn handle_rename_domain(
    State(state): State<AppState>,
    ApiPath((email, domain)): ApiPath<(String, String)>,
    ApiJson(req): ApiJson<RenameDomainRequest>,
) -> Result<Json<DomainListResponse>, AppError> {
    let new_domain = non_empty(req.new_domain)
        .map(|d| normalize_domain(&d))
        .ok_or_else(|| AppError::Validation("newDomain is required".to_string()))?;
    let tenant = find_tenant_or_404(&state, &email).await?;

    match state
        .tenants
        .rename_domain(tenant.id, &normalize_domain(&domain), &new_domain)
        .await?
    {
        DomainRename::Renamed => {}
        DomainRename::AlreadyExists => {
            return Err(AppError::Conflict("Domain already exists".to_string()))
        }
        DomainRename::NotFound => return Err(AppError::NotFound("Domain not found".to_string())),
    }

    Ok(Json(DomainListResponse {
        message: Some("Domain updated successfully".to_string()),
        domains: active_domain_names(&state, tenant.id).await?,
        success: true,
    }))
}

/// DELETE /user/domains/:email/:domain
///
/// Soft delete: the domain is marked inactive and kept for history.
pub async fn handle_remove_domain(
    State(state): State<AppState>,
    ApiPath((email, domain)): ApiPath<(String, String)>,
) -> Result<Json<DomainListResponse>, AppError> {
    let tenant = find_tenant_or_404(&state, &email).await?;
    if !state
        .tenants
        .deactivate_domain(tenant.id, &normalize_domain(&domain))
        .await?
    {
        return Err(AppError::NotFound("Domain not found".to_string()));
    }

    Ok(Json(DomainListResponse {
        message: Some("Domain deleted successfully".to_string()),
        domains: active_domain_names(&state, tenant.id).await?,
        success: true,
    }))
}

/// POST /user/domains/test
pub async fn handle_test_domain(
    ApiJson(req): ApiJson<DomainTestRequest>,
) -> Result<Json<DomainTestResponse>, AppError> {
    let domain = non_empty(req.domain)
        .ok_or_else(|| AppError::Validation("Domain is required".to_string()))?;
    let is_valid = is_valid_domain(&domain);
    Ok(Json(DomainTestResponse {
        is_valid,
        message: if is_valid {
            "Domain is valid".to_string()
        } else {
            "Invalid domain format".to_string()
        },
        success: true,
    }))
}

/// POST /user/login
pub async fn handle_login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let email = non_empty(req.email)
        .ok_or_else(|| AppError::Validation("Email is required".to_string()))?;
    let user = state
        .connections
        .connect(&TenantLogin {
            email,
            name: non_empty(req.name),
            picture: non_empty(req.picture),
        })
        .await?;
    Ok(Json(LoginResponse {
        message: "Login successful".to_string(),
        user,
        success: true,
    }))
}

/// POST /user/logout
///
/// Same effect as a push-channel logout: the tracked session is dropped and
/// the tenant stops receiving scrape triggers.
pub async fn handle_logout(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LogoutRequest>,
) -> Result<Json<LogoutResponse>, AppError> {
    let email = non_empty(req.email)
        .ok_or_else(|| AppError::Validation("Email is required".to_string()))?;
    if !state.connections.disconnect(&email).await? {
        return Err(AppError::NotFound("User not found".to_string()));
    }
    Ok(Json(LogoutResponse {
        message: "Logout successful".to_string(),
        success: true,
    }))
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

async fn find_tenant_or_404(state: &AppState, email: &str) -> Result<Tenant, AppError> {
    state
        .tenants
        .find_tenant(&normalize_email(email))
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

async fn active_domain_names(state: &AppState, tenant_id: Uuid) -> Result<Vec<String>, AppError> {
    Ok(state
        .tenants
        .active_domains(tenant_id)
        .await?
        .into_iter()
        .map(|d| d.name)
        .collect())
}
