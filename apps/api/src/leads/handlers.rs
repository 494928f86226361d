use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::leads::dedup::{ingest_batch, IncomingEmail};
use crate::models::lead::{Lead, LeadStatus, UnknownStatus};
use crate::state::AppState;

const MAX_LIST_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct SubmitLeadsRequest {
    #[serde(default)]
    pub emails: Option<Vec<IncomingEmail>>,
}

#[derive(Debug, Serialize)]
pub struct SubmitLeadsResponse {
    pub message: String,
    pub count: usize,
    pub success: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LeadListResponse {
    pub leads: Vec<Lead>,
    pub success: bool,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DateUpdate {
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LeadResponse {
    pub message: String,
    pub lead: Lead,
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
    pub success: bool,
}

/// POST /leads
///
/// Parses and deduplicates every submitted snippet. `count` is the number of
/// newly stored leads; rejected and duplicate snippets are not distinguished.
pub async fn handle_submit_leads(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SubmitLeadsRequest>,
) -> Result<(StatusCode, Json<SubmitLeadsResponse>), AppError> {
    let emails = req
        .emails
        .ok_or_else(|| AppError::Validation("Emails array is required".to_string()))?;

    let outcome = ingest_batch(state.leads.as_ref(), &emails).await?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitLeadsResponse {
            message: format!("Successfully processed {} leads", outcome.created),
            count: outcome.created,
            success: true,
        }),
    ))
}

/// GET /leads
pub async fn handle_list_leads(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListQuery>,
) -> Result<Json<LeadListResponse>, AppError> {
    let limit = params
        .limit
        .unwrap_or(state.config.leads_list_limit)
        .clamp(1, MAX_LIST_LIMIT);
    let leads = state.leads.list_recent(limit).await?;
    Ok(Json(LeadListResponse {
        leads,
        success: true,
    }))
}

/// PUT /leads/:id/status
pub async fn handle_update_status(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<StatusUpdate>,
) -> Result<Json<LeadResponse>, AppError> {
    let status = req
        .status
        .ok_or_else(|| AppError::Validation("Status is required".to_string()))?
        .parse::<LeadStatus>()
        .map_err(|e: UnknownStatus| AppError::Validation(e.to_string()))?;

    let lead = state
        .leads
        .update_status(id, status)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Lead {id} not found")))?;

    Ok(Json(LeadResponse {
        message: "Lead status updated".to_string(),
        lead,
        success: true,
    }))
}

/// PUT /leads/:id/date
pub async fn handle_update_date(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<DateUpdate>,
) -> Result<Json<LeadResponse>, AppError> {
    let raw = req
        .date
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Date is required".to_string()))?;
    let date = parse_request_date(&raw)
        .ok_or_else(|| AppError::Validation(format!("Invalid date '{raw}'")))?;

    let lead = state
        .leads
        .update_date(id, date)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Lead {id} not found")))?;

    Ok(Json(LeadResponse {
        message: "Lead date updated".to_string(),
        lead,
        success: true,
    }))
}

/// DELETE /leads/:id
pub async fn handle_delete_lead(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    if !state.leads.delete(id).await? {
        return Err(AppError::NotFound("Lead not found".to_string()));
    }
    Ok(Json(MessageResponse {
        message: "Lead deleted successfully".to_string(),
        success: true,
    }))
}

/// Accepts an RFC 3339 timestamp (the date in its own offset is kept) or a
/// plain `YYYY-MM-DD`.
fn parse_request_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.date_naive())
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}
