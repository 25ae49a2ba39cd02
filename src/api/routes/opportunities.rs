//! Read-only endpoints over memory

use crate::api::server::AppState;
use crate::memory;
use crate::types::{MemoryStats, Opportunity};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Query parameters for listing opportunities
#[derive(Debug, Deserialize)]
pub struct ListOpportunitiesQuery {
    /// Maximum number to return
    pub limit: Option<usize>,
}

/// Opportunities response
#[derive(Debug, Serialize)]
pub struct OpportunitiesResponse {
    /// Newest first
    pub opportunities: Vec<Opportunity>,
    pub total: usize,
    pub threshold: Decimal,
    pub last_scan: Option<DateTime<Utc>>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: error.into() }))
}

/// List opportunities in memory
pub async fn list_opportunities(
    State(state): State<AppState>,
    Query(query): Query<ListOpportunitiesQuery>,
) -> Json<OpportunitiesResponse> {
    let opportunities = state.opportunities.read().await;

    let newest_first: Vec<Opportunity> = opportunities
        .iter()
        .rev()
        .take(query.limit.unwrap_or(50))
        .cloned()
        .collect();

    Json(OpportunitiesResponse {
        opportunities: newest_first,
        total: opportunities.len(),
        threshold: state.threshold,
        last_scan: *state.last_scan.read().await,
    })
}

/// Aggregate figures over memory
pub async fn get_stats(State(state): State<AppState>) -> Json<MemoryStats> {
    let opportunities = state.opportunities.read().await;
    Json(memory::summarize(&opportunities, state.threshold))
}

/// Download memory as CSV
pub async fn export_csv(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let opportunities = state.opportunities.read().await;

    let mut body = Vec::new();
    memory::write_csv(&opportunities, &mut body)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let disposition = format!(
        "attachment; filename=\"opportunities_{}.csv\"",
        Utc::now().format("%Y%m%d_%H%M%S")
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}
