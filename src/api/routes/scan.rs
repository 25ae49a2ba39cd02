//! Endpoints that change memory

use crate::api::routes::opportunities::{api_error, ApiError};
use crate::api::server::{AppState, ScanRefusal};
use crate::types::Opportunity;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::error;

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub count: usize,
    pub new_opportunities: Vec<Opportunity>,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub removed: usize,
}

fn refusal(refusal: ScanRefusal) -> ApiError {
    match refusal {
        ScanRefusal::Busy => api_error(StatusCode::CONFLICT, "a scan is already running"),
        ScanRefusal::Failed(e) => {
            error!("Memory update failed: {}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Run one scan cycle now
pub async fn trigger_scan(State(state): State<AppState>) -> Result<Json<ScanResponse>, ApiError> {
    let new_opportunities = state.run_scan().await.map_err(refusal)?;

    Ok(Json(ScanResponse {
        count: new_opportunities.len(),
        new_opportunities,
    }))
}

/// Remove everything from memory
pub async fn clear_memory(State(state): State<AppState>) -> Result<Json<ClearResponse>, ApiError> {
    let removed = state.clear_memory().await.map_err(refusal)?;
    Ok(Json(ClearResponse { removed }))
}
