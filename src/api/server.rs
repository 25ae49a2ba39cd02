//! Axum server setup and configuration

use crate::api::routes;
use crate::error::PipelineError;
use crate::memory::MemoryStore;
use crate::pipeline::DealPipeline;
use crate::types::Opportunity;
use axum::{
    http::{header, Method},
    routing::{delete, get, post},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<DealPipeline>,
    /// Held for the whole of a scan cycle; one cycle at a time
    pub memory: Arc<Mutex<MemoryStore>>,
    /// Copy of memory's contents, refreshed after every scan or clear
    pub opportunities: Arc<RwLock<Vec<Opportunity>>>,
    pub last_scan: Arc<RwLock<Option<DateTime<Utc>>>>,
    pub threshold: Decimal,
}

/// Why a requested scan did not produce a result
#[derive(Debug)]
pub enum ScanRefusal {
    /// Another cycle holds the memory store
    Busy,
    Failed(PipelineError),
}

impl AppState {
    pub fn new(pipeline: DealPipeline, memory: MemoryStore) -> Self {
        let snapshot = memory.opportunities().to_vec();
        let threshold = pipeline.threshold();

        Self {
            pipeline: Arc::new(pipeline),
            memory: Arc::new(Mutex::new(memory)),
            opportunities: Arc::new(RwLock::new(snapshot)),
            last_scan: Arc::new(RwLock::new(None)),
            threshold,
        }
    }

    /// Run one cycle unless another one is already in progress
    pub async fn run_scan(&self) -> Result<Vec<Opportunity>, ScanRefusal> {
        let mut memory = self.memory.try_lock().map_err(|_| ScanRefusal::Busy)?;

        let result = self.pipeline.run_cycle(&mut memory).await;
        *self.opportunities.write().await = memory.opportunities().to_vec();
        *self.last_scan.write().await = Some(Utc::now());

        result.map_err(ScanRefusal::Failed)
    }

    /// Empty memory and persist the empty document
    pub async fn clear_memory(&self) -> Result<usize, ScanRefusal> {
        let mut memory = self.memory.try_lock().map_err(|_| ScanRefusal::Busy)?;

        let removed = memory.len();
        memory.clear();
        self.opportunities.write().await.clear();
        memory
            .persist()
            .await
            .map_err(|e| ScanRefusal::Failed(e.into()))?;

        info!("Cleared {} opportunities from memory", removed);
        Ok(removed)
    }
}

/// Create the Axum application with all routes
pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let api_routes = Router::new()
        .route("/opportunities", get(routes::opportunities::list_opportunities))
        .route("/stats", get(routes::opportunities::get_stats))
        .route("/export", get(routes::opportunities::export_csv))
        .route("/scan", post(routes::scan::trigger_scan))
        .route("/memory", delete(routes::scan::clear_memory));

    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
