//! phd-rd library - result data service
//!
//! Stores ResultSets (one algorithm execution against a plate measurement)
//! with their ResultData and ResultFeatureStat children, enforces the
//! OPEN -> COMPLETED lifecycle, and serves plate-level aggregations.

use axum::Router;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod consumer;
pub mod db;
pub mod error;
pub mod pagination;
pub mod services;

pub use error::{ApiError, ApiResult};

use consumer::IngestMessage;
use services::ResultServices;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub services: ResultServices,
    /// Queue feeding the ingest consumer
    pub ingest: mpsc::Sender<IngestMessage>,
}

impl AppState {
    pub fn new(services: ResultServices, ingest: mpsc::Sender<IngestMessage>) -> Self {
        Self { services, ingest }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::result_set_routes())
        .merge(api::result_data_routes())
        .merge(api::feature_stat_routes())
        .merge(api::plate_result_routes())
        .merge(api::ingest_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
