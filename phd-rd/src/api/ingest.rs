//! Message ingestion endpoint
//!
//! Accepts the same messages the consumer reads and queues them; processing
//! happens asynchronously, so the response only confirms acceptance.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use phd_common::Error;
use tracing::debug;

use crate::consumer::IngestMessage;
use crate::error::ApiResult;
use crate::AppState;

/// POST /ingest
pub async fn ingest_message(
    State(state): State<AppState>,
    payload: Result<Json<IngestMessage>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let Json(message) = payload?;
    debug!("Queueing ingest message {}", message.kind());

    state
        .ingest
        .send(message)
        .await
        .map_err(|_| Error::Internal("ingest consumer is not running".to_string()))?;
    Ok(StatusCode::ACCEPTED)
}

/// Build ingest routes
pub fn ingest_routes() -> Router<AppState> {
    Router::new().route("/ingest", post(ingest_message))
}
