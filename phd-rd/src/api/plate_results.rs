//! Plate-level aggregated result views

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    routing::get,
    Json, Router,
};
use phd_common::api::{plate_results_to_dto, AggregatedResultDto, PlateResultsDto};
use phd_common::models::PlateResultFilter;
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::services::aggregator::{EnrichedPlateResults, MeasurementResults, ProtocolResults};
use crate::services::metadata::PlateInfo;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlateResultQuery {
    pub protocol_id: Option<i64>,
    pub meas_id: Option<i64>,
    pub latest: Option<bool>,
}

impl PlateResultQuery {
    fn filter(&self, latest: bool) -> PlateResultFilter {
        PlateResultFilter {
            latest: latest || self.latest.unwrap_or(false),
            protocol_id: self.protocol_id,
            meas_id: self.meas_id,
        }
    }
}

// ========================================
// Enriched wire form
// ========================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedPlateResultsDto {
    pub plate: PlateInfo,
    pub protocols: Vec<ProtocolResultsDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolResultsDto {
    pub protocol_id: i64,
    pub protocol_name: String,
    pub measurements: Vec<MeasurementResultsDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementResultsDto {
    pub meas_id: i64,
    pub results: Vec<NamedResultDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedResultDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_name: Option<String>,
    #[serde(flatten)]
    pub result: AggregatedResultDto,
}

impl From<EnrichedPlateResults> for EnrichedPlateResultsDto {
    fn from(results: EnrichedPlateResults) -> Self {
        Self {
            plate: results.plate,
            protocols: results.protocols.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<ProtocolResults> for ProtocolResultsDto {
    fn from(protocol: ProtocolResults) -> Self {
        Self {
            protocol_id: protocol.protocol_id,
            protocol_name: protocol.protocol_name,
            measurements: protocol.measurements.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<MeasurementResults> for MeasurementResultsDto {
    fn from(measurement: MeasurementResults) -> Self {
        Self {
            meas_id: measurement.meas_id,
            results: measurement
                .results
                .into_iter()
                .map(|named| NamedResultDto {
                    feature_name: named.feature_name,
                    result: named.result.into(),
                })
                .collect(),
        }
    }
}

// ========================================
// Handlers
// ========================================

/// GET /plate-results/:plate_id
pub async fn get_plate_results(
    State(state): State<AppState>,
    plate_id: Result<Path<i64>, PathRejection>,
    query: Result<Query<PlateResultQuery>, QueryRejection>,
) -> ApiResult<Json<PlateResultsDto>> {
    let Path(plate_id) = plate_id?;
    let Query(query) = query?;
    let results = state
        .services
        .aggregator
        .plate_results(plate_id, &query.filter(false))
        .await?;
    Ok(Json(plate_results_to_dto(results)))
}

/// GET /plate-results/:plate_id/latest
pub async fn get_latest_plate_results(
    State(state): State<AppState>,
    plate_id: Result<Path<i64>, PathRejection>,
    query: Result<Query<PlateResultQuery>, QueryRejection>,
) -> ApiResult<Json<PlateResultsDto>> {
    let Path(plate_id) = plate_id?;
    let Query(query) = query?;
    let results = state
        .services
        .aggregator
        .plate_results(plate_id, &query.filter(true))
        .await?;
    Ok(Json(plate_results_to_dto(results)))
}

/// GET /plate-results/:plate_id/full
pub async fn get_enriched_plate_results(
    State(state): State<AppState>,
    plate_id: Result<Path<i64>, PathRejection>,
    query: Result<Query<PlateResultQuery>, QueryRejection>,
) -> ApiResult<Json<EnrichedPlateResultsDto>> {
    let Path(plate_id) = plate_id?;
    let Query(query) = query?;
    let results = state
        .services
        .aggregator
        .enriched_plate_results(plate_id, &query.filter(false))
        .await?;
    Ok(Json(results.into()))
}

/// Build plate result routes
pub fn plate_result_routes() -> Router<AppState> {
    Router::new()
        .route("/plate-results/:plate_id", get(get_plate_results))
        .route("/plate-results/:plate_id/latest", get(get_latest_plate_results))
        .route("/plate-results/:plate_id/full", get(get_enriched_plate_results))
}
