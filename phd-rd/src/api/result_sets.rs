//! ResultSet endpoints

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use phd_common::api::{PagedResponse, ResultSetCompleteRequest, ResultSetCreateRequest, ResultSetDto};
use phd_common::models::ResultSetFilter;
use serde::Deserialize;
use tracing::debug;

use super::{parse_id_list, parse_status_list};
use crate::error::ApiResult;
use crate::pagination::{PageParams, PageRequest};
use crate::AppState;

/// Query string of `GET /resultset`
///
/// Id and outcome filters are comma-separated lists.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSetQuery {
    pub id: Option<String>,
    pub plate_id: Option<String>,
    pub protocol_id: Option<String>,
    pub meas_id: Option<String>,
    pub outcome: Option<String>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

impl ResultSetQuery {
    fn filter(&self) -> phd_common::Result<ResultSetFilter> {
        Ok(ResultSetFilter {
            ids: parse_id_list("id", self.id.as_deref())?,
            plate_ids: parse_id_list("plateId", self.plate_id.as_deref())?,
            protocol_ids: parse_id_list("protocolId", self.protocol_id.as_deref())?,
            meas_ids: parse_id_list("measId", self.meas_id.as_deref())?,
            outcomes: parse_status_list("outcome", self.outcome.as_deref())?,
        })
    }

    fn page_request(&self) -> phd_common::Result<PageRequest> {
        PageRequest::try_from(PageParams {
            page: self.page,
            size: self.size,
        })
    }
}

/// GET /resultset
pub async fn list_result_sets(
    State(state): State<AppState>,
    query: Result<Query<ResultSetQuery>, QueryRejection>,
) -> ApiResult<Json<PagedResponse<ResultSetDto>>> {
    let Query(query) = query?;
    let filter = query.filter()?;
    let request = query.page_request()?;
    debug!("Listing ResultSets {:?} page {}", filter, request.page);

    let page = state.services.lifecycle.list_paged(&filter, request).await?;
    Ok(Json(page.into_response()))
}

/// POST /resultset
pub async fn create_result_set(
    State(state): State<AppState>,
    payload: Result<Json<ResultSetCreateRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ResultSetDto>)> {
    let Json(request) = payload?;
    let created = state
        .services
        .lifecycle
        .create(request.into_new_result_set()?)
        .await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// GET /resultset/:id
pub async fn get_result_set(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<ResultSetDto>> {
    let Path(id) = id?;
    let result_set = state.services.lifecycle.get_by_id(id).await?;
    Ok(Json(result_set.into()))
}

/// PUT /resultset/:id
///
/// The only permitted update: completing an OPEN ResultSet.
pub async fn complete_result_set(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<ResultSetCompleteRequest>, JsonRejection>,
) -> ApiResult<Json<ResultSetDto>> {
    let Path(id) = id?;
    let Json(request) = payload?;
    let completed = state
        .services
        .lifecycle
        .complete(id, request.into_completion()?)
        .await?;
    Ok(Json(completed.into()))
}

/// DELETE /resultset/:id
pub async fn delete_result_set(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path(id) = id?;
    state.services.lifecycle.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
