//! ResultData endpoints, nested under their ResultSet

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use phd_common::api::{PagedResponse, ResultDataCreateRequest, ResultDataDto};
use phd_common::models::ResultDataFilter;
use serde::Deserialize;

use super::parse_id_list;
use crate::error::ApiResult;
use crate::pagination::{PageParams, PageRequest};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultDataQuery {
    pub feature_id: Option<String>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

/// GET /resultset/:id/resultdata
pub async fn list_result_data(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    query: Result<Query<ResultDataQuery>, QueryRejection>,
) -> ApiResult<Json<PagedResponse<ResultDataDto>>> {
    let Path(result_set_id) = id?;
    let Query(query) = query?;
    let filter = ResultDataFilter {
        feature_ids: parse_id_list("featureId", query.feature_id.as_deref())?,
    };
    let request = PageRequest::try_from(PageParams {
        page: query.page,
        size: query.size,
    })?;

    let page = state
        .services
        .attachments
        .list_result_data(result_set_id, &filter, request)
        .await?;
    Ok(Json(page.into_response()))
}

/// POST /resultset/:id/resultdata
pub async fn create_result_data(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<ResultDataCreateRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ResultDataDto>)> {
    let Path(result_set_id) = id?;
    let Json(request) = payload?;
    let created = state
        .services
        .attachments
        .create_result_data(result_set_id, request.into_new_result_data()?)
        .await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// GET /resultset/:id/resultdata/:data_id
pub async fn get_result_data(
    State(state): State<AppState>,
    ids: Result<Path<(i64, i64)>, PathRejection>,
) -> ApiResult<Json<ResultDataDto>> {
    let Path((result_set_id, result_data_id)) = ids?;
    let data = state
        .services
        .attachments
        .get_result_data(result_set_id, result_data_id)
        .await?;
    Ok(Json(data.into()))
}

/// PUT /resultset/:id/resultdata/:data_id
///
/// ResultData cannot be updated; the body is ignored.
pub async fn update_result_data(
    State(state): State<AppState>,
    ids: Result<Path<(i64, i64)>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path((result_set_id, result_data_id)) = ids?;
    state
        .services
        .attachments
        .reject_result_data_update(result_set_id, result_data_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /resultset/:id/resultdata/:data_id
pub async fn delete_result_data(
    State(state): State<AppState>,
    ids: Result<Path<(i64, i64)>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path((result_set_id, result_data_id)) = ids?;
    state
        .services
        .attachments
        .delete_result_data(result_set_id, result_data_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
