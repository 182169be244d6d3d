//! ResultFeatureStat endpoints, nested under their ResultSet

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use phd_common::api::{
    feature_stats_from_requests, FeatureStatCreateRequest, PagedResponse, ResultFeatureStatDto,
};
use phd_common::models::FeatureStatFilter;
use serde::Deserialize;

use super::parse_id_list;
use crate::error::ApiResult;
use crate::pagination::{PageParams, PageRequest};
use crate::AppState;

/// A single stat object or an array of them
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FeatureStatPayload {
    Many(Vec<FeatureStatCreateRequest>),
    One(FeatureStatCreateRequest),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureStatQuery {
    pub feature_id: Option<String>,
    pub feature_stat_id: Option<String>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

/// GET /resultset/:id/resultfeaturestat
pub async fn list_feature_stats(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    query: Result<Query<FeatureStatQuery>, QueryRejection>,
) -> ApiResult<Json<PagedResponse<ResultFeatureStatDto>>> {
    let Path(result_set_id) = id?;
    let Query(query) = query?;
    let filter = FeatureStatFilter {
        feature_ids: parse_id_list("featureId", query.feature_id.as_deref())?,
        feature_stat_ids: parse_id_list("featureStatId", query.feature_stat_id.as_deref())?,
    };
    let request = PageRequest::try_from(PageParams {
        page: query.page,
        size: query.size,
    })?;

    let page = state
        .services
        .attachments
        .list_feature_stats(result_set_id, &filter, request)
        .await?;
    Ok(Json(page.into_response()))
}

/// POST /resultset/:id/resultfeaturestat
///
/// A single object yields a single object; an array is created all or
/// nothing and yields an array.
pub async fn create_feature_stats(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<FeatureStatPayload>, JsonRejection>,
) -> ApiResult<Response> {
    let Path(result_set_id) = id?;
    let Json(payload) = payload?;
    let attachments = &state.services.attachments;

    let response = match payload {
        FeatureStatPayload::One(request) => {
            let created = attachments
                .create_feature_stat(result_set_id, request.into_new_feature_stat()?)
                .await?;
            (StatusCode::CREATED, Json(ResultFeatureStatDto::from(created))).into_response()
        }
        FeatureStatPayload::Many(requests) => {
            let created = attachments
                .create_feature_stats(result_set_id, feature_stats_from_requests(requests)?)
                .await?;
            let body: Vec<ResultFeatureStatDto> = created.into_iter().map(Into::into).collect();
            (StatusCode::CREATED, Json(body)).into_response()
        }
    };
    Ok(response)
}

/// GET /resultset/:id/resultfeaturestat/:stat_id
pub async fn get_feature_stat(
    State(state): State<AppState>,
    ids: Result<Path<(i64, i64)>, PathRejection>,
) -> ApiResult<Json<ResultFeatureStatDto>> {
    let Path((result_set_id, stat_id)) = ids?;
    let stat = state
        .services
        .attachments
        .get_feature_stat(result_set_id, stat_id)
        .await?;
    Ok(Json(stat.into()))
}

/// DELETE /resultset/:id/resultfeaturestat/:stat_id
pub async fn delete_feature_stat(
    State(state): State<AppState>,
    ids: Result<Path<(i64, i64)>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path((result_set_id, stat_id)) = ids?;
    state
        .services
        .attachments
        .delete_feature_stat(result_set_id, stat_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
