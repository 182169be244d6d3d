//! HTTP API handlers for phd-rd

pub mod feature_stats;
pub mod health;
pub mod ingest;
pub mod plate_results;
pub mod result_data;
pub mod result_sets;

pub use health::health_routes;
pub use ingest::ingest_routes;
pub use plate_results::plate_result_routes;

use crate::AppState;
use axum::routing::get;
use axum::Router;
use phd_common::models::StatusCode;
use phd_common::{Error, Result};

/// `/resultset` and `/resultset/:id`
pub fn result_set_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/resultset",
            get(result_sets::list_result_sets).post(result_sets::create_result_set),
        )
        .route(
            "/resultset/:id",
            get(result_sets::get_result_set)
                .put(result_sets::complete_result_set)
                .delete(result_sets::delete_result_set),
        )
}

/// `/resultset/:id/resultdata[/:data_id]`
pub fn result_data_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/resultset/:id/resultdata",
            get(result_data::list_result_data).post(result_data::create_result_data),
        )
        .route(
            "/resultset/:id/resultdata/:data_id",
            get(result_data::get_result_data)
                .put(result_data::update_result_data)
                .delete(result_data::delete_result_data),
        )
}

/// `/resultset/:id/resultfeaturestat[/:stat_id]`
pub fn feature_stat_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/resultset/:id/resultfeaturestat",
            get(feature_stats::list_feature_stats).post(feature_stats::create_feature_stats),
        )
        .route(
            "/resultset/:id/resultfeaturestat/:stat_id",
            get(feature_stats::get_feature_stat).delete(feature_stats::delete_feature_stat),
        )
}

/// Parse a comma-separated id list query value (`plateId=1,2,3`)
pub(crate) fn parse_id_list(field: &str, raw: Option<&str>) -> Result<Vec<i64>> {
    split_list(raw)
        .map(|part| {
            part.parse::<i64>()
                .map_err(|_| Error::invalid_field(field, format!("'{}' is not a valid id", part)))
        })
        .collect()
}

/// Parse a comma-separated status code list (`outcome=SUCCESS,FAILURE`)
pub(crate) fn parse_status_list(field: &str, raw: Option<&str>) -> Result<Vec<StatusCode>> {
    split_list(raw)
        .map(|part| part.parse::<StatusCode>().map_err(|e| Error::invalid_field(field, e)))
        .collect()
}

fn split_list(raw: Option<&str>) -> impl Iterator<Item = &str> {
    raw.unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id_list() {
        assert_eq!(parse_id_list("plateId", Some("1, 2,3")).unwrap(), vec![1, 2, 3]);
        assert!(parse_id_list("plateId", None).unwrap().is_empty());
        assert!(parse_id_list("plateId", Some("1,x")).is_err());
    }

    #[test]
    fn test_parse_status_list() {
        assert_eq!(
            parse_status_list("outcome", Some("success,FAILURE")).unwrap(),
            vec![StatusCode::Success, StatusCode::Failure]
        );
        assert!(parse_status_list("outcome", Some("DONE")).is_err());
    }
}
