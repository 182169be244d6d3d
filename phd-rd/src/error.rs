//! HTTP error mapping for phd-rd
//!
//! The one place where core error kinds become transport statuses and the
//! `{status: "error", error, malformed_fields?}` body.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use phd_common::api::ErrorResponse;
use phd_common::Error;
use thiserror::Error;
use tracing::error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Core error kind
    #[error(transparent)]
    Core(#[from] Error),

    /// Request body could not be parsed
    #[error("Malformed request body: {0}")]
    Body(String),

    /// Query string or path segment could not be parsed
    #[error("Malformed request parameters: {0}")]
    Params(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Body(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Params(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Params(rejection.body_text())
    }
}

/// Transport status for a core error kind
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Validation { .. }
        | Error::AlreadyCompleted { .. }
        | Error::OwnershipMismatch { .. }
        | Error::DuplicateFeatureStat { .. }
        | Error::TooManyResultSets { .. }
        | Error::UpdateNotSupported(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(..) | Error::ParentNotFound(_) | Error::ChildNotFound(..) => {
            StatusCode::NOT_FOUND
        }
        Error::UnresolvableDependency(_) => StatusCode::BAD_GATEWAY,
        Error::Config(_)
        | Error::Database(_)
        | Error::Json(_)
        | Error::Io(_)
        | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Core(err) if err.is_internal() => {
                error!("Request failed: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("internal error"),
                )
            }
            ApiError::Core(Error::Validation { message, fields }) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new(message).with_fields(fields),
            ),
            ApiError::Core(err) => (status_for(&err), ErrorResponse::new(err.to_string())),
            ApiError::Body(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new(format!("Malformed request body: {}", msg)),
            ),
            ApiError::Params(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new(format!("Malformed request parameters: {}", msg)),
            ),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
