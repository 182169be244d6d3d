//! Wire-level types shared by the result services
//!
//! - `types`: response envelopes (paged success, error)
//! - `dto`: request/response DTOs and the explicit mapping functions between
//!   them and the record types, including boundary field validation
//!
//! Nothing here depends on an HTTP framework; the service wraps these in
//! axum extractors and responses.

pub mod dto;
pub mod types;

pub use dto::{
    feature_stats_from_requests, plate_results_to_dto, AggregatedResultDto,
    FeatureStatCreateRequest, PlateResultsDto, ResultDataCreateRequest, ResultDataDto,
    ResultFeatureStatDto, ResultSetCompleteRequest, ResultSetCreateRequest, ResultSetDto,
};
pub use types::{ErrorResponse, PageStatus, PagedResponse};
