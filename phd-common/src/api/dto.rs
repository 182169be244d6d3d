//! Request/response DTOs and their mapping to record types
//!
//! Requests carry optional fields so that missing values are reported as
//! malformed fields instead of deserialization failures.

use crate::models::{
    AggregatedResult, Completion, NewFeatureStat, NewResultData, NewResultSet, PlateResults,
    ResultData, ResultError, ResultFeatureStat, ResultSet, StatusCode,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Longest accepted statusMessage
pub const MAX_STATUS_MESSAGE_LEN: usize = 255;

// ========================================
// Responses
// ========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSetDto {
    pub id: i64,
    pub protocol_id: i64,
    pub plate_id: i64,
    pub meas_id: i64,
    pub execution_start_time_stamp: DateTime<Utc>,
    pub execution_end_time_stamp: Option<DateTime<Utc>>,
    pub outcome: Option<StatusCode>,
    pub errors: Vec<ResultError>,
    pub errors_text: Option<String>,
}

impl From<ResultSet> for ResultSetDto {
    fn from(rs: ResultSet) -> Self {
        Self {
            id: rs.id,
            protocol_id: rs.protocol_id,
            plate_id: rs.plate_id,
            meas_id: rs.meas_id,
            execution_start_time_stamp: rs.execution_start,
            execution_end_time_stamp: rs.execution_end,
            outcome: rs.outcome,
            errors: rs.errors,
            errors_text: rs.errors_text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultDataDto {
    pub id: i64,
    pub result_set_id: i64,
    pub feature_id: i64,
    pub values: Vec<f32>,
    pub status_code: StatusCode,
    pub status_message: Option<String>,
    pub exit_code: Option<i32>,
    pub created_timestamp: DateTime<Utc>,
}

impl From<ResultData> for ResultDataDto {
    fn from(data: ResultData) -> Self {
        Self {
            id: data.id,
            result_set_id: data.result_set_id,
            feature_id: data.feature_id,
            values: data.values,
            status_code: data.status_code,
            status_message: data.status_message,
            exit_code: data.exit_code,
            created_timestamp: data.created_timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultFeatureStatDto {
    pub id: i64,
    pub result_set_id: i64,
    pub feature_id: i64,
    pub feature_stat_id: i64,
    pub value: Option<f32>,
    pub statistic_name: String,
    pub welltype: Option<String>,
    pub status_code: StatusCode,
    pub status_message: Option<String>,
    pub exit_code: Option<i32>,
    pub created_timestamp: DateTime<Utc>,
}

impl From<ResultFeatureStat> for ResultFeatureStatDto {
    fn from(stat: ResultFeatureStat) -> Self {
        Self {
            id: stat.id,
            result_set_id: stat.result_set_id,
            feature_id: stat.feature_id,
            feature_stat_id: stat.feature_stat_id,
            value: stat.value,
            statistic_name: stat.statistic_name,
            welltype: stat.welltype,
            status_code: stat.status_code,
            status_message: stat.status_message,
            exit_code: stat.exit_code,
            created_timestamp: stat.created_timestamp,
        }
    }
}

/// One ResultData row with its feature stats
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedResultDto {
    pub data: ResultDataDto,
    pub feature_stats: Vec<ResultFeatureStatDto>,
}

impl From<AggregatedResult> for AggregatedResultDto {
    fn from(entry: AggregatedResult) -> Self {
        Self {
            data: entry.data.into(),
            feature_stats: entry.feature_stats.into_iter().map(Into::into).collect(),
        }
    }
}

/// protocolId -> measId -> entries (integer keys serialize as JSON strings)
pub type PlateResultsDto = BTreeMap<i64, BTreeMap<i64, Vec<AggregatedResultDto>>>;

pub fn plate_results_to_dto(results: PlateResults) -> PlateResultsDto {
    results
        .into_iter()
        .map(|(protocol_id, by_meas)| {
            let by_meas = by_meas
                .into_iter()
                .map(|(meas_id, entries)| {
                    (meas_id, entries.into_iter().map(Into::into).collect())
                })
                .collect();
            (protocol_id, by_meas)
        })
        .collect()
}

// ========================================
// Requests
// ========================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSetCreateRequest {
    pub protocol_id: Option<i64>,
    pub plate_id: Option<i64>,
    pub meas_id: Option<i64>,
}

impl ResultSetCreateRequest {
    pub fn into_new_result_set(self) -> Result<NewResultSet> {
        let mut errors = FieldErrors::default();
        let protocol_id = errors.required_id("protocolId", self.protocol_id);
        let plate_id = errors.required_id("plateId", self.plate_id);
        let meas_id = errors.required_id("measId", self.meas_id);
        errors.finish("ResultSet")?;

        Ok(NewResultSet {
            protocol_id,
            plate_id,
            meas_id,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSetCompleteRequest {
    pub outcome: Option<StatusCode>,
    #[serde(default)]
    pub errors: Vec<ResultError>,
    pub errors_text: Option<String>,
}

impl ResultSetCompleteRequest {
    pub fn into_completion(self) -> Result<Completion> {
        let mut errors = FieldErrors::default();
        let outcome = match self.outcome {
            None => {
                errors.add("outcome", "is required");
                StatusCode::Failure
            }
            Some(StatusCode::Scheduled) => {
                errors.add("outcome", "must be SUCCESS or FAILURE");
                StatusCode::Failure
            }
            Some(outcome) => outcome,
        };
        errors.finish("ResultSet completion")?;

        Ok(Completion {
            outcome,
            errors: self.errors,
            errors_text: self.errors_text,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultDataCreateRequest {
    pub feature_id: Option<i64>,
    pub values: Option<Vec<f32>>,
    pub status_code: Option<StatusCode>,
    pub status_message: Option<String>,
    pub exit_code: Option<i64>,
}

impl ResultDataCreateRequest {
    pub fn into_new_result_data(self) -> Result<NewResultData> {
        let mut errors = FieldErrors::default();
        let feature_id = errors.required_id("featureId", self.feature_id);
        if self.values.is_none() {
            errors.add("values", "is required");
        }
        let status_code = errors.required("statusCode", self.status_code);
        errors.status_message("statusMessage", self.status_message.as_deref());
        let exit_code = errors.exit_code("exitCode", self.exit_code);
        errors.finish("ResultData")?;

        Ok(NewResultData {
            feature_id,
            values: self.values.unwrap_or_default(),
            status_code: status_code.unwrap_or(StatusCode::Failure),
            status_message: self.status_message,
            exit_code,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureStatCreateRequest {
    pub feature_id: Option<i64>,
    pub feature_stat_id: Option<i64>,
    pub value: Option<f32>,
    pub statistic_name: Option<String>,
    pub welltype: Option<String>,
    pub status_code: Option<StatusCode>,
    pub status_message: Option<String>,
    pub exit_code: Option<i64>,
}

impl FeatureStatCreateRequest {
    fn validate_into(self, errors: &mut FieldErrors) -> Option<NewFeatureStat> {
        let feature_id = errors.required_id("featureId", self.feature_id);
        let feature_stat_id = errors.required_id("featureStatId", self.feature_stat_id);
        let statistic_name = match self.statistic_name {
            Some(name) if !name.trim().is_empty() => name,
            Some(_) => {
                errors.add("statisticName", "must not be blank");
                String::new()
            }
            None => {
                errors.add("statisticName", "is required");
                String::new()
            }
        };
        if matches!(self.welltype.as_deref(), Some(w) if w.trim().is_empty()) {
            errors.add("welltype", "must not be blank; omit it for whole-plate scope");
        }
        let status_code = errors.required("statusCode", self.status_code);
        errors.status_message("statusMessage", self.status_message.as_deref());
        let exit_code = errors.exit_code("exitCode", self.exit_code);

        Some(NewFeatureStat {
            feature_id,
            feature_stat_id,
            value: self.value,
            statistic_name,
            welltype: self.welltype,
            status_code: status_code?,
            status_message: self.status_message,
            exit_code,
        })
    }

    pub fn into_new_feature_stat(self) -> Result<NewFeatureStat> {
        feature_stats_from_requests(vec![self]).map(|mut stats| stats.remove(0))
    }
}

/// Validate a whole batch; any invalid item rejects the batch
///
/// Field names of batch items are prefixed with their index, e.g.
/// `[2].exitCode`.
pub fn feature_stats_from_requests(
    requests: Vec<FeatureStatCreateRequest>,
) -> Result<Vec<NewFeatureStat>> {
    if requests.is_empty() {
        return Err(Error::invalid_field("resultFeatureStats", "must not be empty"));
    }

    let single = requests.len() == 1;
    let mut all_errors = FieldErrors::default();
    let mut stats = Vec::with_capacity(requests.len());

    for (index, request) in requests.into_iter().enumerate() {
        let mut item_errors = FieldErrors::default();
        let stat = request.validate_into(&mut item_errors);
        if item_errors.is_empty() {
            stats.extend(stat);
        } else if single {
            all_errors = item_errors;
        } else {
            all_errors.merge_prefixed(&format!("[{}].", index), item_errors);
        }
    }

    all_errors.finish("ResultFeatureStat")?;
    Ok(stats)
}

// ========================================
// Field validation
// ========================================

#[derive(Debug, Default)]
struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    fn add(&mut self, field: &str, reason: &str) {
        self.0.insert(field.to_string(), reason.to_string());
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn required<T>(&mut self, field: &str, value: Option<T>) -> Option<T> {
        if value.is_none() {
            self.add(field, "is required");
        }
        value
    }

    fn required_id(&mut self, field: &str, value: Option<i64>) -> i64 {
        match value {
            Some(id) if id > 0 => id,
            Some(_) => {
                self.add(field, "must be a positive id");
                0
            }
            None => {
                self.add(field, "is required");
                0
            }
        }
    }

    fn status_message(&mut self, field: &str, value: Option<&str>) {
        if let Some(message) = value {
            if message.chars().count() > MAX_STATUS_MESSAGE_LEN {
                self.add(field, "must be at most 255 characters");
            }
        }
    }

    fn exit_code(&mut self, field: &str, value: Option<i64>) -> Option<i32> {
        match value {
            Some(code) if (0..=255).contains(&code) => Some(code as i32),
            Some(_) => {
                self.add(field, "must be between 0 and 255");
                None
            }
            None => None,
        }
    }

    fn merge_prefixed(&mut self, prefix: &str, other: FieldErrors) {
        for (field, reason) in other.0 {
            self.0.insert(format!("{}{}", prefix, field), reason);
        }
    }

    fn finish(self, subject: &str) -> Result<()> {
        if self.0.is_empty() {
            return Ok(());
        }
        let names: Vec<&str> = self.0.keys().map(String::as_str).collect();
        Err(Error::Validation {
            message: format!("invalid {}: {}", subject, names.join(", ")),
            fields: self.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat_request(feature_stat_id: i64, welltype: Option<&str>) -> FeatureStatCreateRequest {
        FeatureStatCreateRequest {
            feature_id: Some(42),
            feature_stat_id: Some(feature_stat_id),
            value: Some(42.0),
            statistic_name: Some("zprime".to_string()),
            welltype: welltype.map(str::to_string),
            status_code: Some(StatusCode::Success),
            status_message: None,
            exit_code: Some(0),
        }
    }

    fn fields_of(err: Error) -> BTreeMap<String, String> {
        match err {
            Error::Validation { fields, .. } => fields,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_result_set_request_requires_all_ids() {
        let err = ResultSetCreateRequest {
            protocol_id: Some(1),
            plate_id: None,
            meas_id: Some(-3),
        }
        .into_new_result_set()
        .unwrap_err();

        let fields = fields_of(err);
        assert_eq!(fields["plateId"], "is required");
        assert_eq!(fields["measId"], "must be a positive id");
        assert!(!fields.contains_key("protocolId"));
    }

    #[test]
    fn test_completion_rejects_scheduled_outcome() {
        let err = ResultSetCompleteRequest {
            outcome: Some(StatusCode::Scheduled),
            ..Default::default()
        }
        .into_completion()
        .unwrap_err();
        assert!(fields_of(err).contains_key("outcome"));
    }

    #[test]
    fn test_result_data_limits() {
        let err = ResultDataCreateRequest {
            feature_id: Some(7),
            values: Some(vec![1.0, 2.0]),
            status_code: Some(StatusCode::Success),
            status_message: Some("x".repeat(256)),
            exit_code: Some(256),
        }
        .into_new_result_data()
        .unwrap_err();

        let fields = fields_of(err);
        assert!(fields.contains_key("statusMessage"));
        assert!(fields.contains_key("exitCode"));
    }

    #[test]
    fn test_result_data_accepts_boundary_values() {
        let data = ResultDataCreateRequest {
            feature_id: Some(7),
            values: Some(vec![]),
            status_code: Some(StatusCode::Success),
            status_message: Some("y".repeat(255)),
            exit_code: Some(255),
        }
        .into_new_result_data()
        .unwrap();
        assert_eq!(data.exit_code, Some(255));
        assert!(data.values.is_empty());
    }

    #[test]
    fn test_batch_reports_indexed_fields_and_rejects_everything() {
        let mut bad = stat_request(46, None);
        bad.statistic_name = None;
        let err = feature_stats_from_requests(vec![stat_request(45, None), bad]).unwrap_err();

        let fields = fields_of(err);
        assert_eq!(fields["[1].statisticName"], "is required");
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn test_single_stat_fields_are_unprefixed() {
        let mut bad = stat_request(45, Some(" "));
        bad.exit_code = Some(-1);
        let fields = fields_of(bad.into_new_feature_stat().unwrap_err());
        assert!(fields.contains_key("welltype"));
        assert!(fields.contains_key("exitCode"));
    }

    #[test]
    fn test_empty_batch_rejected() {
        assert!(feature_stats_from_requests(Vec::new()).is_err());
    }

    #[test]
    fn test_plate_results_serialize_with_string_keys() {
        let mut by_meas = BTreeMap::new();
        by_meas.insert(3, Vec::new());
        let mut results: PlateResults = BTreeMap::new();
        results.insert(1, by_meas);

        let json = serde_json::to_value(plate_results_to_dto(results)).unwrap();
        assert!(json["1"]["3"].as_array().unwrap().is_empty());
    }
}
