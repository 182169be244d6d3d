//! Result record types
//!
//! Plain values per entity. Conversion to and from the wire lives in
//! [`crate::api::dto`]; lifecycle rules live in the services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Status code shared by ResultSet outcomes and child records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Scheduled,
    Success,
    Failure,
}

impl StatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Scheduled => "SCHEDULED",
            StatusCode::Success => "SUCCESS",
            StatusCode::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SCHEDULED" => Ok(StatusCode::Scheduled),
            "SUCCESS" => Ok(StatusCode::Success),
            "FAILURE" => Ok(StatusCode::Failure),
            other => Err(format!("unknown status code '{}'", other)),
        }
    }
}

/// Lifecycle state of a ResultSet, derived from outcome/executionEnd
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultSetState {
    Open,
    Completed,
}

/// Structured error recorded on a ResultSet at completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultError {
    pub timestamp: DateTime<Utc>,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_stat_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub well_number: Option<i64>,
}

/// One execution batch for a (protocol, plate, measurement) triple
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    pub id: i64,
    pub protocol_id: i64,
    pub plate_id: i64,
    pub meas_id: i64,
    pub execution_start: DateTime<Utc>,
    pub execution_end: Option<DateTime<Utc>>,
    pub outcome: Option<StatusCode>,
    pub errors: Vec<ResultError>,
    pub errors_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewResultSet {
    pub protocol_id: i64,
    pub plate_id: i64,
    pub meas_id: i64,
}

/// Terminal values written by the OPEN -> COMPLETED transition
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub outcome: StatusCode,
    pub errors: Vec<ResultError>,
    pub errors_text: Option<String>,
}

/// Raw per-feature measurement array produced within a ResultSet
#[derive(Debug, Clone, PartialEq)]
pub struct ResultData {
    pub id: i64,
    pub result_set_id: i64,
    pub feature_id: i64,
    pub values: Vec<f32>,
    pub status_code: StatusCode,
    pub status_message: Option<String>,
    pub exit_code: Option<i32>,
    pub created_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewResultData {
    pub feature_id: i64,
    pub values: Vec<f32>,
    pub status_code: StatusCode,
    pub status_message: Option<String>,
    pub exit_code: Option<i32>,
}

/// Derived statistic for a feature; `welltype == None` is whole-plate scope
#[derive(Debug, Clone, PartialEq)]
pub struct ResultFeatureStat {
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

#[derive(Debug, Clone, PartialEq)]
pub struct NewFeatureStat {
    pub feature_id: i64,
    pub feature_stat_id: i64,
    pub value: Option<f32>,
    pub statistic_name: String,
    pub welltype: Option<String>,
    pub status_code: StatusCode,
    pub status_message: Option<String>,
    pub exit_code: Option<i32>,
}

/// ResultSet listing filter; empty sets do not restrict
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSetFilter {
    pub ids: Vec<i64>,
    pub plate_ids: Vec<i64>,
    pub protocol_ids: Vec<i64>,
    pub meas_ids: Vec<i64>,
    pub outcomes: Vec<StatusCode>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultDataFilter {
    pub feature_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureStatFilter {
    pub feature_ids: Vec<i64>,
    pub feature_stat_ids: Vec<i64>,
}

/// Candidate selection for plate aggregation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlateResultFilter {
    /// Keep only the highest ResultSet id per protocol
    pub latest: bool,
    pub protocol_id: Option<i64>,
    pub meas_id: Option<i64>,
}

/// One ResultData row with the feature stats of its (resultSetId, featureId)
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedResult {
    pub data: ResultData,
    pub feature_stats: Vec<ResultFeatureStat>,
}

/// protocolId -> measId -> aggregated entries
pub type PlateResults = BTreeMap<i64, BTreeMap<i64, Vec<AggregatedResult>>>;

/// Derive the lifecycle state of a ResultSet
///
/// A record is OPEN only while both outcome and executionEnd are unset.
pub fn lifecycle_state(result_set: &ResultSet) -> ResultSetState {
    if result_set.outcome.is_none() && result_set.execution_end.is_none() {
        ResultSetState::Open
    } else {
        ResultSetState::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_set() -> ResultSet {
        ResultSet {
            id: 1,
            protocol_id: 1,
            plate_id: 2,
            meas_id: 3,
            execution_start: Utc::now(),
            execution_end: None,
            outcome: None,
            errors: Vec::new(),
            errors_text: None,
        }
    }

    #[test]
    fn test_open_when_outcome_and_end_unset() {
        assert_eq!(lifecycle_state(&open_set()), ResultSetState::Open);
    }

    #[test]
    fn test_completed_when_either_terminal_field_set() {
        let mut with_outcome = open_set();
        with_outcome.outcome = Some(StatusCode::Success);
        assert_eq!(lifecycle_state(&with_outcome), ResultSetState::Completed);

        let mut with_end = open_set();
        with_end.execution_end = Some(Utc::now());
        assert_eq!(lifecycle_state(&with_end), ResultSetState::Completed);
    }

    #[test]
    fn test_status_code_parsing() {
        assert_eq!("success".parse::<StatusCode>(), Ok(StatusCode::Success));
        assert_eq!("FAILURE".parse::<StatusCode>(), Ok(StatusCode::Failure));
        assert!("DONE".parse::<StatusCode>().is_err());
        assert_eq!(StatusCode::Scheduled.to_string(), "SCHEDULED");
    }
}
