//! Common error types for the result services
//!
//! Every core operation returns one of these kinds. The HTTP layer maps each
//! kind to a transport status once, in a single place.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Common result type for result service operations
pub type Result<T> = std::result::Result<T, Error>;

/// The three persisted record kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RecordKind {
    ResultSet,
    ResultData,
    ResultFeatureStat,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordKind::ResultSet => "ResultSet",
            RecordKind::ResultData => "ResultData",
            RecordKind::ResultFeatureStat => "ResultFeatureStat",
        };
        f.write_str(name)
    }
}

/// What was attempted against a completed ResultSet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletedAction {
    /// A second completion of the ResultSet itself
    Complete,
    /// Creating a child record
    Add(RecordKind),
    /// Deleting a child record
    Delete(RecordKind),
}

impl fmt::Display for CompletedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletedAction::Complete => f.write_str("it cannot be completed again"),
            CompletedAction::Add(kind) => write!(f, "cannot add {}", kind),
            CompletedAction::Delete(kind) => write!(f, "cannot delete {}", kind),
        }
    }
}

/// Error kinds surfaced by the result services
///
/// Messages are safe to show to clients, except for the storage and I/O
/// variants which the boundary replaces with a generic internal message.
#[derive(Error, Debug)]
pub enum Error {
    /// Field-level input validation failure
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        fields: BTreeMap<String, String>,
    },

    /// Requested record does not exist
    #[error("{0} with id {1} not found")]
    NotFound(RecordKind, i64),

    /// Owning ResultSet of a child operation does not exist
    #[error("ResultSet with id {0} not found")]
    ParentNotFound(i64),

    /// Child record addressed by its own id does not exist
    #[error("{0} with id {1} not found")]
    ChildNotFound(RecordKind, i64),

    /// ResultSet is COMPLETED and the attempted mutation is not allowed
    #[error("ResultSet {result_set_id} is already completed: {action}")]
    AlreadyCompleted {
        result_set_id: i64,
        action: CompletedAction,
    },

    /// Child exists but belongs to another ResultSet
    #[error("{kind} {child_id} does not belong to ResultSet {result_set_id}")]
    OwnershipMismatch {
        kind: RecordKind,
        child_id: i64,
        result_set_id: i64,
    },

    /// (resultSetId, featureStatId, welltype) already used
    #[error(
        "ResultFeatureStat with featureStatId {feature_stat_id} and welltype {} already exists for ResultSet {result_set_id}",
        .welltype.as_deref().unwrap_or("null")
    )]
    DuplicateFeatureStat {
        result_set_id: i64,
        feature_stat_id: i64,
        welltype: Option<String>,
    },

    /// Plate aggregation candidate set exceeds the hard bound
    #[error("Plate aggregation matched {count} ResultSets, the limit is {limit}")]
    TooManyResultSets { count: usize, limit: usize },

    /// Record type is create/delete only
    #[error("{0} cannot be updated")]
    UpdateNotSupported(RecordKind),

    /// External metadata lookup failed or is not configured
    #[error("Unresolvable dependency: {0}")]
    UnresolvableDependency(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored JSON column could not be (de)serialized
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Single-field validation failure
    pub fn invalid_field(field: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let mut fields = BTreeMap::new();
        fields.insert(field.to_string(), reason.clone());
        Error::Validation {
            message: format!("{}: {}", field, reason),
            fields,
        }
    }

    /// True for failures whose detail must not reach clients
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::Database(_)
                | Error::Json(_)
                | Error::Io(_)
                | Error::Internal(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_message_names_null_welltype() {
        let err = Error::DuplicateFeatureStat {
            result_set_id: 1,
            feature_stat_id: 45,
            welltype: None,
        };
        let msg = err.to_string();
        assert!(msg.contains("featureStatId 45"));
        assert!(msg.contains("welltype null"));
    }

    #[test]
    fn test_already_completed_distinguishes_add_and_delete() {
        let add = Error::AlreadyCompleted {
            result_set_id: 3,
            action: CompletedAction::Add(RecordKind::ResultData),
        };
        let delete = Error::AlreadyCompleted {
            result_set_id: 3,
            action: CompletedAction::Delete(RecordKind::ResultData),
        };
        assert!(add.to_string().contains("cannot add ResultData"));
        assert!(delete.to_string().contains("cannot delete ResultData"));
    }

    #[test]
    fn test_invalid_field_collects_reason() {
        match Error::invalid_field("exitCode", "must be between 0 and 255") {
            Error::Validation { fields, .. } => {
                assert_eq!(fields["exitCode"], "must be between 0 and 255");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_internal_classification() {
        assert!(Error::Internal("x".into()).is_internal());
        assert!(!Error::ParentNotFound(1).is_internal());
        assert!(!Error::TooManyResultSets { count: 101, limit: 100 }.is_internal());
    }
}
