//! Response envelopes

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Paging summary attached to every listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageStatus {
    pub total_pages: i64,
    pub total_elements: i64,
    pub first: bool,
    pub last: bool,
}

impl PageStatus {
    /// Summary for 0-based `page` of `size` elements out of `total_elements`
    pub fn new(page: i64, size: i64, total_elements: i64) -> Self {
        let total_pages = if size > 0 {
            (total_elements + size - 1) / size
        } else {
            0
        };
        Self {
            total_pages,
            total_elements,
            first: page == 0,
            last: page + 1 >= total_pages,
        }
    }
}

/// `{data: [...], status: {...}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResponse<T> {
    pub data: Vec<T>,
    pub status: PageStatus,
}

/// `{status: "error", error: "...", malformed_fields?: {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub malformed_fields: Option<BTreeMap<String, String>>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: error.into(),
            malformed_fields: None,
        }
    }

    pub fn with_fields(mut self, fields: BTreeMap<String, String>) -> Self {
        if !fields.is_empty() {
            self.malformed_fields = Some(fields);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_status_middle_page() {
        let status = PageStatus::new(1, 20, 50);
        assert_eq!(status.total_pages, 3);
        assert!(!status.first);
        assert!(!status.last);
    }

    #[test]
    fn test_page_status_last_page() {
        let status = PageStatus::new(2, 20, 50);
        assert!(status.last);
    }

    #[test]
    fn test_page_status_empty() {
        let status = PageStatus::new(0, 20, 0);
        assert_eq!(status.total_pages, 0);
        assert!(status.first);
        assert!(status.last);
    }

    #[test]
    fn test_error_response_omits_empty_fields() {
        let body = serde_json::to_value(ErrorResponse::new("boom").with_fields(BTreeMap::new()))
            .unwrap();
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"], "boom");
        assert!(body.get("malformed_fields").is_none());
    }
}
