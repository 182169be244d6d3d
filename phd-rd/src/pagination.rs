//! Pagination utilities for phd-rd
//!
//! Pages are 0-indexed. Listings report totals through
//! [`phd_common::api::PageStatus`].

use phd_common::api::{PageStatus, PagedResponse};
use phd_common::{Error, Result};
use serde::Deserialize;

/// Page size when the client doesn't ask for one
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Largest page a client may request
pub const MAX_PAGE_SIZE: i64 = 1000;

/// Highest page index whose offset fits in SQLite's 64-bit OFFSET
pub const MAX_PAGE: i64 = i64::MAX / MAX_PAGE_SIZE;

/// `?page=&size=` query parameters
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

/// Validated page selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub size: i64,
}

impl PageRequest {
    pub fn new(page: i64, size: i64) -> Result<Self> {
        if page < 0 {
            return Err(Error::invalid_field("page", "must not be negative"));
        }
        if page > MAX_PAGE {
            return Err(Error::invalid_field("page", "is too large"));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&size) {
            return Err(Error::invalid_field(
                "size",
                format!("must be between 1 and {}", MAX_PAGE_SIZE),
            ));
        }
        Ok(Self { page, size })
    }

    /// Offset for SQL LIMIT/OFFSET
    pub fn offset(&self) -> i64 {
        self.page.saturating_mul(self.size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl TryFrom<PageParams> for PageRequest {
    type Error = Error;

    fn try_from(params: PageParams) -> Result<Self> {
        PageRequest::new(
            params.page.unwrap_or(0),
            params.size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
    }
}

/// One page of records plus the total matching count
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub request: PageRequest,
    pub total_elements: i64,
}

impl<T> Page<T> {
    /// Map items into their wire form and wrap them in the paged envelope
    pub fn into_response<D>(self) -> PagedResponse<D>
    where
        D: From<T>,
    {
        PagedResponse {
            status: PageStatus::new(self.request.page, self.request.size, self.total_elements),
            data: self.items.into_iter().map(D::from).collect(),
        }
    }
}
