//! # PHD Common Library
//!
//! Shared code for the plate result services including:
//! - Result record types (ResultSet, ResultData, ResultFeatureStat)
//! - Error taxonomy shared by the core and the HTTP boundary
//! - Wire DTOs, response envelopes and their mapping functions
//! - Event types (ResultEvent enum) and EventBus
//! - Configuration loading
//! - Time source

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod time;

pub use error::{CompletedAction, Error, RecordKind, Result};
pub use time::{Clock, FixedClock, SystemClock};
