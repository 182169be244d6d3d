//! Core result services
//!
//! - `lifecycle`: ResultSet state machine (OPEN -> COMPLETED) and deletion
//! - `attachment`: shared create/delete rules for ResultData and
//!   ResultFeatureStat
//! - `aggregator`: plate-level protocol -> measurement -> data(+stats) view
//! - `metadata`: plate and protocol lookups for the enriched plate view

pub mod aggregator;
pub mod attachment;
pub mod lifecycle;
pub mod metadata;

pub use aggregator::{PlateResultAggregator, MAX_RESULT_SETS};
pub use attachment::AttachmentGuard;
pub use lifecycle::LifecycleManager;
pub use metadata::MetadataClients;

use phd_common::events::EventBus;
use phd_common::Clock;
use sqlx::SqlitePool;
use std::sync::Arc;

/// All core services over one pool, clock and event bus
#[derive(Clone)]
pub struct ResultServices {
    pub lifecycle: LifecycleManager,
    pub attachments: AttachmentGuard,
    pub aggregator: PlateResultAggregator,
}

impl ResultServices {
    pub fn new(
        pool: SqlitePool,
        clock: Arc<dyn Clock>,
        events: EventBus,
        metadata: MetadataClients,
    ) -> Self {
        let lifecycle = LifecycleManager::new(pool.clone(), clock.clone(), events.clone());
        let attachments = AttachmentGuard::new(pool.clone(), clock, events);
        let aggregator = PlateResultAggregator::new(pool, lifecycle.clone(), metadata);
        Self {
            lifecycle,
            attachments,
            aggregator,
        }
    }
}
