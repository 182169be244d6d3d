//! ResultSet lifecycle
//!
//! States are OPEN and COMPLETED with a single OPEN -> COMPLETED transition.
//! Completion is one conditional UPDATE guarded by "currently open"; its
//! affected-row count decides between success and `AlreadyCompleted`, so two
//! concurrent completions can never both succeed.

use crate::db::result_sets;
use crate::pagination::{Page, PageRequest};
use phd_common::events::{EventBus, ResultEvent};
use phd_common::models::{
    Completion, NewResultSet, PlateResultFilter, ResultSet, ResultSetFilter,
};
use phd_common::{Clock, CompletedAction, Error, RecordKind, Result};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct LifecycleManager {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl LifecycleManager {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>, events: EventBus) -> Self {
        Self { pool, clock, events }
    }

    /// Create an OPEN ResultSet with executionStart = now
    pub async fn create(&self, new: NewResultSet) -> Result<ResultSet> {
        let started = self.clock.now();
        let id = result_sets::insert(&self.pool, &new, started).await?;

        info!(
            "Created ResultSet {} (protocol {}, plate {}, measurement {})",
            id, new.protocol_id, new.plate_id, new.meas_id
        );
        self.events.emit_lossy(ResultEvent::ResultSetCreated {
            result_set_id: id,
            protocol_id: new.protocol_id,
            plate_id: new.plate_id,
            meas_id: new.meas_id,
            timestamp: started,
        });

        Ok(ResultSet {
            id,
            protocol_id: new.protocol_id,
            plate_id: new.plate_id,
            meas_id: new.meas_id,
            execution_start: started,
            execution_end: None,
            outcome: None,
            errors: Vec::new(),
            errors_text: None,
        })
    }

    /// Transition OPEN -> COMPLETED with executionEnd = now
    pub async fn complete(&self, id: i64, completion: Completion) -> Result<ResultSet> {
        let ended = self.clock.now();
        let affected = result_sets::complete_if_open(&self.pool, id, &completion, ended).await?;

        if affected == 0 {
            // The write decided; this read only names the reason
            return Err(if result_sets::exists(&self.pool, id).await? {
                Error::AlreadyCompleted {
                    result_set_id: id,
                    action: CompletedAction::Complete,
                }
            } else {
                Error::NotFound(RecordKind::ResultSet, id)
            });
        }

        let completed = self.get_by_id(id).await?;
        info!("Completed ResultSet {} with outcome {}", id, completion.outcome);
        self.events.emit_lossy(ResultEvent::ResultSetCompleted {
            result_set_id: id,
            plate_id: completed.plate_id,
            outcome: completion.outcome,
            timestamp: ended,
        });

        Ok(completed)
    }

    /// Delete a ResultSet and, in the same transaction, its children
    pub async fn delete(&self, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let affected = result_sets::delete_cascade(&mut *tx, id).await?;
        if affected == 0 {
            return Err(Error::NotFound(RecordKind::ResultSet, id));
        }
        tx.commit().await?;

        info!("Deleted ResultSet {}", id);
        self.events.emit_lossy(ResultEvent::ResultSetDeleted {
            result_set_id: id,
            timestamp: self.clock.now(),
        });
        Ok(())
    }

    pub async fn get_by_id(&self, id: i64) -> Result<ResultSet> {
        result_sets::get(&self.pool, id)
            .await?
            .ok_or(Error::NotFound(RecordKind::ResultSet, id))
    }

    pub async fn exists(&self, id: i64) -> Result<bool> {
        result_sets::exists(&self.pool, id).await
    }

    pub async fn list_paged(
        &self,
        filter: &ResultSetFilter,
        request: PageRequest,
    ) -> Result<Page<ResultSet>> {
        let total_elements = result_sets::count(&self.pool, filter).await?;
        let items =
            result_sets::list(&self.pool, filter, request.size, request.offset()).await?;

        Ok(Page {
            items,
            request,
            total_elements,
        })
    }

    /// Candidate ResultSets of a plate for aggregation
    ///
    /// With `latest`, only the highest id per protocol survives.
    pub async fn find_for_plate(
        &self,
        plate_id: i64,
        filter: &PlateResultFilter,
    ) -> Result<Vec<ResultSet>> {
        let sets =
            result_sets::list_for_plate(&self.pool, plate_id, filter.protocol_id, filter.meas_id)
                .await?;
        debug!("Plate {} has {} matching ResultSets", plate_id, sets.len());

        Ok(if filter.latest {
            select_latest_per_protocol(sets)
        } else {
            sets
        })
    }
}

/// Keep, per protocolId, the ResultSet(s) carrying the maximum id
///
/// Input order is preserved among survivors. Ties keep every tying row.
pub fn select_latest_per_protocol(sets: Vec<ResultSet>) -> Vec<ResultSet> {
    let mut max_by_protocol: HashMap<i64, i64> = HashMap::new();
    for rs in &sets {
        let max = max_by_protocol.entry(rs.protocol_id).or_insert(rs.id);
        if rs.id > *max {
            *max = rs.id;
        }
    }

    sets.into_iter()
        .filter(|rs| max_by_protocol.get(&rs.protocol_id) == Some(&rs.id))
        .collect()
}
