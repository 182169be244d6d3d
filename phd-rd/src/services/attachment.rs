//! Attachment rules for ResultSet children
//!
//! ResultData and ResultFeatureStat share one rule set:
//! - the owning ResultSet must exist (`ParentNotFound`) and be OPEN
//!   (`AlreadyCompleted`)
//! - deletes address a child that exists (`ChildNotFound`) and is owned by the
//!   path's ResultSet (`OwnershipMismatch`)
//!
//! Every mutation is a single guarded statement (insert/delete only while the
//! parent is open). When the statement affects nothing, [`AttachmentGuard::rejection`]
//! reads the current rows to name the reason in the order above.

use crate::db::{children, feature_stats, result_data, result_sets};
use crate::pagination::{Page, PageRequest};
use phd_common::events::{EventBus, ResultEvent};
use phd_common::models::{
    lifecycle_state, FeatureStatFilter, NewFeatureStat, NewResultData, ResultData,
    ResultDataFilter, ResultFeatureStat, ResultSetState,
};
use phd_common::{Clock, CompletedAction, Error, RecordKind, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct AttachmentGuard {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl AttachmentGuard {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>, events: EventBus) -> Self {
        Self { pool, clock, events }
    }

    // ========================================
    // ResultData
    // ========================================

    pub async fn create_result_data(
        &self,
        result_set_id: i64,
        new: NewResultData,
    ) -> Result<ResultData> {
        let created = self.clock.now();
        let id = match result_data::insert_if_parent_open(&self.pool, result_set_id, &new, created)
            .await?
        {
            Some(id) => id,
            None => {
                let action = CompletedAction::Add(RecordKind::ResultData);
                return Err(self.rejection(result_set_id, action, None).await?);
            }
        };

        info!(
            "Created ResultData {} (feature {}) on ResultSet {}",
            id, new.feature_id, result_set_id
        );
        self.events.emit_lossy(ResultEvent::ResultDataCreated {
            result_set_id,
            result_data_id: id,
            feature_id: new.feature_id,
            timestamp: created,
        });

        Ok(ResultData {
            id,
            result_set_id,
            feature_id: new.feature_id,
            values: new.values,
            status_code: new.status_code,
            status_message: new.status_message,
            exit_code: new.exit_code,
            created_timestamp: created,
        })
    }

    pub async fn delete_result_data(&self, result_set_id: i64, result_data_id: i64) -> Result<()> {
        self.delete_child(RecordKind::ResultData, result_set_id, result_data_id)
            .await?;

        self.events.emit_lossy(ResultEvent::ResultDataDeleted {
            result_set_id,
            result_data_id,
            timestamp: self.clock.now(),
        });
        Ok(())
    }

    /// ResultData is create/delete only, whatever the parent's state
    pub fn reject_result_data_update(&self, result_set_id: i64, result_data_id: i64) -> Result<()> {
        warn!(
            "Rejected update of ResultData {} on ResultSet {}",
            result_data_id, result_set_id
        );
        Err(Error::UpdateNotSupported(RecordKind::ResultData))
    }

    pub async fn get_result_data(&self, result_set_id: i64, result_data_id: i64) -> Result<ResultData> {
        self.ensure_parent_exists(result_set_id).await?;
        let data = result_data::get(&self.pool, result_data_id)
            .await?
            .ok_or(Error::ChildNotFound(RecordKind::ResultData, result_data_id))?;
        ensure_owned(RecordKind::ResultData, data.result_set_id, result_set_id, result_data_id)?;
        Ok(data)
    }

    pub async fn list_result_data(
        &self,
        result_set_id: i64,
        filter: &ResultDataFilter,
        request: PageRequest,
    ) -> Result<Page<ResultData>> {
        self.ensure_parent_exists(result_set_id).await?;
        let total_elements =
            result_data::count_for_result_set(&self.pool, result_set_id, filter).await?;
        let items = result_data::list_for_result_set(
            &self.pool,
            result_set_id,
            filter,
            request.size,
            request.offset(),
        )
        .await?;

        Ok(Page {
            items,
            request,
            total_elements,
        })
    }

    // ========================================
    // ResultFeatureStat
    // ========================================

    /// Create a batch of feature stats, all or nothing
    ///
    /// All inserts run in one transaction. A completed/missing parent or a
    /// unique-index violation (against stored rows or an earlier item of the
    /// same batch) rolls back every row of the batch.
    pub async fn create_feature_stats(
        &self,
        result_set_id: i64,
        stats: Vec<NewFeatureStat>,
    ) -> Result<Vec<ResultFeatureStat>> {
        if stats.is_empty() {
            return Err(Error::invalid_field("resultFeatureStats", "must not be empty"));
        }

        let created = self.clock.now();
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(stats.len());

        for stat in &stats {
            match feature_stats::insert_if_parent_open(&mut *tx, result_set_id, stat, created)
                .await?
            {
                Some(id) => ids.push(id),
                None => {
                    tx.rollback().await?;
                    let action = CompletedAction::Add(RecordKind::ResultFeatureStat);
                    return Err(self.rejection(result_set_id, action, None).await?);
                }
            }
        }
        tx.commit().await?;

        info!(
            "Created {} ResultFeatureStat(s) on ResultSet {}",
            ids.len(),
            result_set_id
        );
        self.events.emit_lossy(ResultEvent::FeatureStatsCreated {
            result_set_id,
            feature_stat_ids: ids.clone(),
            timestamp: created,
        });

        Ok(ids
            .into_iter()
            .zip(stats)
            .map(|(id, stat)| ResultFeatureStat {
                id,
                result_set_id,
                feature_id: stat.feature_id,
                feature_stat_id: stat.feature_stat_id,
                value: stat.value,
                statistic_name: stat.statistic_name,
                welltype: stat.welltype,
                status_code: stat.status_code,
                status_message: stat.status_message,
                exit_code: stat.exit_code,
                created_timestamp: created,
            })
            .collect())
    }

    pub async fn create_feature_stat(
        &self,
        result_set_id: i64,
        stat: NewFeatureStat,
    ) -> Result<ResultFeatureStat> {
        let mut created = self.create_feature_stats(result_set_id, vec![stat]).await?;
        created
            .pop()
            .ok_or_else(|| Error::Internal("batch of one produced no row".to_string()))
    }

    pub async fn delete_feature_stat(&self, result_set_id: i64, stat_id: i64) -> Result<()> {
        self.delete_child(RecordKind::ResultFeatureStat, result_set_id, stat_id)
            .await?;

        self.events.emit_lossy(ResultEvent::FeatureStatDeleted {
            result_set_id,
            result_feature_stat_id: stat_id,
            timestamp: self.clock.now(),
        });
        Ok(())
    }

    pub async fn get_feature_stat(&self, result_set_id: i64, stat_id: i64) -> Result<ResultFeatureStat> {
        self.ensure_parent_exists(result_set_id).await?;
        let stat = feature_stats::get(&self.pool, stat_id)
            .await?
            .ok_or(Error::ChildNotFound(RecordKind::ResultFeatureStat, stat_id))?;
        ensure_owned(RecordKind::ResultFeatureStat, stat.result_set_id, result_set_id, stat_id)?;
        Ok(stat)
    }

    pub async fn list_feature_stats(
        &self,
        result_set_id: i64,
        filter: &FeatureStatFilter,
        request: PageRequest,
    ) -> Result<Page<ResultFeatureStat>> {
        self.ensure_parent_exists(result_set_id).await?;
        let total_elements =
            feature_stats::count_for_result_set(&self.pool, result_set_id, filter).await?;
        let items = feature_stats::list_for_result_set(
            &self.pool,
            result_set_id,
            filter,
            request.size,
            request.offset(),
        )
        .await?;

        Ok(Page {
            items,
            request,
            total_elements,
        })
    }

    // ========================================
    // Shared rules
    // ========================================

    async fn delete_child(&self, kind: RecordKind, result_set_id: i64, child_id: i64) -> Result<()> {
        let affected =
            children::delete_if_parent_open(&self.pool, kind, result_set_id, child_id).await?;
        if affected == 0 {
            let action = CompletedAction::Delete(kind);
            return Err(self.rejection(result_set_id, action, Some(child_id)).await?);
        }

        info!("Deleted {} {} from ResultSet {}", kind, child_id, result_set_id);
        Ok(())
    }

    async fn ensure_parent_exists(&self, result_set_id: i64) -> Result<()> {
        if result_sets::exists(&self.pool, result_set_id).await? {
            Ok(())
        } else {
            Err(Error::ParentNotFound(result_set_id))
        }
    }

    /// Name the reason a guarded child mutation affected no row
    ///
    /// Checks, in order: parent exists, parent open, child exists (deletes
    /// only), child owned by the parent.
    async fn rejection(
        &self,
        result_set_id: i64,
        action: CompletedAction,
        child_id: Option<i64>,
    ) -> Result<Error> {
        let parent = match result_sets::get(&self.pool, result_set_id).await? {
            Some(parent) => parent,
            None => return Ok(Error::ParentNotFound(result_set_id)),
        };
        if lifecycle_state(&parent) == ResultSetState::Completed {
            return Ok(Error::AlreadyCompleted {
                result_set_id,
                action,
            });
        }

        if let (CompletedAction::Delete(kind), Some(child_id)) = (action, child_id) {
            let owner = match children::owner_of(&self.pool, kind, child_id).await? {
                Some(owner) => owner,
                None => return Ok(Error::ChildNotFound(kind, child_id)),
            };
            if let Err(mismatch) = ensure_owned(kind, owner, result_set_id, child_id) {
                return Ok(mismatch);
            }
        }

        debug!(
            "Guarded mutation on ResultSet {} affected nothing with parent open",
            result_set_id
        );
        Err(Error::Internal(format!(
            "ResultSet {} changed during the operation",
            result_set_id
        )))
    }
}

fn ensure_owned(kind: RecordKind, owner: i64, result_set_id: i64, child_id: i64) -> Result<()> {
    if owner == result_set_id {
        Ok(())
    } else {
        Err(Error::OwnershipMismatch {
            kind,
            child_id,
            result_set_id,
        })
    }
}
