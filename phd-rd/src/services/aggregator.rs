//! Plate result aggregation
//!
//! Answers "all results for plate P" as protocolId -> measId -> entries, one
//! entry per ResultData row with the feature stats of its
//! (resultSetId, featureId). Work is exactly three bulk reads (candidate
//! ResultSets, their ResultData, their feature stats) joined in memory.
//! Entries keep the order of the bulk fetches.

use super::lifecycle::LifecycleManager;
use super::metadata::{MetadataClients, PlateInfo, ProtocolInfo};
use crate::db::{feature_stats, result_data};
use phd_common::models::{
    AggregatedResult, PlateResultFilter, PlateResults, ResultData, ResultFeatureStat, ResultSet,
};
use phd_common::{Error, Result};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::{info, warn};

/// Hard bound on candidate ResultSets per aggregation
pub const MAX_RESULT_SETS: usize = 100;

#[derive(Clone)]
pub struct PlateResultAggregator {
    pool: SqlitePool,
    lifecycle: LifecycleManager,
    metadata: MetadataClients,
}

impl PlateResultAggregator {
    pub fn new(pool: SqlitePool, lifecycle: LifecycleManager, metadata: MetadataClients) -> Self {
        Self {
            pool,
            lifecycle,
            metadata,
        }
    }

    pub async fn plate_results(
        &self,
        plate_id: i64,
        filter: &PlateResultFilter,
    ) -> Result<PlateResults> {
        let candidates = self.lifecycle.find_for_plate(plate_id, filter).await?;
        if candidates.len() > MAX_RESULT_SETS {
            warn!(
                "Plate {} aggregation refused: {} ResultSets exceed limit {}",
                plate_id,
                candidates.len(),
                MAX_RESULT_SETS
            );
            return Err(Error::TooManyResultSets {
                count: candidates.len(),
                limit: MAX_RESULT_SETS,
            });
        }

        let ids: Vec<i64> = candidates.iter().map(|rs| rs.id).collect();
        let data = result_data::fetch_for_result_sets(&self.pool, &ids).await?;
        let stats = feature_stats::fetch_for_result_sets(&self.pool, &ids).await?;

        info!(
            "Aggregated plate {}: {} ResultSets, {} ResultData, {} feature stats",
            plate_id,
            candidates.len(),
            data.len(),
            stats.len()
        );
        Ok(assemble(&candidates, data, stats))
    }

    /// Plate results with plate metadata and protocol/feature names
    pub async fn enriched_plate_results(
        &self,
        plate_id: i64,
        filter: &PlateResultFilter,
    ) -> Result<EnrichedPlateResults> {
        let results = self.plate_results(plate_id, filter).await?;

        let plate = self.metadata.plates()?.plate(plate_id).await?;
        let protocol_client = self.metadata.protocols()?;

        let mut protocols = Vec::with_capacity(results.len());
        for (protocol_id, by_meas) in results {
            let protocol = protocol_client.protocol(protocol_id).await?;
            protocols.push(enrich_protocol(protocol, by_meas));
        }

        Ok(EnrichedPlateResults { plate, protocols })
    }
}

/// Join candidates, their data and their stats into the nested structure
///
/// ResultSets without ResultData are omitted.
pub fn assemble(
    candidates: &[ResultSet],
    data: Vec<ResultData>,
    stats: Vec<ResultFeatureStat>,
) -> PlateResults {
    let mut data_by_set: HashMap<i64, Vec<ResultData>> = HashMap::new();
    for row in data {
        data_by_set.entry(row.result_set_id).or_default().push(row);
    }

    // featureId is unique within one protocol's feature space
    let mut stats_by_feature: HashMap<(i64, i64), Vec<ResultFeatureStat>> = HashMap::new();
    for stat in stats {
        stats_by_feature
            .entry((stat.result_set_id, stat.feature_id))
            .or_default()
            .push(stat);
    }

    let mut results = PlateResults::new();
    for rs in candidates {
        let Some(rows) = data_by_set.remove(&rs.id) else {
            continue;
        };

        let entries = results
            .entry(rs.protocol_id)
            .or_default()
            .entry(rs.meas_id)
            .or_default();
        for row in rows {
            let feature_stats = stats_by_feature
                .get(&(rs.id, row.feature_id))
                .cloned()
                .unwrap_or_default();
            entries.push(AggregatedResult {
                data: row,
                feature_stats,
            });
        }
    }
    results
}

// ========================================
// Enriched view
// ========================================

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedPlateResults {
    pub plate: PlateInfo,
    pub protocols: Vec<ProtocolResults>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolResults {
    pub protocol_id: i64,
    pub protocol_name: String,
    pub measurements: Vec<MeasurementResults>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementResults {
    pub meas_id: i64,
    pub results: Vec<NamedResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedResult {
    /// `None` when the protocol doesn't list the feature
    pub feature_name: Option<String>,
    pub result: AggregatedResult,
}

fn enrich_protocol(
    protocol: ProtocolInfo,
    by_meas: std::collections::BTreeMap<i64, Vec<AggregatedResult>>,
) -> ProtocolResults {
    let names: HashMap<i64, String> = protocol
        .features
        .into_iter()
        .map(|feature| (feature.id, feature.name))
        .collect();

    let measurements = by_meas
        .into_iter()
        .map(|(meas_id, entries)| MeasurementResults {
            meas_id,
            results: entries
                .into_iter()
                .map(|result| NamedResult {
                    feature_name: names.get(&result.data.feature_id).cloned(),
                    result,
                })
                .collect(),
        })
        .collect();

    ProtocolResults {
        protocol_id: protocol.id,
        protocol_name: protocol.name,
        measurements,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::metadata::FeatureInfo;
    use chrono::Utc;
    use phd_common::models::StatusCode;

    fn rs(id: i64, protocol_id: i64, meas_id: i64) -> ResultSet {
        ResultSet {
            id,
            protocol_id,
            plate_id: 2,
            meas_id,
            execution_start: Utc::now(),
            execution_end: None,
            outcome: None,
            errors: Vec::new(),
            errors_text: None,
        }
    }

    fn data(id: i64, result_set_id: i64, feature_id: i64) -> ResultData {
        ResultData {
            id,
            result_set_id,
            feature_id,
            values: vec![1.0],
            status_code: StatusCode::Success,
            status_message: None,
            exit_code: None,
            created_timestamp: Utc::now(),
        }
    }

    fn stat(id: i64, result_set_id: i64, feature_id: i64) -> ResultFeatureStat {
        ResultFeatureStat {
            id,
            result_set_id,
            feature_id,
            feature_stat_id: 100 + id,
            value: Some(0.5),
            statistic_name: "mean".to_string(),
            welltype: None,
            status_code: StatusCode::Success,
            status_message: None,
            exit_code: None,
            created_timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_two_features_one_with_stats() {
        let candidates = vec![rs(1, 1, 3)];
        let results = assemble(
            &candidates,
            vec![data(10, 1, 7), data(11, 1, 8)],
            vec![stat(20, 1, 7)],
        );

        let entries = &results[&1][&3];
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].data.feature_id, 7);
        assert_eq!(entries[0].feature_stats.len(), 1);
        assert_eq!(entries[0].feature_stats[0].id, 20);
        assert_eq!(entries[1].data.feature_id, 8);
        assert!(entries[1].feature_stats.is_empty());
    }

    #[test]
    fn test_result_sets_without_data_are_omitted() {
        let candidates = vec![rs(1, 1, 3), rs(2, 2, 3), rs(3, 1, 4)];
        let results = assemble(&candidates, vec![data(10, 1, 7)], vec![stat(20, 2, 7)]);

        assert_eq!(results.len(), 1);
        assert_eq!(results[&1].len(), 1);
        assert!(results[&1].contains_key(&3));
    }

    #[test]
    fn test_stats_do_not_leak_across_result_sets() {
        // Same featureId in two ResultSets of the same protocol/measurement
        let candidates = vec![rs(1, 1, 3), rs(2, 1, 3)];
        let results = assemble(
            &candidates,
            vec![data(10, 1, 7), data(11, 2, 7)],
            vec![stat(20, 2, 7)],
        );

        let entries = &results[&1][&3];
        assert_eq!(entries.len(), 2);
        assert!(entries[0].feature_stats.is_empty());
        assert_eq!(entries[1].feature_stats[0].result_set_id, 2);
    }

    #[test]
    fn test_entries_follow_fetch_order() {
        let candidates = vec![rs(1, 1, 3)];
        let results = assemble(
            &candidates,
            vec![data(12, 1, 9), data(10, 1, 7), data(11, 1, 8)],
            Vec::new(),
        );
        let ids: Vec<i64> = results[&1][&3].iter().map(|e| e.data.id).collect();
        assert_eq!(ids, vec![12, 10, 11]);
    }

    #[test]
    fn test_enrich_names_known_features() {
        let mut by_meas = std::collections::BTreeMap::new();
        by_meas.insert(
            3,
            vec![
                AggregatedResult {
                    data: data(10, 1, 7),
                    feature_stats: Vec::new(),
                },
                AggregatedResult {
                    data: data(11, 1, 99),
                    feature_stats: Vec::new(),
                },
            ],
        );
        let protocol = ProtocolInfo {
            id: 1,
            name: "Viability".to_string(),
            features: vec![FeatureInfo {
                id: 7,
                name: "Cell count".to_string(),
            }],
        };

        let enriched = enrich_protocol(protocol, by_meas);
        assert_eq!(enriched.protocol_name, "Viability");
        let results = &enriched.measurements[0].results;
        assert_eq!(results[0].feature_name.as_deref(), Some("Cell count"));
        assert!(results[1].feature_name.is_none());
    }
}
