//! ResultFeatureStat persistence
//!
//! Duplicate (result_set_id, feature_stat_id, welltype) rows are rejected by
//! the unique indexes; the violation is reported as `DuplicateFeatureStat`.

use super::result_sets::OPEN_PREDICATE;
use super::{format_timestamp, parse_status, parse_timestamp, push_in_ids};
use chrono::{DateTime, Utc};
use phd_common::models::{FeatureStatFilter, NewFeatureStat, ResultFeatureStat};
use phd_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, QueryBuilder, Row, Sqlite};

const COLUMNS: &str = "id, result_set_id, feature_id, feature_stat_id, value, statistic_name, \
                       welltype, status_code, status_message, exit_code, created_ts";

fn map_row(row: &SqliteRow) -> Result<ResultFeatureStat> {
    let status: String = row.try_get("status_code")?;
    let created: String = row.try_get("created_ts")?;
    let value: Option<f64> = row.try_get("value")?;

    Ok(ResultFeatureStat {
        id: row.try_get("id")?,
        result_set_id: row.try_get("result_set_id")?,
        feature_id: row.try_get("feature_id")?,
        feature_stat_id: row.try_get("feature_stat_id")?,
        value: value.map(|v| v as f32),
        statistic_name: row.try_get("statistic_name")?,
        welltype: row.try_get("welltype")?,
        status_code: parse_status("status_code", &status)?,
        status_message: row.try_get("status_message")?,
        exit_code: row.try_get("exit_code")?,
        created_timestamp: parse_timestamp("created_ts", &created)?,
    })
}

fn translate_insert_error(err: sqlx::Error, result_set_id: i64, new: &NewFeatureStat) -> Error {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            Error::DuplicateFeatureStat {
                result_set_id,
                feature_stat_id: new.feature_stat_id,
                welltype: new.welltype.clone(),
            }
        }
        _ => Error::Database(err),
    }
}

/// Insert only while the owning ResultSet is open
///
/// Returns the new id, or `None` when the parent is absent or completed.
pub async fn insert_if_parent_open<'e, E>(
    executor: E,
    result_set_id: i64,
    new: &NewFeatureStat,
    created: DateTime<Utc>,
) -> Result<Option<i64>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(&format!(
        "INSERT INTO result_feature_stat \
         (result_set_id, feature_id, feature_stat_id, value, statistic_name, welltype, \
          status_code, status_message, exit_code, created_ts) \
         SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ? \
         WHERE EXISTS (SELECT 1 FROM result_set WHERE id = ? AND {})",
        OPEN_PREDICATE
    ))
    .bind(result_set_id)
    .bind(new.feature_id)
    .bind(new.feature_stat_id)
    .bind(new.value.map(f64::from))
    .bind(&new.statistic_name)
    .bind(&new.welltype)
    .bind(new.status_code.as_str())
    .bind(&new.status_message)
    .bind(new.exit_code)
    .bind(format_timestamp(&created))
    .bind(result_set_id)
    .execute(executor)
    .await
    .map_err(|e| translate_insert_error(e, result_set_id, new))?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    Ok(Some(result.last_insert_rowid()))
}

pub async fn get<'e, E>(executor: E, id: i64) -> Result<Option<ResultFeatureStat>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(&format!(
        "SELECT {} FROM result_feature_stat WHERE id = ?",
        COLUMNS
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(map_row).transpose()
}

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &FeatureStatFilter) {
    push_in_ids(qb, "feature_id", &filter.feature_ids);
    push_in_ids(qb, "feature_stat_id", &filter.feature_stat_ids);
}

pub async fn count_for_result_set<'e, E>(
    executor: E,
    result_set_id: i64,
    filter: &FeatureStatFilter,
) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT COUNT(*) FROM result_feature_stat WHERE result_set_id = ",
    );
    qb.push_bind(result_set_id);
    push_filter(&mut qb, filter);

    let total = qb.build_query_scalar::<i64>().fetch_one(executor).await?;
    Ok(total)
}

pub async fn list_for_result_set<'e, E>(
    executor: E,
    result_set_id: i64,
    filter: &FeatureStatFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<ResultFeatureStat>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} FROM result_feature_stat WHERE result_set_id = ",
        COLUMNS
    ));
    qb.push_bind(result_set_id);
    push_filter(&mut qb, filter);
    qb.push(" ORDER BY id LIMIT ").push_bind(limit);
    qb.push(" OFFSET ").push_bind(offset);

    let rows = qb.build().fetch_all(executor).await?;
    rows.iter().map(map_row).collect()
}

/// Bulk fetch for a set of ResultSets in one query, ordered by id
pub async fn fetch_for_result_sets<'e, E>(
    executor: E,
    result_set_ids: &[i64],
) -> Result<Vec<ResultFeatureStat>>
where
    E: Executor<'e, Database = Sqlite>,
{
    if result_set_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} FROM result_feature_stat WHERE 1 = 1",
        COLUMNS
    ));
    push_in_ids(&mut qb, "result_set_id", result_set_ids);
    qb.push(" ORDER BY id");

    let rows = qb.build().fetch_all(executor).await?;
    rows.iter().map(map_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::result_sets;
    use crate::db::test_support::temp_pool;
    use phd_common::models::{NewResultSet, StatusCode};

    fn stat(feature_stat_id: i64, welltype: Option<&str>) -> NewFeatureStat {
        NewFeatureStat {
            feature_id: 42,
            feature_stat_id,
            value: Some(42.0),
            statistic_name: "mean".to_string(),
            welltype: welltype.map(str::to_string),
            status_code: StatusCode::Success,
            status_message: None,
            exit_code: None,
        }
    }

    async fn open_set(pool: &sqlx::SqlitePool) -> i64 {
        let new = NewResultSet {
            protocol_id: 1,
            plate_id: 2,
            meas_id: 3,
        };
        result_sets::insert(pool, &new, Utc::now()).await.unwrap()
    }

    #[tokio::test]
    async fn test_null_and_specific_welltype_coexist() {
        let (_dir, pool) = temp_pool().await;
        let rs = open_set(&pool).await;

        insert_if_parent_open(&pool, rs, &stat(45, None), Utc::now())
            .await
            .unwrap()
            .unwrap();
        insert_if_parent_open(&pool, rs, &stat(45, Some("SAMPLE")), Utc::now())
            .await
            .unwrap()
            .unwrap();
        insert_if_parent_open(&pool, rs, &stat(45, Some("CONTROL")), Utc::now())
            .await
            .unwrap()
            .unwrap();

        let total = count_for_result_set(&pool, rs, &FeatureStatFilter::default())
            .await
            .unwrap();
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn test_duplicate_whole_plate_stat_rejected() {
        let (_dir, pool) = temp_pool().await;
        let rs = open_set(&pool).await;
        insert_if_parent_open(&pool, rs, &stat(45, None), Utc::now())
            .await
            .unwrap();

        let err = insert_if_parent_open(&pool, rs, &stat(45, None), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DuplicateFeatureStat {
                feature_stat_id: 45,
                welltype: None,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_duplicate_welltype_stat_rejected() {
        let (_dir, pool) = temp_pool().await;
        let rs = open_set(&pool).await;
        insert_if_parent_open(&pool, rs, &stat(45, Some("SAMPLE")), Utc::now())
            .await
            .unwrap();

        let err = insert_if_parent_open(&pool, rs, &stat(45, Some("SAMPLE")), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateFeatureStat { .. }));
    }

    #[tokio::test]
    async fn test_same_stat_allowed_in_other_result_set() {
        let (_dir, pool) = temp_pool().await;
        let first = open_set(&pool).await;
        let second = open_set(&pool).await;

        insert_if_parent_open(&pool, first, &stat(45, None), Utc::now())
            .await
            .unwrap()
            .unwrap();
        insert_if_parent_open(&pool, second, &stat(45, None), Utc::now())
            .await
            .unwrap()
            .unwrap();

        let all = fetch_for_result_sets(&pool, &[first, second]).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].value, Some(42.0));
    }
}
