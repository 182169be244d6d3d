//! ResultData persistence

use super::result_sets::OPEN_PREDICATE;
use super::{format_timestamp, parse_status, parse_timestamp, push_in_ids};
use chrono::{DateTime, Utc};
use phd_common::models::{NewResultData, ResultData, ResultDataFilter};
use phd_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, QueryBuilder, Row, Sqlite};

const COLUMNS: &str = "id, result_set_id, feature_id, feature_values, status_code, \
                       status_message, exit_code, created_ts";

fn map_row(row: &SqliteRow) -> Result<ResultData> {
    let values: String = row.try_get("feature_values")?;
    let status: String = row.try_get("status_code")?;
    let created: String = row.try_get("created_ts")?;

    Ok(ResultData {
        id: row.try_get("id")?,
        result_set_id: row.try_get("result_set_id")?,
        feature_id: row.try_get("feature_id")?,
        values: serde_json::from_str(&values)?,
        status_code: parse_status("status_code", &status)?,
        status_message: row.try_get("status_message")?,
        exit_code: row.try_get("exit_code")?,
        created_timestamp: parse_timestamp("created_ts", &created)?,
    })
}

/// Insert only while the owning ResultSet is open
///
/// Returns the new id, or `None` when the parent is absent or completed.
pub async fn insert_if_parent_open<'e, E>(
    executor: E,
    result_set_id: i64,
    new: &NewResultData,
    created: DateTime<Utc>,
) -> Result<Option<i64>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let values = serde_json::to_string(&new.values)?;

    let result = sqlx::query(&format!(
        "INSERT INTO result_data \
         (result_set_id, feature_id, feature_values, status_code, status_message, exit_code, created_ts) \
         SELECT ?, ?, ?, ?, ?, ?, ? \
         WHERE EXISTS (SELECT 1 FROM result_set WHERE id = ? AND {})",
        OPEN_PREDICATE
    ))
    .bind(result_set_id)
    .bind(new.feature_id)
    .bind(values)
    .bind(new.status_code.as_str())
    .bind(&new.status_message)
    .bind(new.exit_code)
    .bind(format_timestamp(&created))
    .bind(result_set_id)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    Ok(Some(result.last_insert_rowid()))
}

pub async fn get<'e, E>(executor: E, id: i64) -> Result<Option<ResultData>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(&format!("SELECT {} FROM result_data WHERE id = ?", COLUMNS))
        .bind(id)
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(map_row).transpose()
}

pub async fn count_for_result_set<'e, E>(
    executor: E,
    result_set_id: i64,
    filter: &ResultDataFilter,
) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM result_data WHERE result_set_id = ");
    qb.push_bind(result_set_id);
    push_in_ids(&mut qb, "feature_id", &filter.feature_ids);

    let total = qb.build_query_scalar::<i64>().fetch_one(executor).await?;
    Ok(total)
}

pub async fn list_for_result_set<'e, E>(
    executor: E,
    result_set_id: i64,
    filter: &ResultDataFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<ResultData>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} FROM result_data WHERE result_set_id = ",
        COLUMNS
    ));
    qb.push_bind(result_set_id);
    push_in_ids(&mut qb, "feature_id", &filter.feature_ids);
    qb.push(" ORDER BY id LIMIT ").push_bind(limit);
    qb.push(" OFFSET ").push_bind(offset);

    let rows = qb.build().fetch_all(executor).await?;
    rows.iter().map(map_row).collect()
}

/// Bulk fetch for a set of ResultSets in one query, ordered by id
pub async fn fetch_for_result_sets<'e, E>(executor: E, result_set_ids: &[i64]) -> Result<Vec<ResultData>>
where
    E: Executor<'e, Database = Sqlite>,
{
    if result_set_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM result_data WHERE 1 = 1", COLUMNS));
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
    use phd_common::models::{Completion, NewResultSet, StatusCode};

    fn new_data(feature_id: i64, values: Vec<f32>) -> NewResultData {
        NewResultData {
            feature_id,
            values,
            status_code: StatusCode::Success,
            status_message: Some("ok".to_string()),
            exit_code: Some(0),
        }
    }

    async fn open_set(pool: &sqlx::SqlitePool, plate_id: i64) -> i64 {
        let new = NewResultSet {
            protocol_id: 1,
            plate_id,
            meas_id: 3,
        };
        result_sets::insert(pool, &new, Utc::now()).await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_round_trips_values() {
        let (_dir, pool) = temp_pool().await;
        let rs = open_set(&pool, 2).await;
        let created = Utc::now();

        let id = insert_if_parent_open(&pool, rs, &new_data(42, vec![1.5, 2.0, -3.25]), created)
            .await
            .unwrap()
            .expect("parent open");

        let stored = get(&pool, id).await.unwrap().unwrap();
        assert_eq!(stored.result_set_id, rs);
        assert_eq!(stored.values, vec![1.5, 2.0, -3.25]);
        assert_eq!(stored.status_message.as_deref(), Some("ok"));
        assert_eq!(stored.created_timestamp, created);
    }

    #[tokio::test]
    async fn test_insert_refused_for_missing_or_completed_parent() {
        let (_dir, pool) = temp_pool().await;
        assert!(insert_if_parent_open(&pool, 77, &new_data(1, vec![]), Utc::now())
            .await
            .unwrap()
            .is_none());

        let rs = open_set(&pool, 2).await;
        let completion = Completion {
            outcome: StatusCode::Success,
            errors: Vec::new(),
            errors_text: None,
        };
        result_sets::complete_if_open(&pool, rs, &completion, Utc::now())
            .await
            .unwrap();

        assert!(insert_if_parent_open(&pool, rs, &new_data(1, vec![]), Utc::now())
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            count_for_result_set(&pool, rs, &ResultDataFilter::default())
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_bulk_fetch_spans_result_sets() {
        let (_dir, pool) = temp_pool().await;
        let a = open_set(&pool, 2).await;
        let b = open_set(&pool, 2).await;
        let c = open_set(&pool, 2).await;
        for rs in [a, b, c] {
            insert_if_parent_open(&pool, rs, &new_data(1, vec![1.0]), Utc::now())
                .await
                .unwrap();
        }

        let fetched = fetch_for_result_sets(&pool, &[a, c]).await.unwrap();
        let owners: Vec<i64> = fetched.iter().map(|d| d.result_set_id).collect();
        assert_eq!(owners, vec![a, c]);
        assert!(fetch_for_result_sets(&pool, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_listing_filters_by_feature() {
        let (_dir, pool) = temp_pool().await;
        let rs = open_set(&pool, 2).await;
        for feature_id in [1, 2, 2, 3] {
            insert_if_parent_open(&pool, rs, &new_data(feature_id, vec![]), Utc::now())
                .await
                .unwrap();
        }

        let filter = ResultDataFilter {
            feature_ids: vec![2],
        };
        assert_eq!(count_for_result_set(&pool, rs, &filter).await.unwrap(), 2);
        let page = list_for_result_set(&pool, rs, &filter, 1, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].feature_id, 2);
    }
}
