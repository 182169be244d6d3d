//! ResultSet persistence

use super::{format_timestamp, parse_status, parse_timestamp, push_in_filter, push_in_ids};
use chrono::{DateTime, Utc};
use phd_common::models::{Completion, NewResultSet, ResultSet, ResultSetFilter};
use phd_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, QueryBuilder, Row, Sqlite, SqliteConnection};

const COLUMNS: &str = "id, protocol_id, plate_id, meas_id, execution_start_ts, execution_end_ts, \
                       outcome, errors, errors_text";

/// "Currently open" guard shared by every conditional mutation
pub(crate) const OPEN_PREDICATE: &str = "outcome IS NULL AND execution_end_ts IS NULL";

fn map_row(row: &SqliteRow) -> Result<ResultSet> {
    let start: String = row.try_get("execution_start_ts")?;
    let end: Option<String> = row.try_get("execution_end_ts")?;
    let outcome: Option<String> = row.try_get("outcome")?;
    let errors: String = row.try_get("errors")?;

    Ok(ResultSet {
        id: row.try_get("id")?,
        protocol_id: row.try_get("protocol_id")?,
        plate_id: row.try_get("plate_id")?,
        meas_id: row.try_get("meas_id")?,
        execution_start: parse_timestamp("execution_start_ts", &start)?,
        execution_end: end
            .map(|s| parse_timestamp("execution_end_ts", &s))
            .transpose()?,
        outcome: outcome.map(|s| parse_status("outcome", &s)).transpose()?,
        errors: serde_json::from_str(&errors)?,
        errors_text: row.try_get("errors_text")?,
    })
}

/// Insert an OPEN ResultSet and return its id
pub async fn insert<'e, E>(executor: E, new: &NewResultSet, started: DateTime<Utc>) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO result_set (protocol_id, plate_id, meas_id, execution_start_ts, errors)
        VALUES (?, ?, ?, ?, '[]')
        "#,
    )
    .bind(new.protocol_id)
    .bind(new.plate_id)
    .bind(new.meas_id)
    .bind(format_timestamp(&started))
    .execute(executor)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn get<'e, E>(executor: E, id: i64) -> Result<Option<ResultSet>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(&format!("SELECT {} FROM result_set WHERE id = ?", COLUMNS))
        .bind(id)
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(map_row).transpose()
}

pub async fn exists<'e, E>(executor: E, id: i64) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM result_set WHERE id = ?")
        .bind(id)
        .fetch_one(executor)
        .await?;
    Ok(count > 0)
}

/// Write the terminal values only if the record is still open
///
/// Returns the affected row count: 1 on success, 0 when the record is absent
/// or already completed.
pub async fn complete_if_open<'e, E>(
    executor: E,
    id: i64,
    completion: &Completion,
    ended: DateTime<Utc>,
) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let errors = serde_json::to_string(&completion.errors)?;

    let result = sqlx::query(&format!(
        "UPDATE result_set SET outcome = ?, errors = ?, errors_text = ?, execution_end_ts = ? \
         WHERE id = ? AND {}",
        OPEN_PREDICATE
    ))
    .bind(completion.outcome.as_str())
    .bind(errors)
    .bind(&completion.errors_text)
    .bind(format_timestamp(&ended))
    .bind(id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Delete a ResultSet together with its children
///
/// Runs on one connection so the caller can wrap it in a transaction.
pub async fn delete_cascade(conn: &mut SqliteConnection, id: i64) -> Result<u64> {
    sqlx::query("DELETE FROM result_feature_stat WHERE result_set_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM result_data WHERE result_set_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    let result = sqlx::query("DELETE FROM result_set WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &ResultSetFilter) {
    push_in_ids(qb, "id", &filter.ids);
    push_in_ids(qb, "plate_id", &filter.plate_ids);
    push_in_ids(qb, "protocol_id", &filter.protocol_ids);
    push_in_ids(qb, "meas_id", &filter.meas_ids);
    push_in_filter(qb, "outcome", &filter.outcomes);
}

pub async fn count<'e, E>(executor: E, filter: &ResultSetFilter) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM result_set WHERE 1 = 1");
    push_filter(&mut qb, filter);

    let total = qb.build_query_scalar::<i64>().fetch_one(executor).await?;
    Ok(total)
}

/// One page of ResultSets, ordered by id
pub async fn list<'e, E>(
    executor: E,
    filter: &ResultSetFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<ResultSet>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM result_set WHERE 1 = 1", COLUMNS));
    push_filter(&mut qb, filter);
    qb.push(" ORDER BY id LIMIT ").push_bind(limit);
    qb.push(" OFFSET ").push_bind(offset);

    let rows = qb.build().fetch_all(executor).await?;
    rows.iter().map(map_row).collect()
}

/// All ResultSets of a plate, optionally narrowed, ordered by id
pub async fn list_for_plate<'e, E>(
    executor: E,
    plate_id: i64,
    protocol_id: Option<i64>,
    meas_id: Option<i64>,
) -> Result<Vec<ResultSet>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM result_set WHERE plate_id = ", COLUMNS));
    qb.push_bind(plate_id);
    if let Some(protocol_id) = protocol_id {
        qb.push(" AND protocol_id = ").push_bind(protocol_id);
    }
    if let Some(meas_id) = meas_id {
        qb.push(" AND meas_id = ").push_bind(meas_id);
    }
    qb.push(" ORDER BY id");

    let rows = qb.build().fetch_all(executor).await?;
    rows.iter().map(map_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_pool;
    use phd_common::models::StatusCode;

    fn new_set(protocol_id: i64, plate_id: i64, meas_id: i64) -> NewResultSet {
        NewResultSet {
            protocol_id,
            plate_id,
            meas_id,
        }
    }

    fn success() -> Completion {
        Completion {
            outcome: StatusCode::Success,
            errors: Vec::new(),
            errors_text: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_open_record() {
        let (_dir, pool) = temp_pool().await;
        let started = Utc::now();
        let id = insert(&pool, &new_set(1, 2, 3), started).await.unwrap();

        let rs = get(&pool, id).await.unwrap().unwrap();
        assert_eq!(rs.id, id);
        assert_eq!((rs.protocol_id, rs.plate_id, rs.meas_id), (1, 2, 3));
        assert_eq!(rs.execution_start, started);
        assert!(rs.outcome.is_none());
        assert!(rs.execution_end.is_none());
        assert!(rs.errors.is_empty());
    }

    #[tokio::test]
    async fn test_complete_if_open_affects_exactly_once() {
        let (_dir, pool) = temp_pool().await;
        let id = insert(&pool, &new_set(1, 2, 3), Utc::now()).await.unwrap();

        assert_eq!(complete_if_open(&pool, id, &success(), Utc::now()).await.unwrap(), 1);

        let mut failure = success();
        failure.outcome = StatusCode::Failure;
        assert_eq!(complete_if_open(&pool, id, &failure, Utc::now()).await.unwrap(), 0);

        let rs = get(&pool, id).await.unwrap().unwrap();
        assert_eq!(rs.outcome, Some(StatusCode::Success));
    }

    #[tokio::test]
    async fn test_complete_missing_record_affects_nothing() {
        let (_dir, pool) = temp_pool().await;
        assert_eq!(complete_if_open(&pool, 99, &success(), Utc::now()).await.unwrap(), 0);
        assert!(!exists(&pool, 99).await.unwrap());
    }

    #[tokio::test]
    async fn test_filtered_listing_and_count() {
        let (_dir, pool) = temp_pool().await;
        insert(&pool, &new_set(1, 10, 1), Utc::now()).await.unwrap();
        let second = insert(&pool, &new_set(2, 10, 1), Utc::now()).await.unwrap();
        insert(&pool, &new_set(1, 11, 1), Utc::now()).await.unwrap();
        complete_if_open(&pool, second, &success(), Utc::now()).await.unwrap();

        let by_plate = ResultSetFilter {
            plate_ids: vec![10],
            ..Default::default()
        };
        assert_eq!(count(&pool, &by_plate).await.unwrap(), 2);

        let by_outcome = ResultSetFilter {
            outcomes: vec![StatusCode::Success],
            ..Default::default()
        };
        let listed = list(&pool, &by_outcome, 10, 0).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, second);

        let paged = list(&pool, &ResultSetFilter::default(), 2, 2).await.unwrap();
        assert_eq!(paged.len(), 1);
    }

    #[tokio::test]
    async fn test_list_for_plate_narrows_by_protocol_and_measurement() {
        let (_dir, pool) = temp_pool().await;
        insert(&pool, &new_set(1, 5, 1), Utc::now()).await.unwrap();
        insert(&pool, &new_set(1, 5, 2), Utc::now()).await.unwrap();
        insert(&pool, &new_set(2, 5, 1), Utc::now()).await.unwrap();
        insert(&pool, &new_set(1, 6, 1), Utc::now()).await.unwrap();

        assert_eq!(list_for_plate(&pool, 5, None, None).await.unwrap().len(), 3);
        assert_eq!(list_for_plate(&pool, 5, Some(1), None).await.unwrap().len(), 2);
        assert_eq!(list_for_plate(&pool, 5, Some(1), Some(2)).await.unwrap().len(), 1);
    }
}
