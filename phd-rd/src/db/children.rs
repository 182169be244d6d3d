//! Operations shared by the two child record tables
//!
//! ResultData and ResultFeatureStat follow identical attachment rules, so
//! ownership lookup and guarded deletion are written once against the table
//! of the given [`RecordKind`].

use super::result_sets::OPEN_PREDICATE;
use phd_common::{Error, RecordKind, Result};
use sqlx::{Executor, Sqlite};

/// Table holding records of `kind`
pub fn table_for(kind: RecordKind) -> Result<&'static str> {
    match kind {
        RecordKind::ResultData => Ok("result_data"),
        RecordKind::ResultFeatureStat => Ok("result_feature_stat"),
        RecordKind::ResultSet => Err(Error::Internal(
            "ResultSet is not a child record".to_string(),
        )),
    }
}

/// Stored owner (resultSetId) of a child, `None` if the child doesn't exist
pub async fn owner_of<'e, E>(executor: E, kind: RecordKind, child_id: i64) -> Result<Option<i64>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let table = table_for(kind)?;
    let owner: Option<i64> = sqlx::query_scalar(&format!(
        "SELECT result_set_id FROM {} WHERE id = ?",
        table
    ))
    .bind(child_id)
    .fetch_optional(executor)
    .await?;

    Ok(owner)
}

/// Delete a child only if it is owned by `result_set_id` and that ResultSet
/// is still open, in one statement
pub async fn delete_if_parent_open<'e, E>(
    executor: E,
    kind: RecordKind,
    result_set_id: i64,
    child_id: i64,
) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let table = table_for(kind)?;
    let result = sqlx::query(&format!(
        "DELETE FROM {table} WHERE id = ? AND result_set_id = ? \
         AND EXISTS (SELECT 1 FROM result_set WHERE id = ? AND {open})",
        table = table,
        open = OPEN_PREDICATE
    ))
    .bind(child_id)
    .bind(result_set_id)
    .bind(result_set_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_set_is_not_a_child_table() {
        assert!(table_for(RecordKind::ResultSet).is_err());
        assert_eq!(table_for(RecordKind::ResultData).unwrap(), "result_data");
        assert_eq!(
            table_for(RecordKind::ResultFeatureStat).unwrap(),
            "result_feature_stat"
        );
    }
}
