//! Record store for phd-rd
//!
//! SQLite through sqlx. Every race-sensitive rule (completion, duplicate
//! feature stats, attaching to a completed ResultSet) is expressed as a single
//! conditional statement or a unique index here, never as read-then-write in
//! the services.

pub mod children;
pub mod feature_stats;
pub mod result_data;
pub mod result_sets;

use chrono::{DateTime, Utc};
use phd_common::models::StatusCode;
use phd_common::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Schema statements, applied idempotently at startup
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS result_set (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        protocol_id INTEGER NOT NULL,
        plate_id INTEGER NOT NULL,
        meas_id INTEGER NOT NULL,
        execution_start_ts TEXT NOT NULL,
        execution_end_ts TEXT,
        outcome TEXT,
        errors TEXT NOT NULL DEFAULT '[]',
        errors_text TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_result_set_plate ON result_set(plate_id, protocol_id)",
    r#"
    CREATE TABLE IF NOT EXISTS result_data (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        result_set_id INTEGER NOT NULL REFERENCES result_set(id) ON DELETE CASCADE,
        feature_id INTEGER NOT NULL,
        feature_values TEXT NOT NULL,
        status_code TEXT NOT NULL,
        status_message TEXT,
        exit_code INTEGER,
        created_ts TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_result_data_set ON result_data(result_set_id)",
    r#"
    CREATE TABLE IF NOT EXISTS result_feature_stat (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        result_set_id INTEGER NOT NULL REFERENCES result_set(id) ON DELETE CASCADE,
        feature_id INTEGER NOT NULL,
        feature_stat_id INTEGER NOT NULL,
        value REAL,
        statistic_name TEXT NOT NULL,
        welltype TEXT,
        status_code TEXT NOT NULL,
        status_message TEXT,
        exit_code INTEGER,
        created_ts TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_feature_stat_set ON result_feature_stat(result_set_id, feature_id)",
    // SQLite treats NULLs as distinct in UNIQUE, so whole-plate stats (NULL
    // welltype) get their own index.
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS ux_feature_stat_welltype
        ON result_feature_stat(result_set_id, feature_stat_id, welltype)
        WHERE welltype IS NOT NULL
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS ux_feature_stat_whole_plate
        ON result_feature_stat(result_set_id, feature_stat_id)
        WHERE welltype IS NULL
    "#,
];

/// Open (creating if needed) the database file and apply the schema
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    connect(&db_url).await
}

/// Connect to `db_url` and apply the schema
pub async fn connect(db_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(db_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    init_tables(&pool).await?;
    Ok(pool)
}

/// Create tables and indexes if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::info!("Database tables initialized (result_set, result_data, result_feature_stat)");
    Ok(())
}

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

pub(crate) fn parse_status(column: &str, value: &str) -> Result<StatusCode> {
    value
        .parse::<StatusCode>()
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

/// Append ` AND <column> IN (?, ...)` when `values` is non-empty
pub(crate) fn push_in_filter<T>(qb: &mut QueryBuilder<'_, Sqlite>, column: &str, values: &[T])
where
    T: ToString,
{
    push_in_bound(qb, column, values.iter().map(ToString::to_string).collect());
}

pub(crate) fn push_in_ids(qb: &mut QueryBuilder<'_, Sqlite>, column: &str, ids: &[i64]) {
    if ids.is_empty() {
        return;
    }
    qb.push(" AND ").push(column).push(" IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
}

fn push_in_bound(qb: &mut QueryBuilder<'_, Sqlite>, column: &str, values: Vec<String>) {
    if values.is_empty() {
        return;
    }
    qb.push(" AND ").push(column).push(" IN (");
    let mut separated = qb.separated(", ");
    for value in values {
        separated.push_bind(value);
    }
    separated.push_unseparated(")");
}
