//! Database operations for `period_records` and `period_record_snapshots`.

use chrono::{DateTime, NaiveDate, Utc};
use kpidb_core::{Granularity, MetricValues, Period, PeriodRecord, PeriodStatus, PeriodWrite};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::DbError;

const RECORD_COLUMNS: &str = "id, series_id, period_key, granularity, period_start, period_end, \
                              status, finalized, metrics, forecast, snapshot_date, \
                              source_row_count, ingestion_run_id, version, created_at, updated_at";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `period_records` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PeriodRecordRow {
    pub id: i64,
    pub series_id: i64,
    pub period_key: String,
    pub granularity: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub status: String,
    pub finalized: bool,
    pub metrics: Json<MetricValues>,
    pub forecast: Option<Json<MetricValues>>,
    pub snapshot_date: DateTime<Utc>,
    pub source_row_count: i32,
    pub ingestion_run_id: Option<i64>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PeriodRecordRow {
    /// Convert into the domain record.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidColumn`] if `granularity` or `status` holds an
    /// unknown value.
    pub fn into_record(self) -> Result<PeriodRecord, DbError> {
        let granularity =
            Granularity::parse(&self.granularity).ok_or_else(|| DbError::InvalidColumn {
                column: "granularity",
                value: self.granularity.clone(),
            })?;
        let status = PeriodStatus::parse(&self.status).ok_or_else(|| DbError::InvalidColumn {
            column: "status",
            value: self.status.clone(),
        })?;

        Ok(PeriodRecord {
            series_id: self.series_id,
            period: Period {
                granularity,
                key: self.period_key,
                start: self.period_start,
                end: self.period_end,
            },
            status,
            finalized: self.finalized,
            metrics: self.metrics.0,
            forecast: self.forecast.map(|f| f.0),
            snapshot_date: self.snapshot_date,
            source_row_count: self.source_row_count,
            version: self.version,
        })
    }
}

/// A period record joined with its series, for listings.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PeriodRecordListRow {
    pub brand: String,
    pub metric_group: String,
    pub period_key: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub status: String,
    pub finalized: bool,
    pub metrics: Json<MetricValues>,
    pub forecast: Option<Json<MetricValues>>,
    pub snapshot_date: DateTime<Utc>,
    pub source_row_count: i32,
    pub version: i64,
}

/// A row from the `period_record_snapshots` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PeriodSnapshotRow {
    pub id: i64,
    pub period_record_id: i64,
    pub status: String,
    pub finalized: bool,
    pub metrics: Json<MetricValues>,
    pub forecast: Option<Json<MetricValues>>,
    pub snapshot_date: DateTime<Utc>,
    pub source_row_count: i32,
    pub ingestion_run_id: Option<i64>,
    pub version: i64,
    pub recorded_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Fetches the record for `(series_id, period_key)`, if any.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_period_record(
    pool: &PgPool,
    series_id: i64,
    period_key: &str,
) -> Result<Option<PeriodRecordRow>, DbError> {
    let row = sqlx::query_as::<_, PeriodRecordRow>(&format!(
        "SELECT {RECORD_COLUMNS} FROM period_records \
         WHERE series_id = $1 AND period_key = $2"
    ))
    .bind(series_id)
    .bind(period_key)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Lists the newest `limit` records of `dataset`, optionally for one brand.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_period_records(
    pool: &PgPool,
    dataset: &str,
    brand: Option<&str>,
    limit: i64,
) -> Result<Vec<PeriodRecordListRow>, DbError> {
    let rows = sqlx::query_as::<_, PeriodRecordListRow>(
        "SELECT s.brand, s.metric_group, r.period_key, r.period_start, r.period_end, \
                r.status, r.finalized, r.metrics, r.forecast, r.snapshot_date, \
                r.source_row_count, r.version \
         FROM period_records r \
         JOIN metric_series s ON s.id = r.series_id \
         WHERE s.dataset = $1 AND ($2::text IS NULL OR s.brand = $2) \
         ORDER BY r.period_start DESC, s.brand, s.metric_group \
         LIMIT $3",
    )
    .bind(dataset)
    .bind(brand)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Full write history of one period, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_period_snapshots(
    pool: &PgPool,
    series_id: i64,
    period_key: &str,
) -> Result<Vec<PeriodSnapshotRow>, DbError> {
    let rows = sqlx::query_as::<_, PeriodSnapshotRow>(
        "SELECT id, period_record_id, status, finalized, metrics, forecast, snapshot_date, \
                source_row_count, ingestion_run_id, version, recorded_at \
         FROM period_record_snapshots \
         WHERE series_id = $1 AND period_key = $2 \
         ORDER BY version ASC",
    )
    .bind(series_id)
    .bind(period_key)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Applies `write` and appends its snapshot row in one transaction.
///
/// With `expected_version = None` the record is inserted; with `Some(v)` it is
/// updated only while still at version `v` and its version is bumped.
/// Returns `Ok(None)` when the guard fails (the record already exists, or was
/// changed by someone else); nothing is written in that case.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails.
pub async fn write_period_record(
    pool: &PgPool,
    write: &PeriodWrite,
) -> Result<Option<PeriodRecordRow>, DbError> {
    let mut tx = pool.begin().await?;

    let row = match write.expected_version {
        None => {
            sqlx::query_as::<_, PeriodRecordRow>(&format!(
                "INSERT INTO period_records \
                   (series_id, period_key, granularity, period_start, period_end, status, \
                    finalized, metrics, forecast, snapshot_date, source_row_count, \
                    ingestion_run_id, version) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 1) \
                 ON CONFLICT (series_id, period_key) DO NOTHING \
                 RETURNING {RECORD_COLUMNS}"
            ))
            .bind(write.series_id)
            .bind(&write.period.key)
            .bind(write.period.granularity.as_str())
            .bind(write.period.start)
            .bind(write.period.end)
            .bind(write.status.as_str())
            .bind(write.finalized)
            .bind(Json(&write.metrics))
            .bind(write.forecast.as_ref().map(Json))
            .bind(write.snapshot_date)
            .bind(write.source_row_count)
            .bind(write.ingestion_run_id)
            .fetch_optional(&mut *tx)
            .await?
        }
        Some(expected) => {
            sqlx::query_as::<_, PeriodRecordRow>(&format!(
                "UPDATE period_records \
                 SET status = $1, finalized = $2, metrics = $3, forecast = $4, \
                     snapshot_date = $5, source_row_count = $6, ingestion_run_id = $7, \
                     version = version + 1, updated_at = NOW() \
                 WHERE series_id = $8 AND period_key = $9 AND version = $10 \
                 RETURNING {RECORD_COLUMNS}"
            ))
            .bind(write.status.as_str())
            .bind(write.finalized)
            .bind(Json(&write.metrics))
            .bind(write.forecast.as_ref().map(Json))
            .bind(write.snapshot_date)
            .bind(write.source_row_count)
            .bind(write.ingestion_run_id)
            .bind(write.series_id)
            .bind(&write.period.key)
            .bind(expected)
            .fetch_optional(&mut *tx)
            .await?
        }
    };

    let Some(row) = row else {
        tx.rollback().await?;
        return Ok(None);
    };

    sqlx::query(
        "INSERT INTO period_record_snapshots \
           (period_record_id, series_id, period_key, status, finalized, metrics, forecast, \
            snapshot_date, source_row_count, ingestion_run_id, version) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(row.id)
    .bind(row.series_id)
    .bind(&row.period_key)
    .bind(&row.status)
    .bind(row.finalized)
    .bind(&row.metrics)
    .bind(&row.forecast)
    .bind(row.snapshot_date)
    .bind(row.source_row_count)
    .bind(row.ingestion_run_id)
    .bind(row.version)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some(row))
}
