//! Database operations for `metric_series`.

use chrono::{DateTime, Utc};
use kpidb_core::MetricSeries;
use sqlx::PgPool;

use crate::DbError;

/// A row from the `metric_series` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MetricSeriesRow {
    pub id: i64,
    pub dataset: String,
    pub brand: String,
    pub metric_group: String,
    pub created_at: DateTime<Utc>,
}

/// Returns the id of `series`, inserting it on first use.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_metric_series(pool: &PgPool, series: &MetricSeries) -> Result<i64, DbError> {
    // The no-op update makes RETURNING yield the existing id on conflict.
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO metric_series (dataset, brand, metric_group) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (dataset, brand, metric_group) DO UPDATE \
           SET dataset = EXCLUDED.dataset \
         RETURNING id",
    )
    .bind(&series.dataset)
    .bind(&series.brand)
    .bind(&series.metric_group)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Looks up the id of `series` without creating it.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_metric_series_id(
    pool: &PgPool,
    series: &MetricSeries,
) -> Result<Option<i64>, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM metric_series \
         WHERE dataset = $1 AND brand = $2 AND metric_group = $3",
    )
    .bind(&series.dataset)
    .bind(&series.brand)
    .bind(&series.metric_group)
    .fetch_optional(pool)
    .await?;

    Ok(id)
}

/// Lists every series of `dataset`, ordered by brand.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_metric_series(
    pool: &PgPool,
    dataset: &str,
) -> Result<Vec<MetricSeriesRow>, DbError> {
    let rows = sqlx::query_as::<_, MetricSeriesRow>(
        "SELECT id, dataset, brand, metric_group, created_at \
         FROM metric_series \
         WHERE dataset = $1 \
         ORDER BY brand, metric_group",
    )
    .bind(dataset)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
