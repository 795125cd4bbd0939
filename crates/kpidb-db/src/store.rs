//! [`PeriodStore`] backed by Postgres.

use kpidb_core::{MetricSeries, PeriodRecord, PeriodStore, PeriodWrite, StoreError};
use sqlx::PgPool;

use crate::{metric_series, period_records};

/// Postgres-backed period store. Cloning shares the underlying pool.
#[derive(Debug, Clone)]
pub struct PgPeriodStore {
    pool: PgPool,
}

impl PgPeriodStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl PeriodStore for PgPeriodStore {
    async fn resolve_series(&self, series: &MetricSeries) -> Result<i64, StoreError> {
        Ok(metric_series::upsert_metric_series(&self.pool, series).await?)
    }

    async fn load_period(
        &self,
        series_id: i64,
        period_key: &str,
    ) -> Result<Option<PeriodRecord>, StoreError> {
        period_records::get_period_record(&self.pool, series_id, period_key)
            .await?
            .map(period_records::PeriodRecordRow::into_record)
            .transpose()
            .map_err(StoreError::from)
    }

    async fn write_period(&self, write: &PeriodWrite) -> Result<PeriodRecord, StoreError> {
        let row = period_records::write_period_record(&self.pool, write)
            .await?
            .ok_or_else(|| StoreError::Conflict {
                series_id: write.series_id,
                period_key: write.period.key.clone(),
            })?;
        tracing::debug!(
            series_id = write.series_id,
            period_key = %write.period.key,
            version = row.version,
            status = %row.status,
            "period record written"
        );
        Ok(row.into_record()?)
    }
}
