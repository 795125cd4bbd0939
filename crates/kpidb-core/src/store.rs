//! Persistence seam between the reconciler and a concrete store.
//!
//! The Postgres implementation lives in `kpidb-db`; `kpidb-ingest` carries an
//! in-memory one used for dry runs and tests.

use std::future::Future;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::period::{Period, PeriodStatus};
use crate::types::{MetricSeries, MetricValues, PeriodRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Another writer changed or created the record since it was read.
    #[error("concurrent write detected for series {series_id} period {period_key}")]
    Conflict { series_id: i64, period_key: String },

    #[error("store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// One full record write, produced by [`crate::SnapshotStamp::write`].
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodWrite {
    pub series_id: i64,
    pub period: Period,
    pub status: PeriodStatus,
    pub finalized: bool,
    pub metrics: MetricValues,
    pub forecast: Option<MetricValues>,
    pub snapshot_date: DateTime<Utc>,
    pub source_row_count: i32,
    pub ingestion_run_id: Option<i64>,
    /// `None` inserts a new record; `Some(v)` updates the record only if it
    /// is still at version `v`.
    pub expected_version: Option<i64>,
}

pub trait PeriodStore: Send + Sync {
    /// Return the id for `series`, creating it on first use.
    fn resolve_series(
        &self,
        series: &MetricSeries,
    ) -> impl Future<Output = Result<i64, StoreError>> + Send;

    fn load_period(
        &self,
        series_id: i64,
        period_key: &str,
    ) -> impl Future<Output = Result<Option<PeriodRecord>, StoreError>> + Send;

    /// Apply `write` atomically together with its audit snapshot.
    ///
    /// Fails with [`StoreError::Conflict`] when an insert finds an existing
    /// record or an update finds a different version.
    fn write_period(
        &self,
        write: &PeriodWrite,
    ) -> impl Future<Output = Result<PeriodRecord, StoreError>> + Send;
}
