//! Run-level stamping of every record write.

use chrono::{DateTime, Utc};

use crate::aggregate::PeriodBatch;
use crate::reconcile::PeriodUpdate;
use crate::store::PeriodWrite;
use crate::types::PeriodRecord;

/// The instant and run id shared by every write of one ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotStamp {
    pub snapshot_date: DateTime<Utc>,
    pub ingestion_run_id: Option<i64>,
}

impl SnapshotStamp {
    #[must_use]
    pub fn new(snapshot_date: DateTime<Utc>, ingestion_run_id: Option<i64>) -> Self {
        Self {
            snapshot_date,
            ingestion_run_id,
        }
    }

    /// Build the store write for `update`, guarded by `existing`'s version.
    #[must_use]
    pub fn write(
        &self,
        series_id: i64,
        batch: &PeriodBatch,
        update: PeriodUpdate,
        existing: Option<&PeriodRecord>,
    ) -> PeriodWrite {
        PeriodWrite {
            series_id,
            period: batch.period.clone(),
            status: update.state.status(),
            finalized: update.state.finalized(),
            metrics: update.metrics,
            forecast: update.forecast,
            snapshot_date: self.snapshot_date,
            source_row_count: batch.source_row_count,
            ingestion_run_id: self.ingestion_run_id,
            expected_version: existing.map(|r| r.version),
        }
    }
}
