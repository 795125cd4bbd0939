//! Per-dataset ingestion: source → normalize → aggregate → reconcile → store.
//!
//! Each period is its own store transaction. A row that fails validation is
//! dropped and counted; a period whose write keeps conflicting, or whose store
//! call fails, is counted as failed. Neither aborts the run. Only a source
//! failure does, and it happens before anything is written.

use std::collections::HashMap;

use chrono::NaiveDate;
use kpidb_core::{
    aggregate_observations, compute_forecast, normalize_rows, DatasetConfig, MetricSeries,
    PeriodBatch, PeriodStore, PeriodUpdate, RawRow, SkipReason, SnapshotStamp, StoreError,
    UpsertAction,
};
use kpidb_sheets::{SheetFetcher, SheetSource};

use crate::error::IngestError;
use crate::summary::RunSummary;

/// What happened to one period.
enum PeriodOutcome {
    Written {
        action: UpsertAction,
        forecast: bool,
    },
    Skipped(SkipReason),
}

/// Fetch `dataset`'s sheet from `source` and reconcile it into `store`.
///
/// # Errors
///
/// Returns [`IngestError::SourceFetch`] if the sheet cannot be read or laid
/// out; nothing is written in that case.
pub async fn run_ingestion<S: PeriodStore>(
    store: &S,
    fetcher: &SheetFetcher,
    source: &SheetSource,
    dataset: &DatasetConfig,
    as_of: NaiveDate,
    stamp: SnapshotStamp,
) -> Result<RunSummary, IngestError> {
    let table = fetcher
        .fetch_table(source, &dataset.sheet)
        .await
        .map_err(|e| IngestError::SourceFetch {
            dataset: dataset.name.clone(),
            sheet: dataset.sheet.clone(),
            source: e,
        })?;

    let mut summary = reconcile_rows(store, dataset, &table.rows, as_of, stamp).await;
    summary.source_date = table.source_date;
    Ok(summary)
}

/// Normalize `rows` and reconcile every resulting period into `store`.
pub async fn reconcile_rows<S: PeriodStore>(
    store: &S,
    dataset: &DatasetConfig,
    rows: &[RawRow],
    as_of: NaiveDate,
    stamp: SnapshotStamp,
) -> RunSummary {
    let mut summary = RunSummary::new(&dataset.name, as_of);

    let normalized = normalize_rows(dataset, rows, as_of);
    summary.rows_read = normalized.rows_read;
    summary.rows_dropped = normalized.rows_dropped();
    for err in &normalized.rejected {
        tracing::warn!(dataset = %dataset.name, error = %err, "row dropped");
    }

    let batches = aggregate_observations(dataset, normalized.observations);
    let mut series_ids: HashMap<MetricSeries, i64> = HashMap::new();

    for batch in &batches {
        let series_id = match series_ids.get(&batch.series) {
            Some(id) => *id,
            None => match store.resolve_series(&batch.series).await {
                Ok(id) => {
                    series_ids.insert(batch.series.clone(), id);
                    id
                }
                Err(e) => {
                    tracing::error!(series = %batch.series, error = %e, "cannot resolve series");
                    summary.periods_failed += 1;
                    continue;
                }
            },
        };

        match reconcile_period(store, dataset, series_id, batch, as_of, stamp).await {
            Ok(PeriodOutcome::Written { action, forecast }) => {
                if action == UpsertAction::Insert {
                    summary.periods_inserted += 1;
                } else {
                    summary.periods_updated += 1;
                }
                if forecast {
                    summary.forecasts_computed += 1;
                }
            }
            Ok(PeriodOutcome::Skipped(reason)) => {
                tracing::debug!(
                    series = %batch.series,
                    period_key = %batch.period.key,
                    reason = reason.as_str(),
                    "closed period left untouched"
                );
                summary.periods_untouched += 1;
            }
            Err(e) => {
                tracing::error!(
                    series = %batch.series,
                    period_key = %batch.period.key,
                    error = %e,
                    "period reconciliation failed"
                );
                summary.periods_failed += 1;
            }
        }
    }

    tracing::info!(
        dataset = %dataset.name,
        %as_of,
        rows_read = summary.rows_read,
        rows_dropped = summary.rows_dropped,
        inserted = summary.periods_inserted,
        updated = summary.periods_updated,
        untouched = summary.periods_untouched,
        failed = summary.periods_failed,
        "dataset reconciled"
    );
    summary
}

/// Reconcile one period, re-reading and retrying once on a write conflict.
async fn reconcile_period<S: PeriodStore>(
    store: &S,
    dataset: &DatasetConfig,
    series_id: i64,
    batch: &PeriodBatch,
    as_of: NaiveDate,
    stamp: SnapshotStamp,
) -> Result<PeriodOutcome, StoreError> {
    match attempt_period(store, dataset, series_id, batch, as_of, stamp).await {
        Err(StoreError::Conflict { .. }) => {
            tracing::warn!(
                series_id,
                period_key = %batch.period.key,
                "write conflict, retrying once"
            );
            attempt_period(store, dataset, series_id, batch, as_of, stamp).await
        }
        other => other,
    }
}

async fn attempt_period<S: PeriodStore>(
    store: &S,
    dataset: &DatasetConfig,
    series_id: i64,
    batch: &PeriodBatch,
    as_of: NaiveDate,
    stamp: SnapshotStamp,
) -> Result<PeriodOutcome, StoreError> {
    let status = batch.status;
    let existing = store.load_period(series_id, &batch.period.key).await?;

    let update = match PeriodUpdate::plan(
        existing.as_ref(),
        &batch.period,
        status,
        batch.metrics.clone(),
        |metrics| {
            compute_forecast(
                metrics,
                |m| dataset.is_forecastable(m),
                &batch.period,
                as_of,
            )
        },
    ) {
        Ok(update) => update,
        Err(reason) => return Ok(PeriodOutcome::Skipped(reason)),
    };

    let action = update.action;
    let forecast = update.forecast.is_some();
    let write = stamp.write(series_id, batch, update, existing.as_ref());
    store.write_period(&write).await?;

    tracing::debug!(
        series_id,
        period_key = %batch.period.key,
        action = action.as_str(),
        status = %status,
        "period written"
    );
    Ok(PeriodOutcome::Written { action, forecast })
}
