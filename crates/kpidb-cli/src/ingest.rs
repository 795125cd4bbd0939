//! `kpidb ingest`: one ingestion run per dataset.
//!
//! Each dataset gets its own `ingestion_runs` row, its own run summary, and
//! its own success or failure; a dataset whose sheet cannot be fetched does
//! not stop the others.

use std::path::PathBuf;

use chrono::{NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use kpidb_core::{AppConfig, ConfigError, DatasetConfig, DatasetsFile, SnapshotStamp};
use kpidb_db::{NewIngestionRun, PgPeriodStore};
use kpidb_ingest::{run_ingestion, MemoryStore, RunSummary};
use kpidb_sheets::{FetchSettings, SheetFetcher, SheetSource};

pub(crate) struct IngestOptions<'a> {
    pub dataset: Option<&'a str>,
    pub source: &'a SheetSource,
    pub as_of: NaiveDate,
}

/// Build the sheet source from the mutually exclusive `--file` / `--gsheet-id`.
pub(crate) fn sheet_source(
    file: Option<PathBuf>,
    gsheet_id: Option<String>,
) -> anyhow::Result<SheetSource> {
    match (file, gsheet_id) {
        (Some(dir), None) => Ok(SheetSource::Directory(dir)),
        (None, Some(spreadsheet_id)) => Ok(SheetSource::GoogleSheet { spreadsheet_id }),
        _ => anyhow::bail!("exactly one of --file or --gsheet-id is required"),
    }
}

/// The named dataset, or every configured dataset when `name` is `None`.
pub(crate) fn select_datasets<'a>(
    file: &'a DatasetsFile,
    name: Option<&str>,
) -> Result<Vec<&'a DatasetConfig>, ConfigError> {
    match name {
        Some(name) => Ok(vec![file.find(name)?]),
        None => Ok(file.datasets.iter().collect()),
    }
}

/// Ingest against the database, recording an ingestion run per dataset.
///
/// # Errors
///
/// Returns an error if configuration is invalid or if any dataset's run
/// failed; successful datasets are committed either way.
pub(crate) async fn run_ingest(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    options: &IngestOptions<'_>,
) -> anyhow::Result<()> {
    let datasets_file = kpidb_core::load_datasets(&config.datasets_path)?;
    let datasets = select_datasets(&datasets_file, options.dataset)?;
    let fetcher = SheetFetcher::new(&FetchSettings::from_app_config(config))?;
    let max_concurrent = config.max_concurrent_datasets.max(1);

    let results: Vec<(&DatasetConfig, anyhow::Result<RunSummary>)> = stream::iter(datasets)
        .map(|dataset| {
            let fut = ingest_dataset(pool, &fetcher, options, dataset);
            async move { (dataset, fut.await) }
        })
        .buffer_unordered(max_concurrent)
        .collect()
        .await;

    report(&results, options, false)
}

/// Ingest into a fresh in-memory store; the database is never touched.
///
/// # Errors
///
/// Returns an error if configuration is invalid or any dataset's sheet could
/// not be read.
pub(crate) async fn run_ingest_dry(
    config: &AppConfig,
    options: &IngestOptions<'_>,
) -> anyhow::Result<()> {
    let datasets_file = kpidb_core::load_datasets(&config.datasets_path)?;
    let datasets = select_datasets(&datasets_file, options.dataset)?;
    let fetcher = SheetFetcher::new(&FetchSettings::from_app_config(config))?;

    let mut results = Vec::with_capacity(datasets.len());
    for dataset in datasets {
        let store = MemoryStore::new();
        let stamp = SnapshotStamp::new(Utc::now(), None);
        let outcome = run_ingestion(
            &store,
            &fetcher,
            options.source,
            dataset,
            options.as_of,
            stamp,
        )
        .await
        .map_err(anyhow::Error::from);
        results.push((dataset, outcome));
    }

    report(&results, options, true)
}

async fn ingest_dataset(
    pool: &sqlx::PgPool,
    fetcher: &SheetFetcher,
    options: &IngestOptions<'_>,
    dataset: &DatasetConfig,
) -> anyhow::Result<RunSummary> {
    let run = kpidb_db::create_ingestion_run(
        pool,
        NewIngestionRun {
            dataset: &dataset.name,
            trigger_source: "cli",
            as_of_date: options.as_of,
        },
    )
    .await?;
    if let Err(e) = kpidb_db::start_ingestion_run(pool, run.id).await {
        crate::fail_run_best_effort(pool, run.id, &format!("{e:#}"), None).await;
        return Err(e.into());
    }

    let store = PgPeriodStore::new(pool.clone());
    let stamp = SnapshotStamp::new(Utc::now(), Some(run.id));

    match run_ingestion(&store, fetcher, options.source, dataset, options.as_of, stamp).await {
        Ok(summary) => {
            let summary_json = serde_json::to_value(&summary)?;
            if let Err(err) =
                kpidb_db::complete_ingestion_run(pool, run.id, &summary_json, summary.source_date)
                    .await
            {
                crate::fail_run_best_effort(pool, run.id, &format!("{err:#}"), Some(&summary_json))
                    .await;
                return Err(err.into());
            }
            Ok(summary)
        }
        Err(err) => {
            let details = serde_json::json!({ "error_kind": err.kind() });
            crate::fail_run_best_effort(pool, run.id, &format!("{err:#}"), Some(&details)).await;
            Err(err.into())
        }
    }
}

fn report(
    results: &[(&DatasetConfig, anyhow::Result<RunSummary>)],
    options: &IngestOptions<'_>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let prefix = if dry_run { "dry-run: " } else { "" };
    let mut total = RunSummary::new("total", options.as_of);
    let mut failed_datasets = 0usize;

    for (dataset, outcome) in results {
        match outcome {
            Ok(summary) => {
                println!("{prefix}{summary}");
                total.absorb(summary);
            }
            Err(e) => {
                tracing::error!(dataset = %dataset.name, error = %e, "dataset ingestion failed");
                println!("{prefix}{}: failed: {e:#}", dataset.name);
                failed_datasets += 1;
            }
        }
    }

    if results.len() > 1 {
        println!("{prefix}{total}");
    }

    if failed_datasets > 0 {
        anyhow::bail!(
            "{failed_datasets} of {} datasets failed (source {})",
            results.len(),
            options.source
        );
    }
    Ok(())
}
