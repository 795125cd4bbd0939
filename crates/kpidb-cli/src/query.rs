//! Read-only commands: configured datasets, runs, periods and period history.

use chrono::{DateTime, NaiveDate, Utc};
use kpidb_core::{AppConfig, MetricValues, TimestampRule};

/// Format an optional date for display, returning `"—"` when `None`.
fn fmt_date(date: Option<NaiveDate>) -> String {
    date.map_or_else(
        || "\u{2014}".to_string(),
        |d| d.format("%Y-%m-%d").to_string(),
    )
}

fn fmt_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map_or_else(
        || "\u{2014}".to_string(),
        |t| t.format("%Y-%m-%d %H:%M").to_string(),
    )
}

/// Render metric values as `name=value` pairs in name order.
pub(crate) fn fmt_metrics(metrics: &MetricValues) -> String {
    if metrics.is_empty() {
        return "\u{2014}".to_string();
    }
    metrics
        .iter()
        .map(|(name, value)| format!("{name}={value:.2}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// List the datasets in the configured datasets file.
///
/// # Errors
///
/// Returns an error if the datasets file cannot be loaded.
pub(crate) fn run_datasets(config: &AppConfig) -> anyhow::Result<()> {
    let file = kpidb_core::load_datasets(&config.datasets_path)?;

    println!(
        "{:<28}{:<8}{:<20}{:<14}SHEET",
        "DATASET", "GRAIN", "METRIC GROUP", "TIMESTAMP"
    );
    for dataset in &file.datasets {
        let timestamp = match &dataset.timestamp {
            TimestampRule::Date { column, .. } => format!("date:{column}"),
            TimestampRule::PeriodNumber { column, year } => match year {
                Some(year) => format!("{column}@{year}"),
                None => format!("{column}@as-of"),
            },
        };
        println!(
            "{:<28}{:<8}{:<20}{:<14}{}",
            dataset.name,
            dataset.granularity.as_str(),
            dataset.metric_group(),
            timestamp,
            dataset.sheet
        );
    }

    Ok(())
}

/// Show the most recent ingestion runs.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub(crate) async fn run_runs(pool: &sqlx::PgPool, limit: i64) -> anyhow::Result<()> {
    let runs = kpidb_db::list_ingestion_runs(pool, limit).await?;

    if runs.is_empty() {
        println!("no ingestion runs yet; run `kpidb ingest` first");
        return Ok(());
    }

    println!(
        "{:<7}{:<28}{:<11}{:<12}{:<12}{:<18}DETAIL",
        "ID", "DATASET", "STATUS", "AS OF", "SOURCE", "COMPLETED"
    );
    for run in &runs {
        let detail = run
            .error_message
            .clone()
            .or_else(|| {
                run.summary.as_ref().map(|s| {
                    format!(
                        "written {}, failed {}",
                        s["periods_inserted"].as_u64().unwrap_or(0)
                            + s["periods_updated"].as_u64().unwrap_or(0),
                        s["periods_failed"].as_u64().unwrap_or(0)
                    )
                })
            })
            .unwrap_or_default();
        println!(
            "{:<7}{:<28}{:<11}{:<12}{:<12}{:<18}{}",
            run.id,
            run.dataset,
            run.status,
            fmt_date(Some(run.as_of_date)),
            fmt_date(run.source_date),
            fmt_timestamp(run.completed_at),
            detail
        );
    }

    Ok(())
}

/// Show stored period records for `dataset`, newest period first.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub(crate) async fn run_periods(
    pool: &sqlx::PgPool,
    dataset: &str,
    brand: Option<&str>,
    limit: i64,
) -> anyhow::Result<()> {
    let records = kpidb_db::list_period_records(pool, dataset, brand, limit).await?;

    if records.is_empty() {
        println!(
            "no periods stored for {dataset}{}",
            brand.map(|b| format!(" / {b}")).unwrap_or_default()
        );
        return Ok(());
    }

    println!(
        "{:<12}{:<10}{:<8}{:<4}{:<5}METRICS / FORECAST",
        "BRAND", "PERIOD", "STATUS", "FIN", "VER"
    );
    for record in &records {
        println!(
            "{:<12}{:<10}{:<8}{:<4}{:<5}{}",
            record.brand,
            record.period_key,
            record.status,
            if record.finalized { "yes" } else { "no" },
            record.version,
            fmt_metrics(&record.metrics.0)
        );
        if let Some(forecast) = &record.forecast {
            println!("{:<39}forecast: {}", "", fmt_metrics(&forecast.0));
        }
    }

    Ok(())
}

/// Show every write of one period, oldest first.
///
/// # Errors
///
/// Returns an error if the series is unknown or the database query fails.
pub(crate) async fn run_history(
    pool: &sqlx::PgPool,
    dataset: &str,
    brand: &str,
    period_key: &str,
) -> anyhow::Result<()> {
    let series = kpidb_db::list_metric_series(pool, dataset)
        .await?
        .into_iter()
        .find(|s| s.brand == brand)
        .ok_or_else(|| {
            anyhow::anyhow!("no series for brand '{brand}' in dataset '{dataset}'; run `kpidb ingest` first")
        })?;

    let snapshots = kpidb_db::list_period_snapshots(pool, series.id, period_key).await?;
    if snapshots.is_empty() {
        println!("no writes recorded for {dataset} / {brand} / {period_key}");
        return Ok(());
    }

    println!("{dataset} / {brand} / {period_key}");
    println!();
    println!(
        "{:<5}{:<8}{:<4}{:<18}{:<6}METRICS",
        "VER", "STATUS", "FIN", "SNAPSHOT", "RUN"
    );
    for snapshot in &snapshots {
        println!(
            "{:<5}{:<8}{:<4}{:<18}{:<6}{}",
            snapshot.version,
            snapshot.status,
            if snapshot.finalized { "yes" } else { "no" },
            fmt_timestamp(Some(snapshot.snapshot_date)),
            snapshot
                .ingestion_run_id
                .map_or_else(|| "\u{2014}".to_string(), |id| id.to_string()),
            fmt_metrics(&snapshot.metrics.0)
        );
    }

    Ok(())
}
