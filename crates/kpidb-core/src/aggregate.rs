//! Folds observations into one metric map per `(series, period)`.

use std::collections::{BTreeMap, BTreeSet};

use crate::datasets::{Aggregation, DatasetConfig};
use crate::period::{Period, PeriodStatus};
use crate::types::{MetricSeries, MetricValues, Observation};

/// Everything a run observed for one `(series, period)`, ready to reconcile.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodBatch {
    pub series: MetricSeries,
    pub period: Period,
    pub status: PeriodStatus,
    pub metrics: MetricValues,
    /// Distinct source lines that contributed at least one metric.
    pub source_row_count: i32,
}

/// Aggregate observations per `(series, period, metric)`.
///
/// Observations are applied in `(row_timestamp, line)` order. `snapshot`
/// metrics keep the last value, `incremental` metrics are summed. The result
/// is sorted by series, then period.
#[must_use]
pub fn aggregate_observations(
    dataset: &DatasetConfig,
    mut observations: Vec<Observation>,
) -> Vec<PeriodBatch> {
    observations.sort_by(|a, b| (a.row_timestamp, a.line).cmp(&(b.row_timestamp, b.line)));

    let mut grouped: BTreeMap<(MetricSeries, Period), Group> = BTreeMap::new();

    for obs in observations {
        let aggregation = dataset.aggregation_for(&obs.metric);
        let status = obs.status;
        let Group { metrics, lines, .. } = grouped
            .entry((obs.series, obs.period))
            .or_insert_with(|| Group {
                status,
                metrics: MetricValues::new(),
                lines: BTreeSet::new(),
            });
        lines.insert(obs.line);
        match aggregation {
            Aggregation::Snapshot => {
                metrics.insert(obs.metric, obs.value);
            }
            Aggregation::Incremental => {
                *metrics.entry(obs.metric).or_insert(0.0) += obs.value;
            }
        }
    }

    grouped
        .into_iter()
        .map(|((series, period), group)| PeriodBatch {
            series,
            period,
            status: group.status,
            metrics: group.metrics,
            source_row_count: i32::try_from(group.lines.len()).unwrap_or(i32::MAX),
        })
        .collect()
}

struct Group {
    status: PeriodStatus,
    metrics: MetricValues,
    lines: BTreeSet<usize>,
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::datasets::{MetricMapping, TimestampRule};
    use crate::period::Granularity;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn budget_dataset() -> DatasetConfig {
        DatasetConfig {
            name: "chiesi_weekly_budget".to_string(),
            sheet: "Chiesi | Weekly Budget".to_string(),
            granularity: Granularity::Week,
            metric_group: Some("budget".to_string()),
            brand: Some("foster".to_string()),
            brand_column: None,
            timestamp: TimestampRule::Date {
                column: "start_date".to_string(),
                formats: vec!["%Y-%m-%d".to_string()],
            },
            metrics: vec![
                MetricMapping {
                    column: "foster_spend".to_string(),
                    metric: "spend".to_string(),
                    brand: None,
                    aggregation: Aggregation::Incremental,
                    forecastable: true,
                },
                MetricMapping {
                    column: "foster_search_delta".to_string(),
                    metric: "search_delta".to_string(),
                    brand: None,
                    aggregation: Aggregation::Snapshot,
                    forecastable: false,
                },
            ],
        }
    }

    fn obs(brand: &str, ts: NaiveDate, line: usize, metric: &str, value: f64) -> Observation {
        Observation {
            series: MetricSeries {
                dataset: "chiesi_weekly_budget".to_string(),
                brand: brand.to_string(),
                metric_group: "budget".to_string(),
            },
            period: Period::containing(ts, Granularity::Week),
            status: PeriodStatus::Open,
            metric: metric.to_string(),
            value,
            row_timestamp: ts,
            line,
        }
    }

    #[test]
    fn snapshot_metric_keeps_latest_row_timestamp() {
        // Line order disagrees with timestamp order; timestamp wins.
        let batches = aggregate_observations(
            &budget_dataset(),
            vec![
                obs("foster", date(2025, 2, 12), 3, "search_delta", 0.4),
                obs("foster", date(2025, 2, 10), 9, "search_delta", 0.1),
            ],
        );

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].metrics["search_delta"], 0.4);
        assert_eq!(batches[0].source_row_count, 2);
    }

    #[test]
    fn snapshot_ties_break_on_source_line() {
        let ts = date(2025, 2, 10);
        let batches = aggregate_observations(
            &budget_dataset(),
            vec![
                obs("foster", ts, 8, "search_delta", 0.8),
                obs("foster", ts, 4, "search_delta", 0.2),
            ],
        );

        assert_eq!(batches[0].metrics["search_delta"], 0.8);
    }

    #[test]
    fn incremental_metric_is_summed() {
        let batches = aggregate_observations(
            &budget_dataset(),
            vec![
                obs("foster", date(2025, 2, 10), 3, "spend", 100.0),
                obs("foster", date(2025, 2, 11), 4, "spend", 50.5),
            ],
        );

        assert!((batches[0].metrics["spend"] - 150.5).abs() < 1e-9);
    }

    #[test]
    fn groups_by_series_and_period() {
        let batches = aggregate_observations(
            &budget_dataset(),
            vec![
                obs("trimbow", date(2025, 2, 10), 3, "spend", 1.0),
                obs("foster", date(2025, 2, 17), 4, "spend", 2.0),
                obs("foster", date(2025, 2, 10), 3, "spend", 3.0),
            ],
        );

        let keys: Vec<_> = batches
            .iter()
            .map(|b| (b.series.brand.as_str(), b.period.key.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("foster", "2025-W07"),
                ("foster", "2025-W08"),
                ("trimbow", "2025-W07"),
            ]
        );
        assert!(batches.iter().all(|b| b.source_row_count == 1));
    }

    #[test]
    fn batch_keeps_the_observed_status() {
        let mut closed = obs("foster", date(2025, 2, 3), 3, "spend", 1.0);
        closed.status = PeriodStatus::Closed;
        let batches = aggregate_observations(
            &budget_dataset(),
            vec![closed, obs("foster", date(2025, 2, 10), 4, "spend", 2.0)],
        );

        assert_eq!(batches[0].status, PeriodStatus::Closed);
        assert_eq!(batches[1].status, PeriodStatus::Open);
    }

    #[test]
    fn empty_input_yields_no_batches() {
        assert!(aggregate_observations(&budget_dataset(), Vec::new()).is_empty());
    }
}
