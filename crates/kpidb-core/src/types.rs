use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::period::{Period, PeriodStatus};

/// Metric name → value. Ordered so serialized records are stable.
pub type MetricValues = BTreeMap<String, f64>;

/// Identity of a group of period records reconciled together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetricSeries {
    pub dataset: String,
    pub brand: String,
    pub metric_group: String,
}

impl std::fmt::Display for MetricSeries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.dataset, self.brand, self.metric_group)
    }
}

/// One data line from a source sheet, keyed by flattened column name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based physical line in the source sheet, for error reporting.
    pub line: usize,
    pub cells: BTreeMap<String, String>,
}

impl RawRow {
    #[must_use]
    pub fn new(line: usize) -> Self {
        Self {
            line,
            cells: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_cell(mut self, column: &str, value: &str) -> Self {
        self.cells.insert(column.to_string(), value.to_string());
        self
    }

    /// Trimmed cell text, or `None` when the column is absent from the row.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells.get(column).map(|v| v.trim())
    }
}

/// A single validated metric value produced by the normalizer.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub series: MetricSeries,
    pub period: Period,
    /// `period` classified against the run's as-of date.
    pub status: PeriodStatus,
    pub metric: String,
    pub value: f64,
    pub row_timestamp: NaiveDate,
    pub line: usize,
}

/// A persisted period record as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodRecord {
    pub series_id: i64,
    pub period: Period,
    pub status: PeriodStatus,
    /// Meaningful for closed records only: `false` means the single
    /// finalize refresh has not happened yet.
    pub finalized: bool,
    pub metrics: MetricValues,
    pub forecast: Option<MetricValues>,
    pub snapshot_date: DateTime<Utc>,
    pub source_row_count: i32,
    pub version: i64,
}
