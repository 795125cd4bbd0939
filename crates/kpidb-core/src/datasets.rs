use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::period::Granularity;
use crate::ConfigError;

/// How repeated observations of one metric within a period are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Last value in row-timestamp order wins.
    #[default]
    Snapshot,
    /// Values are summed.
    Incremental,
}

/// Where a row's period-derivable timestamp comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimestampRule {
    /// A date column parsed with the first matching `chrono` format.
    Date {
        column: String,
        #[serde(default = "default_date_formats")]
        formats: Vec<String>,
    },
    /// An ISO week or month number column. Without a pinned `year` the
    /// number belongs to the run date's year (ISO week-year for weeks).
    PeriodNumber {
        column: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        year: Option<i32>,
    },
}

impl TimestampRule {
    #[must_use]
    pub fn column(&self) -> &str {
        match self {
            TimestampRule::Date { column, .. } | TimestampRule::PeriodNumber { column, .. } => {
                column
            }
        }
    }
}

fn default_date_formats() -> Vec<String> {
    vec![
        "%Y-%m-%d".to_string(),
        "%d/%m/%Y".to_string(),
        "%Y/%m/%d".to_string(),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricMapping {
    /// Flattened source column name (e.g. `foster_sessions`).
    pub column: String,
    /// Metric name stored in the record (e.g. `sessions`).
    pub metric: String,
    /// Overrides the dataset's brand resolution for this column.
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub aggregation: Aggregation,
    #[serde(default)]
    pub forecastable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub name: String,
    /// Sheet (tab) name in the source spreadsheet.
    pub sheet: String,
    pub granularity: Granularity,
    #[serde(default)]
    pub metric_group: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub brand_column: Option<String>,
    pub timestamp: TimestampRule,
    pub metrics: Vec<MetricMapping>,
}

impl DatasetConfig {
    /// Metric group shared by every series in this dataset; defaults to the dataset name.
    #[must_use]
    pub fn metric_group(&self) -> &str {
        self.metric_group.as_deref().unwrap_or(&self.name)
    }

    #[must_use]
    pub fn is_forecastable(&self, metric: &str) -> bool {
        self.metrics
            .iter()
            .any(|m| m.metric == metric && m.forecastable)
    }

    #[must_use]
    pub fn aggregation_for(&self, metric: &str) -> Aggregation {
        self.metrics
            .iter()
            .find(|m| m.metric == metric)
            .map_or(Aggregation::Snapshot, |m| m.aggregation)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetsFile {
    pub datasets: Vec<DatasetConfig>,
}

impl DatasetsFile {
    /// Look up a dataset by name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownDataset`] when no dataset has that name.
    pub fn find(&self, name: &str) -> Result<&DatasetConfig, ConfigError> {
        self.datasets
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| ConfigError::UnknownDataset(name.to_string()))
    }
}

/// Load and validate the dataset definitions from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_datasets(path: &Path) -> Result<DatasetsFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::DatasetsFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_datasets(&content)
}

/// Parse and validate dataset definitions from YAML text.
///
/// # Errors
///
/// Returns `ConfigError` if the YAML is malformed or fails validation.
pub fn parse_datasets(content: &str) -> Result<DatasetsFile, ConfigError> {
    let file: DatasetsFile = serde_yaml::from_str(content)?;
    validate_datasets(&file)?;
    Ok(file)
}

fn validate_datasets(file: &DatasetsFile) -> Result<(), ConfigError> {
    if file.datasets.is_empty() {
        return Err(ConfigError::Validation(
            "at least one dataset must be configured".to_string(),
        ));
    }

    let mut seen_names = HashSet::new();
    for dataset in &file.datasets {
        if dataset.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "dataset name must be non-empty".to_string(),
            ));
        }
        if !seen_names.insert(dataset.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate dataset name: '{}'",
                dataset.name
            )));
        }
        validate_dataset(dataset)?;
    }

    Ok(())
}

fn validate_dataset(dataset: &DatasetConfig) -> Result<(), ConfigError> {
    let name = &dataset.name;

    if dataset.sheet.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "dataset '{name}' has an empty sheet name"
        )));
    }

    if dataset.metrics.is_empty() {
        return Err(ConfigError::Validation(format!(
            "dataset '{name}' must map at least one metric"
        )));
    }

    match &dataset.timestamp {
        TimestampRule::Date { formats, .. } if formats.is_empty() => {
            return Err(ConfigError::Validation(format!(
                "dataset '{name}' date timestamp needs at least one format"
            )));
        }
        TimestampRule::PeriodNumber {
            year: Some(year), ..
        } if !(1970..=9999).contains(year) => {
            return Err(ConfigError::Validation(format!(
                "dataset '{name}' has implausible period year {year}"
            )));
        }
        _ => {}
    }

    let mut seen_columns = HashSet::new();
    let mut aggregations: HashMap<&str, Aggregation> = HashMap::new();

    for mapping in &dataset.metrics {
        if mapping.metric.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "dataset '{name}' column '{}' has an empty metric name",
                mapping.column
            )));
        }

        if !seen_columns.insert(mapping.column.as_str()) {
            return Err(ConfigError::Validation(format!(
                "dataset '{name}' maps column '{}' more than once",
                mapping.column
            )));
        }

        if mapping.column == dataset.timestamp.column() {
            return Err(ConfigError::Validation(format!(
                "dataset '{name}' uses timestamp column '{}' as a metric",
                mapping.column
            )));
        }

        let has_brand = mapping.brand.is_some()
            || dataset.brand_column.is_some()
            || dataset.brand.is_some();
        if !has_brand {
            return Err(ConfigError::Validation(format!(
                "dataset '{name}' column '{}' resolves no brand; set `brand` on the metric or dataset, or `brand_column`",
                mapping.column
            )));
        }

        if let Some(previous) = aggregations.insert(&mapping.metric, mapping.aggregation) {
            if previous != mapping.aggregation {
                return Err(ConfigError::Validation(format!(
                    "dataset '{name}' metric '{}' has conflicting aggregation rules",
                    mapping.metric
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "datasets_test.rs"]
mod tests;
