//! Domain types and pure reconciliation logic for kpidb.
//!
//! Everything here is free of I/O apart from configuration loading: the
//! normalizer, period classifier, forecast calculator, and the upsert state
//! machine are plain functions so the ingest pipeline and the database layer
//! can share them.

pub mod aggregate;
pub mod app_config;
pub mod config;
pub mod datasets;
pub mod forecast;
pub mod normalize;
pub mod period;
pub mod reconcile;
pub mod snapshot;
pub mod store;
pub mod types;

use thiserror::Error;

pub use aggregate::{aggregate_observations, PeriodBatch};
pub use app_config::AppConfig;
pub use config::{load_app_config, load_app_config_from_env};
pub use datasets::{
    load_datasets, parse_datasets, Aggregation, DatasetConfig, DatasetsFile, MetricMapping,
    TimestampRule,
};
pub use forecast::{compute_forecast, elapsed_fraction};
pub use normalize::{
    clean_identifier, normalize_rows, parse_date, parse_number, NormalizedBatch, ValidationError,
};
pub use period::{classify, Granularity, Period, PeriodStatus};
pub use reconcile::{plan_upsert, PeriodState, PeriodUpdate, SkipReason, UpsertAction};
pub use snapshot::SnapshotStamp;
pub use store::{PeriodStore, PeriodWrite, StoreError};
pub use types::{MetricSeries, MetricValues, Observation, PeriodRecord, RawRow};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read datasets file {path}: {source}")]
    DatasetsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse datasets file: {0}")]
    DatasetsFileParse(#[from] serde_yaml::Error),

    #[error("dataset configuration invalid: {0}")]
    Validation(String),

    #[error("dataset '{0}' is not configured")]
    UnknownDataset(String),
}
