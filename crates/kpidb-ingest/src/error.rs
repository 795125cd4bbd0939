use kpidb_core::ConfigError;
use kpidb_sheets::SheetError;
use thiserror::Error;

/// Run-level failures. Per-row and per-period problems never surface here;
/// they are counted in the [`crate::RunSummary`].
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("failed to fetch sheet '{sheet}' for dataset '{dataset}': {source}")]
    SourceFetch {
        dataset: String,
        sheet: String,
        #[source]
        source: SheetError,
    },
}

impl IngestError {
    /// Short machine-readable error kind for run records and summaries.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Configuration(_) => "configuration",
            IngestError::SourceFetch { .. } => "source_fetch",
        }
    }
}
