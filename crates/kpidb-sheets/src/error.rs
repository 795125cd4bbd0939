use thiserror::Error;

/// Errors raised while fetching or laying out a sheet.
#[derive(Debug, Error)]
pub enum SheetError {
    /// Network or TLS failure, or a non-2xx response.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in sheet '{sheet}': {source}")]
    Csv {
        sheet: String,
        #[source]
        source: csv::Error,
    },

    /// The export endpoint answered with a login page instead of CSV.
    #[error("sheet '{0}' is not link-shared (received HTML instead of CSV)")]
    NotShared(String),

    #[error("sheet '{0}' has no header row (first cell Week/Month/Period/Date)")]
    HeaderNotFound(String),

    #[error("invalid sheet source: {0}")]
    InvalidSource(String),
}
