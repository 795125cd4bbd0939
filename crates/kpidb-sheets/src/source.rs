//! Where sheets come from and how they are fetched.

use std::path::PathBuf;
use std::time::Duration;

use kpidb_core::AppConfig;
use reqwest::{Client, Url};

use crate::error::SheetError;
use crate::grid::read_grid;
use crate::layout::{parse_sheet, SheetTable};
use crate::retry::retry_with_backoff;

/// Origin of the sheets for one ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetSource {
    /// A directory of CSV exports named `<sheet>.csv`.
    Directory(PathBuf),
    /// A link-shared Google Sheet read through its CSV export endpoint.
    GoogleSheet { spreadsheet_id: String },
}

impl std::fmt::Display for SheetSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SheetSource::Directory(path) => write!(f, "dir:{}", path.display()),
            SheetSource::GoogleSheet { spreadsheet_id } => write!(f, "gsheet:{spreadsheet_id}"),
        }
    }
}

/// HTTP settings for [`SheetFetcher`].
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub max_retries: u32,
    pub retry_backoff_base_ms: u64,
}

impl FetchSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.sheets_base_url.clone(),
            timeout_secs: config.source_request_timeout_secs,
            user_agent: config.source_user_agent.clone(),
            max_retries: config.source_max_retries,
            retry_backoff_base_ms: config.source_retry_backoff_base_ms,
        }
    }
}

/// Reads sheets from a [`SheetSource`] and lays them out.
pub struct SheetFetcher {
    client: Client,
    base_url: Url,
    max_retries: u32,
    retry_backoff_base_ms: u64,
}

impl SheetFetcher {
    /// # Errors
    ///
    /// Returns [`SheetError::Http`] if the `reqwest::Client` cannot be built,
    /// or [`SheetError::InvalidSource`] if the base URL does not parse.
    pub fn new(settings: &FetchSettings) -> Result<Self, SheetError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(settings.user_agent.as_str())
            .build()?;

        let normalised = format!("{}/", settings.base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| {
            SheetError::InvalidSource(format!("invalid base URL '{}': {e}", settings.base_url))
        })?;

        Ok(Self {
            client,
            base_url,
            max_retries: settings.max_retries,
            retry_backoff_base_ms: settings.retry_backoff_base_ms,
        })
    }

    /// CSV export URL for one tab of a spreadsheet.
    ///
    /// # Errors
    ///
    /// Returns [`SheetError::InvalidSource`] for an empty or path-like id.
    pub fn export_url(&self, spreadsheet_id: &str, sheet: &str) -> Result<Url, SheetError> {
        let id = spreadsheet_id.trim();
        if id.is_empty() || id.contains('/') {
            return Err(SheetError::InvalidSource(format!(
                "invalid spreadsheet id '{spreadsheet_id}'"
            )));
        }
        let mut url = self
            .base_url
            .join(&format!("spreadsheets/d/{id}/gviz/tq"))
            .map_err(|e| SheetError::InvalidSource(format!("cannot build export URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("tqx", "out:csv")
            .append_pair("headers", "0")
            .append_pair("sheet", sheet);
        Ok(url)
    }

    /// Fetch and lay out `sheet` from `source`.
    ///
    /// # Errors
    ///
    /// Returns a [`SheetError`] if the sheet cannot be read, is not valid CSV,
    /// or has no header row.
    pub async fn fetch_table(
        &self,
        source: &SheetSource,
        sheet: &str,
    ) -> Result<SheetTable, SheetError> {
        let body = match source {
            SheetSource::Directory(dir) => {
                let path = dir.join(format!("{sheet}.csv"));
                tokio::fs::read(&path).await.map_err(|e| SheetError::Io {
                    path: path.display().to_string(),
                    source: e,
                })?
            }
            SheetSource::GoogleSheet { spreadsheet_id } => {
                let url = self.export_url(spreadsheet_id, sheet)?;
                retry_with_backoff(self.max_retries, self.retry_backoff_base_ms, || {
                    self.request_csv(&url, sheet)
                })
                .await?
            }
        };

        let grid = read_grid(body.as_slice()).map_err(|e| SheetError::Csv {
            sheet: sheet.to_string(),
            source: e,
        })?;
        let table = parse_sheet(sheet, &grid)?;

        tracing::info!(
            %source,
            sheet,
            rows = table.rows.len(),
            source_date = ?table.source_date,
            "sheet fetched"
        );
        Ok(table)
    }

    async fn request_csv(&self, url: &Url, sheet: &str) -> Result<Vec<u8>, SheetError> {
        let response = self.client.get(url.clone()).send().await?;
        let response = response.error_for_status()?;
        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/html"));
        if is_html {
            return Err(SheetError::NotShared(sheet.to_string()));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher(base_url: &str) -> SheetFetcher {
        SheetFetcher::new(&FetchSettings {
            base_url: base_url.to_string(),
            timeout_secs: 5,
            user_agent: "kpidb-test".to_string(),
            max_retries: 0,
            retry_backoff_base_ms: 0,
        })
        .expect("fetcher construction should not fail")
    }

    #[test]
    fn export_url_encodes_sheet_name() {
        let url = fetcher("https://docs.google.com/")
            .export_url("abc123", "Chiesi | Weekly Sessions")
            .unwrap();
        assert!(url
            .as_str()
            .starts_with("https://docs.google.com/spreadsheets/d/abc123/gviz/tq?tqx=out%3Acsv&headers=0&sheet="));
        assert!(url.as_str().ends_with("sheet=Chiesi+%7C+Weekly+Sessions"));
    }

    #[test]
    fn export_url_rejects_path_like_id() {
        let err = fetcher("https://docs.google.com")
            .export_url("../etc", "s")
            .unwrap_err();
        assert!(matches!(err, SheetError::InvalidSource(_)));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let result = SheetFetcher::new(&FetchSettings {
            base_url: "not a url".to_string(),
            timeout_secs: 5,
            user_agent: "kpidb-test".to_string(),
            max_retries: 0,
            retry_backoff_base_ms: 0,
        });
        assert!(matches!(result, Err(SheetError::InvalidSource(_))));
    }

    #[test]
    fn source_display_names_kind() {
        let source = SheetSource::GoogleSheet {
            spreadsheet_id: "abc".to_string(),
        };
        assert_eq!(source.to_string(), "gsheet:abc");
    }
}
