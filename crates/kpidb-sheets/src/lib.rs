//! Spreadsheet source adapter.
//!
//! Reads the raw cell grid of one sheet (a local CSV export or a link-shared
//! Google Sheet), locates the header row, flattens brand/metric two-row
//! headers, and hands back [`kpidb_core::RawRow`]s for the normalizer.

pub mod error;
pub mod grid;
pub mod layout;
pub(crate) mod retry;
pub mod source;

pub use error::SheetError;
pub use grid::{read_grid, GridRow};
pub use layout::{flatten_columns, parse_sheet, SheetTable};
pub use source::{FetchSettings, SheetFetcher, SheetSource};
