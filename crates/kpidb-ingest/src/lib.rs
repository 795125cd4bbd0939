//! Ingestion pipeline: fetch a sheet, normalize its rows, and reconcile the
//! resulting periods into a [`kpidb_core::PeriodStore`].

pub mod error;
pub mod memory;
pub mod pipeline;
pub mod summary;

pub use error::IngestError;
pub use memory::MemoryStore;
pub use pipeline::{reconcile_rows, run_ingestion};
pub use summary::RunSummary;
