//! Sheet layout: header detection, brand/metric header flattening, and the
//! "last updated" date some sheets carry above the table.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::NaiveDate;
use kpidb_core::{clean_identifier, RawRow};
use regex::Regex;

use crate::error::SheetError;
use crate::grid::GridRow;

/// First-cell values that mark the header row.
const HEADER_MARKERS: &[&str] = &["week", "month", "period", "date"];

/// Columns that identify the row rather than a brand metric.
const KEY_COLUMNS: &[&str] = &["period", "start_date", "end_date"];

/// Rows above the header searched for a source date.
const SOURCE_DATE_ROWS: usize = 2;

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2})").expect("valid regex"));
static EURO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2}/\d{2}/\d{4})").expect("valid regex"));

/// A sheet reduced to named columns and data rows.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetTable {
    pub sheet: String,
    /// Date found in the first cells above the table, if any.
    pub source_date: Option<NaiveDate>,
    /// Flattened column names in sheet order; unnamed and duplicate columns
    /// are dropped.
    pub columns: Vec<String>,
    pub rows: Vec<RawRow>,
}

/// Lay out a raw grid read from `sheet`.
///
/// # Errors
///
/// Returns [`SheetError::HeaderNotFound`] when no row starts with a header marker.
pub fn parse_sheet(sheet: &str, grid: &[GridRow]) -> Result<SheetTable, SheetError> {
    let header_idx =
        find_header_row(grid).ok_or_else(|| SheetError::HeaderNotFound(sheet.to_string()))?;

    let brands = brand_row(grid, header_idx);
    let names = flatten_columns(&grid[header_idx].cells, brands.as_deref());

    // Keep the first occurrence of every usable name.
    let mut seen = HashSet::new();
    let indexed: Vec<(usize, String)> = names
        .into_iter()
        .enumerate()
        .filter(|(_, name)| !name.is_empty() && seen.insert(name.clone()))
        .collect();

    let rows: Vec<RawRow> = grid[header_idx + 1..]
        .iter()
        .filter(|grid_row| grid_row.has_values())
        .map(|grid_row| {
            let mut row = RawRow::new(grid_row.line);
            for (col, name) in &indexed {
                let value = grid_row.cells.get(*col).map_or("", String::as_str);
                row = row.with_cell(name, value);
            }
            row
        })
        .collect();

    let source_date = extract_source_date(&grid[..header_idx.min(SOURCE_DATE_ROWS)]);

    tracing::debug!(
        sheet,
        header_line = grid[header_idx].line,
        multi_header = brands.is_some(),
        columns = indexed.len(),
        rows = rows.len(),
        "sheet layout resolved"
    );

    Ok(SheetTable {
        sheet: sheet.to_string(),
        source_date,
        columns: indexed.into_iter().map(|(_, name)| name).collect(),
        rows,
    })
}

/// Index of the first row whose first cell is a header marker.
#[must_use]
pub fn find_header_row(grid: &[GridRow]) -> Option<usize> {
    grid.iter().position(|row| {
        row.cells
            .first()
            .is_some_and(|cell| HEADER_MARKERS.contains(&cell.trim().to_lowercase().as_str()))
    })
}

/// Search the first cells of `rows` for an ISO or day-first date.
#[must_use]
pub fn extract_source_date(rows: &[GridRow]) -> Option<NaiveDate> {
    let text = rows
        .iter()
        .filter_map(|row| row.cells.first())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ");

    if let Some(found) = ISO_DATE.captures(&text).and_then(|c| c.get(1)) {
        if let Ok(date) = NaiveDate::parse_from_str(found.as_str(), "%Y-%m-%d") {
            return Some(date);
        }
    }
    EURO_DATE
        .captures(&text)
        .and_then(|c| c.get(1))
        .and_then(|found| NaiveDate::parse_from_str(found.as_str(), "%d/%m/%Y").ok())
}

/// The forward-filled brand row above the header, when the sheet has one.
///
/// The row above counts as a brand row if it sits on the physical line right
/// above the header, has at least one non-empty cell, carries no date, and is
/// not a copy of the header itself.
fn brand_row(grid: &[GridRow], header_idx: usize) -> Option<Vec<String>> {
    let upper = grid.get(header_idx.checked_sub(1)?)?;
    let header = &grid[header_idx];
    if upper.line + 1 != header.line || !upper.has_values() {
        return None;
    }

    let dated = upper
        .cells
        .iter()
        .any(|c| ISO_DATE.is_match(c) || EURO_DATE.is_match(c));
    let differs = upper.cells.len() != header.cells.len()
        || upper.cells.iter().zip(&header.cells).any(|(u, h)| u != h);
    if dated || !differs {
        return None;
    }

    let (upper, header) = (&upper.cells, &header.cells);

    let mut last = String::new();
    Some(
        (0..header.len())
            .map(|i| {
                let cell = upper.get(i).map_or("", |c| c.trim());
                if !cell.is_empty() {
                    last = cell.to_string();
                }
                last.clone()
            })
            .collect(),
    )
}

/// Turn header cells (and optional brand cells) into column names.
///
/// Names are slug-cleaned; the words `week` and `month` become `period`,
/// and a bare `start` or `end` gains a `_date` suffix. Key columns are
/// never brand-prefixed; every other column becomes `<brand>_<metric>`.
#[must_use]
pub fn flatten_columns(header: &[String], brands: Option<&[String]>) -> Vec<String> {
    header
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            let metric = standardize(&clean_identifier(cell));
            if metric.is_empty() || KEY_COLUMNS.contains(&metric.as_str()) {
                return metric;
            }
            let brand = brands
                .and_then(|b| b.get(i))
                .map(|b| clean_identifier(b))
                .unwrap_or_default();
            if brand.is_empty() || metric.starts_with(&format!("{brand}_")) {
                metric
            } else {
                format!("{brand}_{metric}")
            }
        })
        .collect()
}

fn standardize(name: &str) -> String {
    let parts: Vec<&str> = name.split('_').collect();
    parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            let dated = parts.get(i + 1) == Some(&"date");
            match *part {
                "week" | "month" => "period",
                "start" if !dated => "start_date",
                "end" if !dated => "end_date",
                other => other,
            }
        })
        .collect::<Vec<_>>()
        .join("_")
}
