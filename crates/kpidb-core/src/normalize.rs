//! Row normalization: turns loosely typed sheet rows into validated
//! [`Observation`]s.
//!
//! A row either yields all of its observations or is rejected as a whole with
//! a [`ValidationError`]. Rejections are collected, never fatal.

use chrono::{Datelike, NaiveDate};
use thiserror::Error;

use crate::datasets::{DatasetConfig, TimestampRule};
use crate::period::{classify, Granularity};
use crate::types::{MetricSeries, Observation, RawRow};

/// Cell contents treated as "no value observed yet".
const PLACEHOLDERS: &[&str] = &["-", "\u{2014}", "n/a", "na", "nd"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("line {line}: missing required column '{column}'")]
    MissingColumn { line: usize, column: String },

    #[error("line {line}: required column '{column}' is empty")]
    EmptyValue { line: usize, column: String },

    #[error("line {line}: cannot parse '{value}' in column '{column}' as a date")]
    InvalidDate {
        line: usize,
        column: String,
        value: String,
    },

    #[error("line {line}: cannot parse '{value}' in column '{column}' as a number")]
    InvalidNumber {
        line: usize,
        column: String,
        value: String,
    },

    #[error("line {line}: {value} is not a valid {granularity} number for {year}")]
    PeriodOutOfRange {
        line: usize,
        value: String,
        granularity: Granularity,
        year: i32,
    },
}

/// Output of [`normalize_rows`].
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub observations: Vec<Observation>,
    pub rows_read: usize,
    pub rejected: Vec<ValidationError>,
}

impl NormalizedBatch {
    #[must_use]
    pub fn rows_dropped(&self) -> usize {
        self.rejected.len()
    }
}

/// Validate `rows` against `dataset` and emit one observation per non-empty metric cell.
///
/// `as_of` supplies the year for period-number timestamps that do not pin one.
#[must_use]
pub fn normalize_rows(dataset: &DatasetConfig, rows: &[RawRow], as_of: NaiveDate) -> NormalizedBatch {
    let mut batch = NormalizedBatch {
        rows_read: rows.len(),
        ..NormalizedBatch::default()
    };

    for row in rows {
        match normalize_row(dataset, row, as_of) {
            Ok(observations) => batch.observations.extend(observations),
            Err(err) => batch.rejected.push(err),
        }
    }

    batch
}

fn normalize_row(
    dataset: &DatasetConfig,
    row: &RawRow,
    as_of: NaiveDate,
) -> Result<Vec<Observation>, ValidationError> {
    let row_timestamp = row_timestamp(dataset, row, as_of)?;
    let (period, status) = classify(row_timestamp, dataset.granularity, as_of);

    let row_brand = match &dataset.brand_column {
        Some(column) => Some(clean_identifier(required_cell(row, column)?)),
        None => None,
    };

    let mut observations = Vec::with_capacity(dataset.metrics.len());
    for mapping in &dataset.metrics {
        let raw = row
            .get(&mapping.column)
            .ok_or_else(|| ValidationError::MissingColumn {
                line: row.line,
                column: mapping.column.clone(),
            })?;

        if is_unobserved(raw) {
            continue;
        }

        let value = parse_number(raw).ok_or_else(|| ValidationError::InvalidNumber {
            line: row.line,
            column: mapping.column.clone(),
            value: raw.to_string(),
        })?;

        // Config validation guarantees one of the three sources is present.
        let brand = mapping
            .brand
            .as_deref()
            .map(clean_identifier)
            .or_else(|| row_brand.clone())
            .or_else(|| dataset.brand.as_deref().map(clean_identifier))
            .unwrap_or_default();

        observations.push(Observation {
            series: MetricSeries {
                dataset: dataset.name.clone(),
                brand,
                metric_group: dataset.metric_group().to_string(),
            },
            period: period.clone(),
            status,
            metric: mapping.metric.clone(),
            value,
            row_timestamp,
            line: row.line,
        });
    }

    Ok(observations)
}

fn required_cell<'a>(row: &'a RawRow, column: &str) -> Result<&'a str, ValidationError> {
    let value = row.get(column).ok_or_else(|| ValidationError::MissingColumn {
        line: row.line,
        column: column.to_string(),
    })?;
    if is_unobserved(value) {
        return Err(ValidationError::EmptyValue {
            line: row.line,
            column: column.to_string(),
        });
    }
    Ok(value)
}

fn row_timestamp(
    dataset: &DatasetConfig,
    row: &RawRow,
    as_of: NaiveDate,
) -> Result<NaiveDate, ValidationError> {
    match &dataset.timestamp {
        TimestampRule::Date { column, formats } => {
            let value = required_cell(row, column)?;
            parse_date(value, formats).ok_or_else(|| ValidationError::InvalidDate {
                line: row.line,
                column: column.clone(),
                value: value.to_string(),
            })
        }
        TimestampRule::PeriodNumber { column, year } => {
            let year = year.unwrap_or_else(|| match dataset.granularity {
                Granularity::Week => as_of.iso_week().year(),
                Granularity::Month => as_of.year(),
            });
            let value = required_cell(row, column)?;
            let out_of_range = || ValidationError::PeriodOutOfRange {
                line: row.line,
                value: value.to_string(),
                granularity: dataset.granularity,
                year,
            };
            let number = parse_number(value).ok_or_else(|| ValidationError::InvalidNumber {
                line: row.line,
                column: column.clone(),
                value: value.to_string(),
            })?;
            if number.fract() != 0.0 || !(1.0..=53.0).contains(&number) {
                return Err(out_of_range());
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let number = number as u32;
            match dataset.granularity {
                Granularity::Week => {
                    NaiveDate::from_isoywd_opt(year, number, chrono::Weekday::Mon)
                }
                Granularity::Month => NaiveDate::from_ymd_opt(year, number, 1),
            }
            .ok_or_else(out_of_range)
        }
    }
}

/// Parse a date cell with the first matching format.
///
/// Spreadsheet exports often append a time (`2025-02-10 00:00:00`); when the
/// whole cell does not parse, the leading date token is tried as well.
#[must_use]
pub fn parse_date(value: &str, formats: &[String]) -> Option<NaiveDate> {
    let parse = |text: &str| {
        formats
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
    };
    parse(value).or_else(|| {
        let token = value.split(['T', ' ']).next()?;
        (token.len() < value.len()).then(|| parse(token)).flatten()
    })
}

/// Coerce a spreadsheet cell to a number.
///
/// Currency symbols, percent signs, and whitespace are ignored. Separators are
/// resolved as follows: with both `,` and `.` present the one appearing last
/// is the decimal separator; a separator repeated more than once groups
/// thousands; a single separator followed by exactly three digits groups
/// thousands, otherwise it is the decimal point.
///
/// Returns `None` when the cell holds no digits or the result is not a number.
#[must_use]
pub fn parse_number(raw: &str) -> Option<f64> {
    let core: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();
    if !core.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let commas = core.matches(',').count();
    let dots = core.matches('.').count();

    let normalized = if commas > 0 && dots > 0 {
        if core.rfind(',') > core.rfind('.') {
            core.replace('.', "").replace(',', ".")
        } else {
            core.replace(',', "")
        }
    } else if commas > 0 {
        single_separator(&core, ',', commas)
    } else if dots > 0 {
        single_separator(&core, '.', dots)
    } else {
        core
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn single_separator(core: &str, sep: char, count: usize) -> String {
    if count > 1 {
        return core.replace(sep, "");
    }
    match core.split_once(sep) {
        Some((left, right)) if right.len() == 3 => format!("{left}{right}"),
        Some((left, right)) => format!("{left}.{right}"),
        None => core.to_string(),
    }
}

fn is_unobserved(value: &str) -> bool {
    value.is_empty() || PLACEHOLDERS.iter().any(|p| value.eq_ignore_ascii_case(p))
}

/// Lowercase, replace non-alphanumeric runs with `_`, and trim underscores.
#[must_use]
pub fn clean_identifier(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for c in raw.trim().chars() {
        if c.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(c.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
