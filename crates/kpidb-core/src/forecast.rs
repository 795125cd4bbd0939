//! End-of-period projection for open periods.

use chrono::{NaiveDate, TimeDelta};

use crate::period::Period;
use crate::types::MetricValues;

/// At or below this elapsed fraction no forecast is produced.
pub const MIN_ELAPSED_FRACTION: f64 = 1e-9;

/// Share of `period` that has elapsed at `as_of`, clamped to `[0, 1]`.
///
/// `(as_of - start) / (end + 1 day - start)`, counted in whole days. An `as_of`
/// on or before the first day yields `0.0`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn elapsed_fraction(period: &Period, as_of: NaiveDate) -> f64 {
    let total = ((period.end + TimeDelta::days(1)) - period.start).num_days();
    if total <= 0 {
        return 0.0;
    }
    let elapsed = (as_of - period.start).num_days();
    (elapsed as f64 / total as f64).clamp(0.0, 1.0)
}

/// Project each forecastable metric to the end of `period`.
///
/// Returns `None` only when the elapsed fraction is degenerate. An open
/// period with no forecastable metric gets an empty map.
#[must_use]
pub fn compute_forecast<F>(
    metrics: &MetricValues,
    is_forecastable: F,
    period: &Period,
    as_of: NaiveDate,
) -> Option<MetricValues>
where
    F: Fn(&str) -> bool,
{
    let fraction = elapsed_fraction(period, as_of);
    if fraction <= MIN_ELAPSED_FRACTION {
        return None;
    }

    Some(
        metrics
            .iter()
            .filter(|(name, _)| is_forecastable(name))
            .map(|(name, value)| (name.clone(), value / fraction))
            .collect(),
    )
}
