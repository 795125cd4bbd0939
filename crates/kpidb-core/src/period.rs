//! Calendar periods and open/closed classification.
//!
//! Weeks follow ISO 8601 (Monday start, keys like `2025-W07`); months are
//! calendar months (keys like `2025-03`). Period bounds are inclusive dates.

use chrono::{Datelike, NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Week,
    Month,
}

impl Granularity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Week => "week",
            Granularity::Month => "month",
        }
    }

    /// Parse the stored text form. Returns `None` for anything else.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "week" => Some(Granularity::Week),
            "month" => Some(Granularity::Month),
            _ => None,
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodStatus {
    Open,
    Closed,
}

impl PeriodStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PeriodStatus::Open => "open",
            PeriodStatus::Closed => "closed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(PeriodStatus::Open),
            "closed" => Some(PeriodStatus::Closed),
            _ => None,
        }
    }
}

impl std::fmt::Display for PeriodStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One calendar bucket: its canonical key and inclusive bounds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Period {
    pub granularity: Granularity,
    pub key: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    /// The period of the given granularity that contains `date`.
    #[must_use]
    pub fn containing(date: NaiveDate, granularity: Granularity) -> Self {
        match granularity {
            Granularity::Week => {
                let iso = date.iso_week();
                let offset = i64::from(date.weekday().num_days_from_monday());
                let start = date - TimeDelta::days(offset);
                Self {
                    granularity,
                    key: format!("{:04}-W{:02}", iso.year(), iso.week()),
                    start,
                    end: start + TimeDelta::days(6),
                }
            }
            Granularity::Month => {
                let start = date - TimeDelta::days(i64::from(date.day0()));
                let len = i64::from(days_in_month(date.year(), date.month()));
                Self {
                    granularity,
                    key: format!("{:04}-{:02}", date.year(), date.month()),
                    start,
                    end: start + TimeDelta::days(len - 1),
                }
            }
        }
    }

    /// `Closed` once the period's last day lies strictly before `as_of`.
    ///
    /// A period whose last day *is* `as_of` is still running and stays `Open`.
    #[must_use]
    pub fn status_as_of(&self, as_of: NaiveDate) -> PeriodStatus {
        if self.end < as_of {
            PeriodStatus::Closed
        } else {
            PeriodStatus::Open
        }
    }

    /// Number of calendar days covered, counting both bounds.
    #[must_use]
    pub fn length_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// Derive the period for `timestamp` and classify it relative to `as_of`.
#[must_use]
pub fn classify(
    timestamp: NaiveDate,
    granularity: Granularity,
    as_of: NaiveDate,
) -> (Period, PeriodStatus) {
    let period = Period::containing(timestamp, granularity);
    let status = period.status_as_of(as_of);
    (period, status)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 31,
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn week_starts_on_monday() {
        // 2025-02-13 is a Thursday in ISO week 7.
        let p = Period::containing(date(2025, 2, 13), Granularity::Week);
        assert_eq!(p.key, "2025-W07");
        assert_eq!(p.start, date(2025, 2, 10));
        assert_eq!(p.end, date(2025, 2, 16));
        assert_eq!(p.length_days(), 7);
    }

    #[test]
    fn week_key_uses_iso_year_across_new_year() {
        // 2024-12-30 (Monday) belongs to ISO week 1 of 2025.
        let p = Period::containing(date(2024, 12, 31), Granularity::Week);
        assert_eq!(p.key, "2025-W01");
        assert_eq!(p.start, date(2024, 12, 30));
        assert_eq!(p.end, date(2025, 1, 5));
    }

    #[test]
    fn month_bounds_handle_leap_february() {
        let p = Period::containing(date(2024, 2, 10), Granularity::Month);
        assert_eq!(p.key, "2024-02");
        assert_eq!(p.start, date(2024, 2, 1));
        assert_eq!(p.end, date(2024, 2, 29));

        let p = Period::containing(date(2025, 2, 28), Granularity::Month);
        assert_eq!(p.end, date(2025, 2, 28));
        assert_eq!(p.length_days(), 28);
    }

    #[test]
    fn month_bounds_for_thirty_and_thirty_one_day_months() {
        assert_eq!(
            Period::containing(date(2025, 4, 30), Granularity::Month).end,
            date(2025, 4, 30)
        );
        assert_eq!(
            Period::containing(date(2025, 12, 1), Granularity::Month).end,
            date(2025, 12, 31)
        );
    }

    #[test]
    fn period_ending_on_as_of_is_open() {
        let (period, status) = classify(date(2025, 2, 16), Granularity::Week, date(2025, 2, 16));
        assert_eq!(period.end, date(2025, 2, 16));
        assert_eq!(status, PeriodStatus::Open);
    }

    #[test]
    fn period_closes_the_day_after_its_end() {
        let (_, status) = classify(date(2025, 2, 16), Granularity::Week, date(2025, 2, 17));
        assert_eq!(status, PeriodStatus::Closed);
    }

    #[test]
    fn future_period_is_open() {
        let (_, status) = classify(date(2025, 3, 5), Granularity::Month, date(2025, 2, 1));
        assert_eq!(status, PeriodStatus::Open);
    }

    #[test]
    fn granularity_and_status_round_trip_text() {
        assert_eq!(Granularity::parse("week"), Some(Granularity::Week));
        assert_eq!(Granularity::parse("quarter"), None);
        assert_eq!(PeriodStatus::parse(PeriodStatus::Closed.as_str()), Some(PeriodStatus::Closed));
        assert_eq!(PeriodStatus::parse("frozen"), None);
    }
}
