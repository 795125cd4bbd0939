use super::*;
use crate::datasets::{Aggregation, MetricMapping};
use crate::period::PeriodStatus;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Run date shared by the tests that do not depend on it.
fn as_of() -> NaiveDate {
    date(2025, 2, 13)
}

fn mapping(column: &str, metric: &str, brand: Option<&str>) -> MetricMapping {
    MetricMapping {
        column: column.to_string(),
        metric: metric.to_string(),
        brand: brand.map(str::to_string),
        aggregation: Aggregation::Snapshot,
        forecastable: true,
    }
}

fn weekly_sessions() -> DatasetConfig {
    DatasetConfig {
        name: "chiesi_weekly_sessions".to_string(),
        sheet: "Chiesi | Weekly Sessions".to_string(),
        granularity: Granularity::Week,
        metric_group: Some("sessions".to_string()),
        brand: None,
        brand_column: None,
        timestamp: TimestampRule::Date {
            column: "start_date".to_string(),
            formats: vec!["%Y-%m-%d".to_string(), "%d/%m/%Y".to_string()],
        },
        metrics: vec![
            mapping("foster_sessions", "sessions", Some("Foster")),
            mapping("trimbow_sessions", "sessions", Some("Trimbow")),
        ],
    }
}

fn monthly_uv() -> DatasetConfig {
    DatasetConfig {
        name: "gum_monthly_uv".to_string(),
        sheet: "GUM | Monthly UV".to_string(),
        granularity: Granularity::Month,
        metric_group: None,
        brand: Some("GUM".to_string()),
        brand_column: None,
        timestamp: TimestampRule::PeriodNumber {
            column: "period".to_string(),
            year: Some(2025),
        },
        metrics: vec![mapping("organic_uv", "organic_uv", None)],
    }
}

// ---------------------------------------------------------------------------
// parse_number
// ---------------------------------------------------------------------------

#[test]
fn parse_number_plain_and_negative() {
    assert_eq!(parse_number("100"), Some(100.0));
    assert_eq!(parse_number("-42.5"), Some(-42.5));
}

#[test]
fn parse_number_strips_currency_percent_and_spaces() {
    assert_eq!(parse_number("€ 1.234"), Some(1234.0));
    assert_eq!(parse_number("12,5 %"), Some(12.5));
    assert_eq!(parse_number("$2,000"), Some(2000.0));
}

#[test]
fn parse_number_last_separator_is_decimal() {
    assert_eq!(parse_number("1.234.567,89"), Some(1_234_567.89));
    assert_eq!(parse_number("1,234,567.89"), Some(1_234_567.89));
}

#[test]
fn parse_number_repeated_separator_groups_thousands() {
    assert_eq!(parse_number("1.234.567"), Some(1_234_567.0));
    assert_eq!(parse_number("1,234,567"), Some(1_234_567.0));
}

#[test]
fn parse_number_single_separator_depends_on_trailing_digits() {
    assert_eq!(parse_number("1.250"), Some(1250.0));
    assert_eq!(parse_number("1.25"), Some(1.25));
    assert_eq!(parse_number("0,5"), Some(0.5));
}

#[test]
fn parse_number_rejects_cells_without_digits() {
    assert_eq!(parse_number(""), None);
    assert_eq!(parse_number("abc"), None);
    assert_eq!(parse_number("-"), None);
}

#[test]
fn parse_number_rejects_malformed_core() {
    assert_eq!(parse_number("1-2"), None);
}

// ---------------------------------------------------------------------------
// parse_date / clean_identifier
// ---------------------------------------------------------------------------

#[test]
fn parse_date_tries_formats_in_order() {
    let formats = vec!["%Y-%m-%d".to_string(), "%d/%m/%Y".to_string()];
    assert_eq!(parse_date("2025-02-10", &formats), Some(date(2025, 2, 10)));
    assert_eq!(parse_date("10/02/2025", &formats), Some(date(2025, 2, 10)));
    assert_eq!(parse_date("Feb 10", &formats), None);
}

#[test]
fn parse_date_ignores_trailing_time() {
    let formats = vec!["%Y-%m-%d".to_string()];
    assert_eq!(
        parse_date("2025-02-10 00:00:00", &formats),
        Some(date(2025, 2, 10))
    );
    assert_eq!(
        parse_date("2025-02-10T08:30:00Z", &formats),
        Some(date(2025, 2, 10))
    );
}

#[test]
fn clean_identifier_slugs_names() {
    assert_eq!(clean_identifier("  Trimbow "), "trimbow");
    assert_eq!(clean_identifier("Paid Contribution (%)"), "paid_contribution");
    assert_eq!(clean_identifier("YTD -- Delta"), "ytd_delta");
}

// ---------------------------------------------------------------------------
// normalize_rows
// ---------------------------------------------------------------------------

#[test]
fn emits_one_observation_per_metric_cell() {
    let rows = vec![RawRow::new(3)
        .with_cell("start_date", "2025-02-10")
        .with_cell("foster_sessions", "100")
        .with_cell("trimbow_sessions", "1.250")];

    let batch = normalize_rows(&weekly_sessions(), &rows, as_of());

    assert_eq!(batch.rows_read, 1);
    assert_eq!(batch.rows_dropped(), 0);
    assert_eq!(batch.observations.len(), 2);

    let foster = &batch.observations[0];
    assert_eq!(foster.series.dataset, "chiesi_weekly_sessions");
    assert_eq!(foster.series.brand, "foster");
    assert_eq!(foster.series.metric_group, "sessions");
    assert_eq!(foster.metric, "sessions");
    assert!((foster.value - 100.0).abs() < f64::EPSILON);
    assert_eq!(foster.period.key, "2025-W07");
    assert_eq!(foster.status, PeriodStatus::Open);
    assert_eq!(foster.row_timestamp, date(2025, 2, 10));
    assert_eq!(foster.line, 3);

    assert_eq!(batch.observations[1].series.brand, "trimbow");
    assert!((batch.observations[1].value - 1250.0).abs() < f64::EPSILON);
}

#[test]
fn empty_and_placeholder_cells_are_not_observed() {
    let rows = vec![RawRow::new(4)
        .with_cell("start_date", "2025-02-10")
        .with_cell("foster_sessions", "  ")
        .with_cell("trimbow_sessions", "n/a")];

    let batch = normalize_rows(&weekly_sessions(), &rows, as_of());

    assert!(batch.observations.is_empty());
    assert!(batch.rejected.is_empty());
}

#[test]
fn missing_metric_column_rejects_the_row() {
    let rows = vec![RawRow::new(5)
        .with_cell("start_date", "2025-02-10")
        .with_cell("foster_sessions", "100")];

    let batch = normalize_rows(&weekly_sessions(), &rows, as_of());

    assert!(batch.observations.is_empty());
    assert_eq!(
        batch.rejected,
        vec![ValidationError::MissingColumn {
            line: 5,
            column: "trimbow_sessions".to_string(),
        }]
    );
}

#[test]
fn unparseable_number_rejects_the_whole_row() {
    let rows = vec![
        RawRow::new(6)
            .with_cell("start_date", "2025-02-10")
            .with_cell("foster_sessions", "100")
            .with_cell("trimbow_sessions", "lots"),
        RawRow::new(7)
            .with_cell("start_date", "2025-02-17")
            .with_cell("foster_sessions", "80")
            .with_cell("trimbow_sessions", "90"),
    ];

    let batch = normalize_rows(&weekly_sessions(), &rows, as_of());

    assert_eq!(batch.rows_read, 2);
    assert_eq!(batch.rows_dropped(), 1);
    assert!(matches!(
        &batch.rejected[0],
        ValidationError::InvalidNumber { line: 6, column, .. } if column == "trimbow_sessions"
    ));
    assert_eq!(batch.observations.len(), 2);
    assert!(batch.observations.iter().all(|o| o.line == 7));
}

#[test]
fn invalid_or_empty_date_rejects_the_row() {
    let rows = vec![
        RawRow::new(8)
            .with_cell("start_date", "next monday")
            .with_cell("foster_sessions", "1")
            .with_cell("trimbow_sessions", "1"),
        RawRow::new(9)
            .with_cell("start_date", "")
            .with_cell("foster_sessions", "1")
            .with_cell("trimbow_sessions", "1"),
    ];

    let batch = normalize_rows(&weekly_sessions(), &rows, as_of());

    assert!(batch.observations.is_empty());
    assert!(matches!(batch.rejected[0], ValidationError::InvalidDate { line: 8, .. }));
    assert!(matches!(batch.rejected[1], ValidationError::EmptyValue { line: 9, .. }));
}

#[test]
fn period_number_rule_maps_month_numbers() {
    let rows = vec![RawRow::new(3)
        .with_cell("period", "3")
        .with_cell("organic_uv", "4.500")];

    let batch = normalize_rows(&monthly_uv(), &rows, as_of());

    assert_eq!(batch.observations.len(), 1);
    let obs = &batch.observations[0];
    assert_eq!(obs.series.brand, "gum");
    assert_eq!(obs.series.metric_group, "gum_monthly_uv");
    assert_eq!(obs.period.key, "2025-03");
    assert_eq!(obs.row_timestamp, date(2025, 3, 1));
    assert!((obs.value - 4500.0).abs() < f64::EPSILON);
}

#[test]
fn period_number_rule_maps_iso_week_numbers() {
    let mut dataset = monthly_uv();
    dataset.granularity = Granularity::Week;
    let rows = vec![RawRow::new(3)
        .with_cell("period", "7")
        .with_cell("organic_uv", "10")];

    let batch = normalize_rows(&dataset, &rows, as_of());

    assert_eq!(batch.observations[0].period.key, "2025-W07");
    assert_eq!(batch.observations[0].row_timestamp, date(2025, 2, 10));
}

#[test]
fn period_number_without_year_follows_the_run_date() {
    let mut dataset = monthly_uv();
    dataset.timestamp = TimestampRule::PeriodNumber {
        column: "period".to_string(),
        year: None,
    };
    let rows = vec![RawRow::new(3)
        .with_cell("period", "10")
        .with_cell("organic_uv", "10")];

    let batch = normalize_rows(&dataset, &rows, date(2026, 10, 19));

    assert_eq!(batch.observations[0].period.key, "2026-10");
    assert_eq!(batch.observations[0].row_timestamp, date(2026, 10, 1));
    assert_eq!(batch.observations[0].status, PeriodStatus::Open);
}

#[test]
fn observations_are_classified_against_as_of() {
    let rows = vec![
        RawRow::new(3)
            .with_cell("start_date", "2025-02-03")
            .with_cell("foster_sessions", "90")
            .with_cell("trimbow_sessions", ""),
        RawRow::new(4)
            .with_cell("start_date", "2025-02-10")
            .with_cell("foster_sessions", "40")
            .with_cell("trimbow_sessions", ""),
    ];

    // Sunday 2025-02-16 ends W07, so only W06 is closed.
    let batch = normalize_rows(&weekly_sessions(), &rows, date(2025, 2, 16));

    let statuses: Vec<_> = batch
        .observations
        .iter()
        .map(|o| (o.period.key.as_str(), o.status))
        .collect();
    assert_eq!(
        statuses,
        vec![("2025-W06", PeriodStatus::Closed), ("2025-W07", PeriodStatus::Open)]
    );
}

#[test]
fn unpinned_week_number_uses_the_iso_week_year() {
    let mut dataset = monthly_uv();
    dataset.granularity = Granularity::Week;
    dataset.timestamp = TimestampRule::PeriodNumber {
        column: "period".to_string(),
        year: None,
    };
    let rows = vec![RawRow::new(3)
        .with_cell("period", "53")
        .with_cell("organic_uv", "10")];

    // 2027-01-01 falls in 2026-W53.
    let batch = normalize_rows(&dataset, &rows, date(2027, 1, 1));

    assert_eq!(batch.observations[0].period.key, "2026-W53");
    assert_eq!(batch.observations[0].row_timestamp, date(2026, 12, 28));
}

#[test]
fn period_number_out_of_range_is_rejected() {
    let rows = vec![
        RawRow::new(3)
            .with_cell("period", "13")
            .with_cell("organic_uv", "10"),
        RawRow::new(4)
            .with_cell("period", "2,5")
            .with_cell("organic_uv", "10"),
    ];

    let batch = normalize_rows(&monthly_uv(), &rows, as_of());

    assert!(batch.observations.is_empty());
    assert!(matches!(
        batch.rejected[0],
        ValidationError::PeriodOutOfRange { line: 3, year: 2025, .. }
    ));
    assert!(matches!(
        batch.rejected[1],
        ValidationError::PeriodOutOfRange { line: 4, .. }
    ));
}

#[test]
fn brand_column_supplies_brand_per_row() {
    let mut dataset = monthly_uv();
    dataset.brand = None;
    dataset.brand_column = Some("brand".to_string());
    let rows = vec![
        RawRow::new(3)
            .with_cell("period", "1")
            .with_cell("brand", "Foster")
            .with_cell("organic_uv", "10"),
        RawRow::new(4)
            .with_cell("period", "1")
            .with_cell("brand", "")
            .with_cell("organic_uv", "10"),
    ];

    let batch = normalize_rows(&dataset, &rows, as_of());

    assert_eq!(batch.observations.len(), 1);
    assert_eq!(batch.observations[0].series.brand, "foster");
    assert!(matches!(
        &batch.rejected[0],
        ValidationError::EmptyValue { line: 4, column } if column == "brand"
    ));
}
