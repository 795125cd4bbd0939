use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Counters reported after one dataset ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub dataset: String,
    pub as_of: Option<NaiveDate>,
    /// Date found at the top of the sheet, if any.
    pub source_date: Option<NaiveDate>,
    pub rows_read: usize,
    pub rows_dropped: usize,
    pub periods_inserted: usize,
    /// Open records replaced, closed, or finalized.
    pub periods_updated: usize,
    /// Stored closed periods left as they were.
    pub periods_untouched: usize,
    pub forecasts_computed: usize,
    pub periods_failed: usize,
}

impl RunSummary {
    #[must_use]
    pub fn new(dataset: &str, as_of: NaiveDate) -> Self {
        Self {
            dataset: dataset.to_string(),
            as_of: Some(as_of),
            ..Self::default()
        }
    }

    /// Records written by this run.
    #[must_use]
    pub fn periods_written(&self) -> usize {
        self.periods_inserted + self.periods_updated
    }

    /// Fold another dataset's counters into a grand total.
    pub fn absorb(&mut self, other: &RunSummary) {
        self.rows_read += other.rows_read;
        self.rows_dropped += other.rows_dropped;
        self.periods_inserted += other.periods_inserted;
        self.periods_updated += other.periods_updated;
        self.periods_untouched += other.periods_untouched;
        self.forecasts_computed += other.forecasts_computed;
        self.periods_failed += other.periods_failed;
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: rows read {}, dropped {}; periods inserted {}, updated {}, untouched {}, failed {}; forecasts {}",
            self.dataset,
            self.rows_read,
            self.rows_dropped,
            self.periods_inserted,
            self.periods_updated,
            self.periods_untouched,
            self.periods_failed,
            self.forecasts_computed,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lists_every_counter() {
        let summary = RunSummary {
            dataset: "ttt_weekly_cps".to_string(),
            rows_read: 5,
            rows_dropped: 1,
            periods_inserted: 2,
            periods_updated: 1,
            periods_untouched: 1,
            forecasts_computed: 1,
            periods_failed: 0,
            ..RunSummary::default()
        };
        assert_eq!(
            summary.to_string(),
            "ttt_weekly_cps: rows read 5, dropped 1; periods inserted 2, updated 1, untouched 1, failed 0; forecasts 1"
        );
        assert_eq!(summary.periods_written(), 3);
    }

    #[test]
    fn absorb_adds_counters() {
        let mut total = RunSummary::default();
        let one = RunSummary {
            rows_read: 3,
            periods_inserted: 2,
            periods_failed: 1,
            ..RunSummary::default()
        };
        total.absorb(&one);
        total.absorb(&one);
        assert_eq!(total.rows_read, 6);
        assert_eq!(total.periods_inserted, 4);
        assert_eq!(total.periods_failed, 2);
    }

    #[test]
    fn serializes_as_flat_json() {
        let summary = RunSummary::new("gum_monthly_uv", NaiveDate::from_ymd_opt(2025, 3, 4).unwrap());
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["dataset"], "gum_monthly_uv");
        assert_eq!(json["as_of"], "2025-03-04");
        assert_eq!(json["periods_failed"], 0);
    }
}
