//! In-memory [`PeriodStore`] for dry runs and tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use kpidb_core::{MetricSeries, PeriodRecord, PeriodStore, PeriodWrite, StoreError};

#[derive(Debug, Default)]
struct State {
    series: HashMap<MetricSeries, i64>,
    records: BTreeMap<(i64, String), PeriodRecord>,
    history: Vec<PeriodWrite>,
    pending_conflicts: usize,
}

/// Period store held entirely in memory, with the same insert and version
/// guards as the database store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` writes fail with [`StoreError::Conflict`] as if
    /// another writer got there first.
    pub fn inject_conflicts(&self, count: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.pending_conflicts = count;
        }
    }

    /// All stored records, ordered by series id then period key.
    #[must_use]
    pub fn records(&self) -> Vec<PeriodRecord> {
        self.state
            .lock()
            .map(|s| s.records.values().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn record(&self, series: &MetricSeries, period_key: &str) -> Option<PeriodRecord> {
        let state = self.state.lock().ok()?;
        let series_id = *state.series.get(series)?;
        state
            .records
            .get(&(series_id, period_key.to_string()))
            .cloned()
    }

    /// Every successful write, in order.
    #[must_use]
    pub fn history(&self) -> Vec<PeriodWrite> {
        self.state
            .lock()
            .map(|s| s.history.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }
}

impl PeriodStore for MemoryStore {
    async fn resolve_series(&self, series: &MetricSeries) -> Result<i64, StoreError> {
        let mut state = self.lock()?;
        let next = i64::try_from(state.series.len()).unwrap_or(i64::MAX) + 1;
        Ok(*state.series.entry(series.clone()).or_insert(next))
    }

    async fn load_period(
        &self,
        series_id: i64,
        period_key: &str,
    ) -> Result<Option<PeriodRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .records
            .get(&(series_id, period_key.to_string()))
            .cloned())
    }

    async fn write_period(&self, write: &PeriodWrite) -> Result<PeriodRecord, StoreError> {
        let mut state = self.lock()?;
        let key = (write.series_id, write.period.key.clone());
        let conflict = || StoreError::Conflict {
            series_id: write.series_id,
            period_key: write.period.key.clone(),
        };

        if state.pending_conflicts > 0 {
            state.pending_conflicts -= 1;
            return Err(conflict());
        }

        let current_version = state.records.get(&key).map(|r| r.version);
        let version = match (write.expected_version, current_version) {
            (None, None) => 1,
            (Some(expected), Some(current)) if expected == current => current + 1,
            _ => return Err(conflict()),
        };

        let record = PeriodRecord {
            series_id: write.series_id,
            period: write.period.clone(),
            status: write.status,
            finalized: write.finalized,
            metrics: write.metrics.clone(),
            forecast: write.forecast.clone(),
            snapshot_date: write.snapshot_date,
            source_row_count: write.source_row_count,
            version,
        };
        state.records.insert(key, record.clone());
        state.history.push(write.clone());
        Ok(record)
    }
}
