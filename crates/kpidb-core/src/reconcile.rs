//! The per-period upsert state machine.
//!
//! A stored period is either `Open` or `Closed { finalized }`. Open records
//! are replaced wholesale by every ingestion; the write that sees the period
//! closed for the first time transitions it and counts as the finalize. A
//! record first stored already closed gets exactly one refresh before it
//! becomes immutable.

use crate::period::{Period, PeriodStatus};
use crate::types::{MetricValues, PeriodRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodState {
    Open,
    Closed { finalized: bool },
}

impl PeriodState {
    #[must_use]
    pub fn of(record: &PeriodRecord) -> Self {
        match record.status {
            PeriodStatus::Open => PeriodState::Open,
            PeriodStatus::Closed => PeriodState::Closed {
                finalized: record.finalized,
            },
        }
    }

    #[must_use]
    pub fn status(self) -> PeriodStatus {
        match self {
            PeriodState::Open => PeriodStatus::Open,
            PeriodState::Closed { .. } => PeriodStatus::Closed,
        }
    }

    #[must_use]
    pub fn finalized(self) -> bool {
        matches!(self, PeriodState::Closed { finalized: true })
    }
}

/// Why an incoming period left the stored record untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Closed and already finalized.
    Finalized,
    /// Closed, awaiting finalize, but the incoming bounds differ.
    EndMismatch,
    /// Incoming data claims the period is open again.
    ReopenRejected,
}

impl SkipReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::Finalized => "finalized",
            SkipReason::EndMismatch => "end_mismatch",
            SkipReason::ReopenRejected => "reopen_rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    /// No stored record.
    Insert,
    /// Open record refreshed while still open.
    Replace,
    /// Open record transitioned to closed.
    Close,
    /// One-time refresh of a record first stored already closed.
    Finalize,
    Skip(SkipReason),
}

impl UpsertAction {
    /// State the record is left in after the action, `None` when skipped.
    #[must_use]
    pub fn target_state(self, incoming: PeriodStatus) -> Option<PeriodState> {
        match self {
            UpsertAction::Insert => Some(match incoming {
                PeriodStatus::Open => PeriodState::Open,
                PeriodStatus::Closed => PeriodState::Closed { finalized: false },
            }),
            UpsertAction::Replace => Some(PeriodState::Open),
            UpsertAction::Close | UpsertAction::Finalize => {
                Some(PeriodState::Closed { finalized: true })
            }
            UpsertAction::Skip(_) => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            UpsertAction::Insert => "insert",
            UpsertAction::Replace => "replace",
            UpsertAction::Close => "close",
            UpsertAction::Finalize => "finalize",
            UpsertAction::Skip(_) => "skip",
        }
    }
}

/// Decide what to do with `incoming` given the stored record, if any.
#[must_use]
pub fn plan_upsert(
    existing: Option<&PeriodRecord>,
    incoming: &Period,
    status: PeriodStatus,
) -> UpsertAction {
    let Some(record) = existing else {
        return UpsertAction::Insert;
    };

    match (PeriodState::of(record), status) {
        (PeriodState::Open, PeriodStatus::Open) => UpsertAction::Replace,
        (PeriodState::Open, PeriodStatus::Closed) => UpsertAction::Close,
        (PeriodState::Closed { .. }, PeriodStatus::Open) => {
            UpsertAction::Skip(SkipReason::ReopenRejected)
        }
        (PeriodState::Closed { finalized: true }, PeriodStatus::Closed) => {
            UpsertAction::Skip(SkipReason::Finalized)
        }
        (PeriodState::Closed { finalized: false }, PeriodStatus::Closed) => {
            if record.period.end == incoming.end {
                UpsertAction::Finalize
            } else {
                UpsertAction::Skip(SkipReason::EndMismatch)
            }
        }
    }
}

/// Contents a non-skip action writes for one period.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodUpdate {
    pub action: UpsertAction,
    pub state: PeriodState,
    pub metrics: MetricValues,
    /// Always `None` for closed targets.
    pub forecast: Option<MetricValues>,
}

impl PeriodUpdate {
    /// Plan the upsert and build the record contents it would write.
    ///
    /// `forecast` is only invoked when the record ends up open.
    ///
    /// # Errors
    ///
    /// Returns the [`SkipReason`] when the stored record must stay untouched.
    pub fn plan<F>(
        existing: Option<&PeriodRecord>,
        incoming: &Period,
        status: PeriodStatus,
        metrics: MetricValues,
        forecast: F,
    ) -> Result<Self, SkipReason>
    where
        F: FnOnce(&MetricValues) -> Option<MetricValues>,
    {
        let action = plan_upsert(existing, incoming, status);
        let state = match action {
            UpsertAction::Skip(reason) => return Err(reason),
            other => other.target_state(status).ok_or(SkipReason::Finalized)?,
        };
        let forecast = match state {
            PeriodState::Open => forecast(&metrics),
            PeriodState::Closed { .. } => None,
        };
        Ok(Self {
            action,
            state,
            metrics,
            forecast,
        })
    }
}
