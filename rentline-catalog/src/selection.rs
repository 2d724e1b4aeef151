use chrono::NaiveDate;
use rentline_core::CoreError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("Return date must differ from pickup date {0}")]
    SameDay(NaiveDate),

    #[error("Return date {end} is before pickup date {start}")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },

    #[error("Pickup date {0} is in the past")]
    StartInPast(NaiveDate),

    #[error("Invalid calendar month {year}-{month}")]
    InvalidMonth { year: i32, month: u32 },

    #[error("Both pickup and return dates are required")]
    Incomplete,
}

impl From<SelectionError> for CoreError {
    fn from(err: SelectionError) -> Self {
        CoreError::ValidationError(err.to_string())
    }
}

/// Two-click date range picker.
///
/// `Empty` -> pick -> `StartPicked` -> pick another day -> `RangeComplete`.
/// An earlier second pick swaps roles with the pending start; any pick on a
/// complete range starts a new one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DateRangeSelection {
    #[default]
    Empty,
    StartPicked {
        start: NaiveDate,
    },
    RangeComplete {
        start: NaiveDate,
        end: NaiveDate,
    },
}

impl DateRangeSelection {
    pub fn new() -> Self {
        Self::Empty
    }

    /// Apply a click. A same-day pick is rejected and the caller keeps the
    /// previous state.
    pub fn pick(self, date: NaiveDate) -> Result<Self, SelectionError> {
        match self {
            Self::Empty | Self::RangeComplete { .. } => Ok(Self::StartPicked { start: date }),
            Self::StartPicked { start } if date == start => Err(SelectionError::SameDay(date)),
            Self::StartPicked { start } if date < start => {
                Ok(Self::RangeComplete { start: date, end: start })
            }
            Self::StartPicked { start } => Ok(Self::RangeComplete { start, end: date }),
        }
    }

    pub fn start(&self) -> Option<NaiveDate> {
        match self {
            Self::Empty => None,
            Self::StartPicked { start } | Self::RangeComplete { start, .. } => Some(*start),
        }
    }

    pub fn range(&self) -> Result<(NaiveDate, NaiveDate), SelectionError> {
        match self {
            Self::RangeComplete { start, end } => Ok((*start, *end)),
            _ => Err(SelectionError::Incomplete),
        }
    }

    /// Exclusive-end day difference of the completed range
    pub fn rental_days(&self) -> Option<i64> {
        self.range().ok().map(|(start, end)| (end - start).num_days())
    }
}
