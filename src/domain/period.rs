//! Half-open date intervals: the run's billing period and its sub-periods.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("period start {start} must be before end {end}")]
pub struct EmptyPeriodError {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Billing period `[start_date, end_date)`. `start_date < end_date` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BillingPeriod {
    start_date: NaiveDate,
    end_date: NaiveDate,
}

impl BillingPeriod {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Result<Self, EmptyPeriodError> {
        if start_date >= end_date {
            return Err(EmptyPeriodError {
                start: start_date,
                end: end_date,
            });
        }
        Ok(Self {
            start_date,
            end_date,
        })
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    /// Exclusive end.
    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    /// Length in days (always > 0).
    pub fn days(&self) -> i64 {
        (self.end_date - self.start_date).num_days()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date < self.end_date
    }

    /// Clamp a date into `[start_date, end_date]`.
    pub fn clamp(&self, date: NaiveDate) -> NaiveDate {
        date.max(self.start_date).min(self.end_date)
    }

    /// Intersect `[start, end)` (open-ended when `end` is None) with this period.
    pub fn clip(&self, start: NaiveDate, end: Option<NaiveDate>) -> Option<(NaiveDate, NaiveDate)> {
        let from = self.clamp(start);
        let to = end.map(|e| self.clamp(e)).unwrap_or(self.end_date);
        (from < to).then_some((from, to))
    }
}

impl std::fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start_date, self.end_date)
    }
}

/// A maximal interval of the billing period during which the contract's
/// state (active, suspended) does not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubPeriod {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_active: bool,
    pub is_suspended: bool,
}

impl SubPeriod {
    pub fn days(&self) -> i64 {
        (self.end_date - self.start_date).num_days()
    }

    /// True when `[start, end)` (open-ended when `end` is None) covers this sub-period.
    pub fn is_covered_by(&self, start: NaiveDate, end: Option<NaiveDate>) -> bool {
        start <= self.start_date && end.map_or(true, |e| e >= self.end_date)
    }
}

/// Inclusive-exclusive span of a charge line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChargePeriod {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl ChargePeriod {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
        }
    }

    /// Smallest span covering both.
    pub fn span(&self, other: &ChargePeriod) -> ChargePeriod {
        ChargePeriod {
            start_date: self.start_date.min(other.start_date),
            end_date: self.end_date.max(other.end_date),
        }
    }
}

impl From<&SubPeriod> for ChargePeriod {
    fn from(sub: &SubPeriod) -> Self {
        ChargePeriod::new(sub.start_date, sub.end_date)
    }
}

impl From<&BillingPeriod> for ChargePeriod {
    fn from(period: &BillingPeriod) -> Self {
        ChargePeriod::new(period.start_date(), period.end_date())
    }
}
