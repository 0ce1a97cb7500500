//! Device installment master records.

use crate::domain::{Amount, ContractId};
use chrono::{Months, NaiveDate};
use rust_decimal::prelude::RoundingStrategy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstallmentScheduleError {
    #[error("installment schedule must have at least one period")]
    Empty,
    #[error("schedule sums to {scheduled} but principal is {principal}")]
    PrincipalMismatch { principal: Amount, scheduled: Amount },
    #[error("billed count {billed} exceeds schedule length {len}")]
    BilledCountOutOfRange { billed: usize, len: usize },
}

/// Device installment contract: principal split into per-period due amounts.
///
/// Invariant: the schedule sums to `total_principal`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInstallmentMaster {
    pub contract_id: ContractId,
    pub installment_sequence: i64,
    /// First day of the month the first installment is due.
    pub installment_start_date: NaiveDate,
    pub total_principal: Amount,
    pub schedule: Vec<Amount>,
    /// Number of periods already billed.
    #[serde(default)]
    pub billed_count: usize,
}

impl DeviceInstallmentMaster {
    pub fn new(
        contract_id: ContractId,
        installment_sequence: i64,
        installment_start_date: NaiveDate,
        total_principal: Amount,
        schedule: Vec<Amount>,
    ) -> Result<Self, InstallmentScheduleError> {
        let master = Self {
            contract_id,
            installment_sequence,
            installment_start_date,
            total_principal,
            schedule,
            billed_count: 0,
        };
        master.validate()?;
        Ok(master)
    }

    /// Check the schedule invariants (for records built by deserialization).
    pub fn validate(&self) -> Result<(), InstallmentScheduleError> {
        if self.schedule.is_empty() {
            return Err(InstallmentScheduleError::Empty);
        }
        let scheduled: Amount = self.schedule.iter().copied().sum();
        if scheduled != self.total_principal {
            return Err(InstallmentScheduleError::PrincipalMismatch {
                principal: self.total_principal,
                scheduled,
            });
        }
        if self.billed_count > self.schedule.len() {
            return Err(InstallmentScheduleError::BilledCountOutOfRange {
                billed: self.billed_count,
                len: self.schedule.len(),
            });
        }
        Ok(())
    }

    /// Split `total_principal` evenly over `periods`, truncating each
    /// installment to `scale` digits; the final period absorbs the remainder.
    pub fn from_principal(
        contract_id: ContractId,
        installment_sequence: i64,
        installment_start_date: NaiveDate,
        total_principal: Amount,
        periods: usize,
        scale: u32,
    ) -> Result<Self, InstallmentScheduleError> {
        if periods == 0 {
            return Err(InstallmentScheduleError::Empty);
        }
        let total = total_principal.inner();
        let per_period = (total / Decimal::from(periods as u64))
            .round_dp_with_strategy(scale, RoundingStrategy::ToZero);
        let last = total - per_period * Decimal::from((periods - 1) as u64);

        let mut schedule = Vec::with_capacity(periods);
        for _ in 1..periods {
            schedule.push(Amount::try_new(per_period).unwrap_or_default());
        }
        schedule.push(Amount::try_new(last).unwrap_or_default());

        Self::new(
            contract_id,
            installment_sequence,
            installment_start_date,
            total_principal,
            schedule,
        )
    }

    pub fn with_billed_count(mut self, billed_count: usize) -> Result<Self, InstallmentScheduleError> {
        if billed_count > self.schedule.len() {
            return Err(InstallmentScheduleError::BilledCountOutOfRange {
                billed: billed_count,
                len: self.schedule.len(),
            });
        }
        self.billed_count = billed_count;
        Ok(self)
    }

    pub fn periods(&self) -> usize {
        self.schedule.len()
    }

    /// Every scheduled period has been billed.
    pub fn is_complete(&self) -> bool {
        self.billed_count >= self.schedule.len()
    }

    /// First day after the last scheduled month. None if out of date range.
    pub fn schedule_end_date(&self) -> Option<NaiveDate> {
        u32::try_from(self.schedule.len())
            .ok()
            .and_then(|n| self.installment_start_date.checked_add_months(Months::new(n)))
    }

    /// Whether some scheduled month falls in `[start, end)`.
    pub fn is_due_within(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.installment_start_date < end
            && self.schedule_end_date().map_or(true, |schedule_end| schedule_end > start)
    }

    /// Principal not yet billed.
    pub fn remaining_principal(&self) -> Amount {
        self.schedule.iter().skip(self.billed_count).copied().sum()
    }
}
