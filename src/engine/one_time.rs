//! One-time charges: device installments and installation fees.

use crate::datasource::{InstallationHistoryCommandPort, PortError};
use crate::domain::{
    Amount, BillingPeriod, Charge, ChargePeriod, ChargeStatus, ContractId,
    DeviceInstallmentMaster, InstallationHistory, DEVICE_INSTALLMENT_CHARGE,
    INSTALLATION_FEE_CHARGE,
};
use crate::error::ScheduleExhaustedError;
use chrono::Datelike;
use serde::Serialize;

pub struct InstallmentCalculator;

impl InstallmentCalculator {
    /// Due amount for a 0-based period index. Pure lookup, so re-running the
    /// same index always yields the same amount.
    pub fn due_amount(
        master: &DeviceInstallmentMaster,
        current_period_index: usize,
    ) -> Result<Amount, ScheduleExhaustedError> {
        master
            .schedule
            .get(current_period_index)
            .copied()
            .ok_or(ScheduleExhaustedError {
                contract_id: master.contract_id,
                installment_sequence: master.installment_sequence,
                index: current_period_index,
                len: master.schedule.len(),
            })
    }

    /// Months between the installment start month and the billing month.
    /// None when the billing period precedes the schedule.
    pub fn period_index(
        master: &DeviceInstallmentMaster,
        billing_period: &BillingPeriod,
    ) -> Option<usize> {
        let start = master.installment_start_date;
        let billed = billing_period.start_date();
        let months = (billed.year() - start.year()) * 12 + billed.month() as i32
            - start.month() as i32;
        usize::try_from(months).ok()
    }

    /// The installment charge for the billing period, if one is due.
    ///
    /// Nothing is due before the schedule starts or past the end of a fully
    /// billed plan.
    /// A period past the schedule of an unfinished plan is inconsistent data.
    pub fn calculate(
        master: &DeviceInstallmentMaster,
        billing_period: &BillingPeriod,
    ) -> Result<Option<Charge>, ScheduleExhaustedError> {
        let Some(index) = Self::period_index(master, billing_period) else {
            return Ok(None);
        };
        if index >= master.periods() && master.is_complete() {
            return Ok(None);
        }
        let amount = Self::due_amount(master, index)?;
        Ok(Some(Charge::new(
            master.contract_id,
            DEVICE_INSTALLMENT_CHARGE,
            amount,
            ChargePeriod::from(billing_period),
        )))
    }
}

/// A charge-status change applied during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusTransition {
    pub contract_id: ContractId,
    pub sequence: i64,
    pub from: ChargeStatus,
    pub to: ChargeStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// NOT_CHARGED → CHARGED was persisted.
    Transitioned(StatusTransition),
    /// The record was already CHARGED; nothing was written.
    AlreadyCharged,
}

pub struct InstallationCalculator;

impl InstallationCalculator {
    /// The installation fee, when the record is unbilled, installed before the
    /// end of the billing period and not cancelled.
    pub fn calculate(record: &InstallationHistory, billing_period: &BillingPeriod) -> Option<Charge> {
        if record.charge_status.is_charged()
            || record.is_cancelled()
            || record.installation_date >= billing_period.end_date()
        {
            return None;
        }
        Some(Charge::new(
            record.contract_id,
            INSTALLATION_FEE_CHARGE,
            record.installation_fee,
            ChargePeriod::from(billing_period),
        ))
    }

    /// Move the record to CHARGED and persist it. Already-charged records are
    /// left untouched, so repeating the call never writes twice.
    pub async fn mark_charged(
        record: &mut InstallationHistory,
        port: &dyn InstallationHistoryCommandPort,
    ) -> Result<StatusUpdate, PortError> {
        if record.charge_status.is_charged() {
            return Ok(StatusUpdate::AlreadyCharged);
        }

        let updated = record.charged();
        port.update_charge_status(&updated).await?;

        let transition = StatusTransition {
            contract_id: record.contract_id,
            sequence: record.sequence,
            from: record.charge_status,
            to: updated.charge_status,
        };
        *record = updated;
        Ok(StatusUpdate::Transitioned(transition))
    }
}
