//! Installation history records (one-time installation fees).

use crate::domain::{Amount, ChargeStatus, ContractId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationHistory {
    pub contract_id: ContractId,
    /// Distinguishes multiple installations on one contract.
    pub sequence: i64,
    pub installation_date: NaiveDate,
    pub removal_date: Option<NaiveDate>,
    pub installation_fee: Amount,
    pub charge_status: ChargeStatus,
}

impl InstallationHistory {
    pub fn new(
        contract_id: ContractId,
        sequence: i64,
        installation_date: NaiveDate,
        installation_fee: Amount,
    ) -> Self {
        Self {
            contract_id,
            sequence,
            installation_date,
            removal_date: None,
            installation_fee,
            charge_status: ChargeStatus::NotCharged,
        }
    }

    pub fn with_removal(mut self, removal_date: NaiveDate) -> Self {
        self.removal_date = Some(removal_date);
        self
    }

    pub fn with_status(mut self, charge_status: ChargeStatus) -> Self {
        self.charge_status = charge_status;
        self
    }

    /// Storage key of the record.
    pub fn key(&self) -> (ContractId, i64) {
        (self.contract_id, self.sequence)
    }

    /// Removed on or before the day it was installed, i.e. never in service.
    pub fn is_cancelled(&self) -> bool {
        self.removal_date
            .map_or(false, |removed| removed <= self.installation_date)
    }

    /// Copy of this record in the CHARGED state.
    pub fn charged(&self) -> Self {
        self.clone().with_status(ChargeStatus::Charged)
    }
}
