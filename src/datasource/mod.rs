//! Collaborator ports for loading billing records and persisting charge status.

use crate::domain::{
    ContractId, ContractWithProductsAndSuspensions, DeviceInstallmentMaster, InstallationHistory,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt;

pub mod memory;

pub use memory::{BillingSnapshot, InMemoryBillingStore, SnapshotError};

/// Loads contracts with their product inventory and suspensions.
///
/// Different calculation types may be served by different implementations
/// (see `ProductQueryPortResolver`).
#[async_trait]
pub trait ProductQueryPort: Send + Sync + fmt::Debug {
    /// Fetch the contracts among `contract_ids` with their products and
    /// suspensions relevant to `[billing_start_date, billing_end_date)`.
    ///
    /// Contracts without data are simply absent from the result.
    async fn find_contracts_and_product_inventories_by_contract_ids(
        &self,
        contract_ids: &[ContractId],
        billing_start_date: NaiveDate,
        billing_end_date: NaiveDate,
    ) -> Result<Vec<ContractWithProductsAndSuspensions>, PortError>;
}

#[async_trait]
pub trait InstallationHistoryQueryPort: Send + Sync + fmt::Debug {
    /// Fetch installation records of `contract_ids` installed before
    /// `billing_end_date`.
    async fn find_installations(
        &self,
        contract_ids: &[ContractId],
        billing_start_date: NaiveDate,
        billing_end_date: NaiveDate,
    ) -> Result<Vec<InstallationHistory>, PortError>;
}

#[async_trait]
pub trait InstallationHistoryCommandPort: Send + Sync + fmt::Debug {
    /// Persist the record's charge status.
    ///
    /// Writing a status the record already has must be a no-op.
    async fn update_charge_status(&self, record: &InstallationHistory) -> Result<(), PortError>;
}

#[async_trait]
pub trait DeviceInstallmentQueryPort: Send + Sync + fmt::Debug {
    /// Fetch installment masters of `contract_ids` with a scheduled month in
    /// `[billing_start_date, billing_end_date)`. Finished plans are not returned.
    async fn find_device_installments(
        &self,
        contract_ids: &[ContractId],
        billing_start_date: NaiveDate,
        billing_end_date: NaiveDate,
    ) -> Result<Vec<DeviceInstallmentMaster>, PortError>;
}

/// Error type for port operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortError {
    /// Backend temporarily unavailable (caller may retry)
    Unavailable(String),
    /// Query rejected or failed
    Query(String),
    /// Write failed
    Persistence(String),
}

impl PortError {
    pub fn is_transient(&self) -> bool {
        matches!(self, PortError::Unavailable(_))
    }
}

impl fmt::Display for PortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortError::Unavailable(msg) => write!(f, "Unavailable: {}", msg),
            PortError::Query(msg) => write!(f, "Query error: {}", msg),
            PortError::Persistence(msg) => write!(f, "Persistence error: {}", msg),
        }
    }
}

impl std::error::Error for PortError {}
