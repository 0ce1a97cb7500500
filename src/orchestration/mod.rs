//! Run orchestration: data loading and the batch runner.

pub mod loader;
pub mod runner;

pub use loader::{
    ContractWithProductsAndSuspensionsDataLoader, DataLoader, DeviceInstallmentDataLoader,
    InstallationHistoryDataLoader, ProductQueryPortResolver,
};
pub use runner::{BillingRunner, CalculationOutcome, ContractFailure};
