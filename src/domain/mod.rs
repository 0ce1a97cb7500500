//! Domain types for the billing calculation engine.
//!
//! This module provides:
//! - Lossless, non-negative monetary amounts via the Amount wrapper
//! - Billing periods and sub-periods as half-open date intervals
//! - The run context and calculation types
//! - Contract, installation and installment records consumed by the engine
//! - Charge line items produced by the engine

pub mod amount;
pub mod charge;
pub mod context;
pub mod contract;
pub mod installation;
pub mod installment;
pub mod period;
pub mod primitives;

pub use amount::{Amount, AmountError};
pub use charge::{Charge, DEVICE_INSTALLMENT_CHARGE, INSTALLATION_FEE_CHARGE};
pub use context::{BillingCalculationType, CalculationContext};
pub use contract::{
    AdditionalBillingFactors, CalculationPeriod, ContractWithProductsAndSuspensions,
    MonthlyChargeDomain, ProductInventory, Suspension,
};
pub use installation::InstallationHistory;
pub use installment::{DeviceInstallmentMaster, InstallmentScheduleError};
pub use period::{BillingPeriod, ChargePeriod, EmptyPeriodError, SubPeriod};
pub use primitives::{ChargeStatus, ContractId, ProductOfferingId};
