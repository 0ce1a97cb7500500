pub mod config;
pub mod datasource;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use config::{Config, ConfigError};
pub use datasource::{
    DeviceInstallmentQueryPort, InMemoryBillingStore, InstallationHistoryCommandPort,
    InstallationHistoryQueryPort, PortError, ProductQueryPort,
};
pub use domain::{
    Amount, BillingCalculationType, BillingPeriod, CalculationContext, Charge, ChargePeriod,
    ChargeStatus, ContractId, ContractWithProductsAndSuspensions, DeviceInstallmentMaster,
    InstallationHistory, ProductInventory, ProductOfferingId, Suspension,
};
pub use engine::{PricingCatalog, PricingPolicy, ProductPricing, SuspensionCharging};
pub use error::{ContractError, DataLoadError, InvalidContextError, RunError};
pub use orchestration::{BillingRunner, CalculationOutcome, ContractFailure};

/// Install the global tracing subscriber, filtered at `config.log_level`
/// unless `RUST_LOG` says otherwise. Safe to call more than once.
pub fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
