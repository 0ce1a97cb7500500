//! Pure computation engine(s) for billing charges.

pub mod aggregator;
pub mod billing_period;
pub mod monthly_fee;
pub mod one_time;
pub mod pricing;
pub mod proration;

pub use aggregator::ChargeAggregator;
pub use billing_period::BillingPeriodResolver;
pub use monthly_fee::{MonthlyFeeCalculator, MonthlyFeeOutcome};
pub use one_time::{InstallationCalculator, InstallmentCalculator, StatusTransition, StatusUpdate};
pub use pricing::{
    FlatPolicy, MatchingFactorPolicy, MatchingRule, PriceComponent, PricingCatalog, PricingPolicy,
    ProductPricing, SuspensionCharging,
};
pub use proration::ProrationEngine;
