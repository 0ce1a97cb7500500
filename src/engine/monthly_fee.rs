//! Monthly fee calculation for one contract: proration, pricing, aggregation.

use super::{ChargeAggregator, PricingCatalog};
use crate::domain::{
    BillingPeriod, CalculationPeriod, Charge, ChargePeriod, ContractId, MonthlyChargeDomain,
};
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MonthlyFeeOutcome {
    pub charges: Vec<Charge>,
    /// Every billing factor key carried by the priced products.
    pub factor_keys: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct MonthlyFeeCalculator {
    catalog: Arc<PricingCatalog>,
    aggregator: ChargeAggregator,
}

impl MonthlyFeeCalculator {
    pub fn new(catalog: Arc<PricingCatalog>, aggregator: ChargeAggregator) -> Self {
        Self {
            catalog,
            aggregator,
        }
    }

    /// Calculation periods of all records, ordered by sub-period start.
    /// The sort is stable, so record and product order break ties.
    pub fn calculation_periods(
        records: &[Arc<dyn MonthlyChargeDomain>],
        billing_period: &BillingPeriod,
    ) -> Vec<CalculationPeriod> {
        let mut periods: Vec<CalculationPeriod> = records
            .iter()
            .flat_map(|record| record.calculation_periods(billing_period))
            .collect();
        periods.sort_by_key(|p| p.sub_period.start_date);
        periods
    }

    /// Prorated, unrounded lines in (sub-period, product, policy, rule) order.
    pub fn price(&self, periods: &[CalculationPeriod]) -> Vec<Charge> {
        let mut lines = Vec::new();

        for period in periods {
            let pricings = self.catalog.pricings_for(&period.product_offering_id);
            if pricings.is_empty() {
                tracing::debug!(
                    contract_id = %period.contract_id,
                    product_offering_id = %period.product_offering_id,
                    "No pricing configured for product"
                );
                continue;
            }

            for pricing in pricings {
                let rate = if period.sub_period.is_suspended {
                    match self.catalog.suspension_charging_for(pricing).rate() {
                        Some(rate) => Some(rate),
                        None => continue,
                    }
                } else {
                    None
                };

                for component in pricing.policy.price_components(&period.billing_factors) {
                    let mut amount = period.prorate(component.amount);
                    if let Some(rate) = rate {
                        amount = amount.scale_by(rate);
                    }
                    lines.push(
                        Charge::new(
                            period.contract_id,
                            component.charge_name,
                            amount,
                            ChargePeriod::from(&period.sub_period),
                        )
                        .with_product_offering(period.product_offering_id.clone()),
                    );
                }
            }
        }

        lines
    }

    pub fn calculate(
        &self,
        contract_id: ContractId,
        records: &[Arc<dyn MonthlyChargeDomain>],
        billing_period: &BillingPeriod,
    ) -> MonthlyFeeOutcome {
        let periods = Self::calculation_periods(records, billing_period);
        let factor_keys = periods
            .iter()
            .flat_map(|p| p.billing_factors.keys().map(str::to_string))
            .collect();
        let lines = self.price(&periods);

        MonthlyFeeOutcome {
            charges: self.aggregator.aggregate(contract_id, lines),
            factor_keys,
        }
    }
}
