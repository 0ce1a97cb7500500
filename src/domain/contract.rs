//! Monthly-fee domain shape: a contract with its product inventory and suspensions.

use crate::domain::{Amount, BillingPeriod, ContractId, ProductOfferingId, SubPeriod};
use crate::engine::ProrationEngine;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Named billing factors attached to a product (e.g. `plan`, `region`).
///
/// Backed by a BTreeMap so iteration and serialization are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdditionalBillingFactors(BTreeMap<String, String>);

impl AdditionalBillingFactors {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AdditionalBillingFactors {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A product subscription held by a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInventory {
    pub product_offering_id: ProductOfferingId,
    pub effective_start_date: NaiveDate,
    /// Exclusive; None while the product is still subscribed.
    pub effective_end_date: Option<NaiveDate>,
    #[serde(default)]
    pub billing_factors: AdditionalBillingFactors,
}

impl ProductInventory {
    pub fn new(
        product_offering_id: ProductOfferingId,
        effective_start_date: NaiveDate,
        effective_end_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            product_offering_id,
            effective_start_date,
            effective_end_date,
            billing_factors: AdditionalBillingFactors::new(),
        }
    }

    pub fn with_factors(mut self, billing_factors: AdditionalBillingFactors) -> Self {
        self.billing_factors = billing_factors;
        self
    }
}

/// A suspension of service on a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suspension {
    pub start_date: NaiveDate,
    /// Exclusive; None while the suspension is ongoing.
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub suspension_type: Option<String>,
}

impl Suspension {
    pub fn new(start_date: NaiveDate, end_date: Option<NaiveDate>) -> Self {
        Self {
            start_date,
            end_date,
            suspension_type: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractWithProductsAndSuspensions {
    pub contract_id: ContractId,
    #[serde(default)]
    pub products: Vec<ProductInventory>,
    #[serde(default)]
    pub suspensions: Vec<Suspension>,
}

impl ContractWithProductsAndSuspensions {
    pub fn new(contract_id: ContractId) -> Self {
        Self {
            contract_id,
            products: Vec::new(),
            suspensions: Vec::new(),
        }
    }

    pub fn with_product(mut self, product: ProductInventory) -> Self {
        self.products.push(product);
        self
    }

    pub fn with_suspension(mut self, suspension: Suspension) -> Self {
        self.suspensions.push(suspension);
        self
    }
}

/// One effective product over one sub-period, ready to be priced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalculationPeriod {
    pub contract_id: ContractId,
    pub sub_period: SubPeriod,
    pub product_offering_id: ProductOfferingId,
    pub billing_factors: AdditionalBillingFactors,
    /// Length of the run's billing period in days.
    pub billing_period_days: i64,
}

impl CalculationPeriod {
    /// `sub_period.days / billing_period_days`.
    pub fn fraction(&self) -> Decimal {
        ProrationEngine::fraction_of(self.sub_period.days(), self.billing_period_days)
    }

    /// Apportion a full-period amount to this sub-period.
    pub fn prorate(&self, amount: Amount) -> Amount {
        amount.prorate(self.sub_period.days(), self.billing_period_days)
    }
}

/// Anything the monthly-fee calculator can price: it belongs to a contract and
/// can be split into calculation periods for a billing period.
pub trait MonthlyChargeDomain: Send + Sync + fmt::Debug {
    fn contract_id(&self) -> ContractId;

    /// Calculation periods ordered by sub-period start, then by record order.
    fn calculation_periods(&self, billing_period: &BillingPeriod) -> Vec<CalculationPeriod>;
}

impl MonthlyChargeDomain for ContractWithProductsAndSuspensions {
    fn contract_id(&self) -> ContractId {
        self.contract_id
    }

    fn calculation_periods(&self, billing_period: &BillingPeriod) -> Vec<CalculationPeriod> {
        let sub_periods = ProrationEngine::split(&self.products, &self.suspensions, billing_period);

        sub_periods
            .iter()
            .flat_map(|sub| {
                self.products
                    .iter()
                    .filter(|p| sub.is_covered_by(p.effective_start_date, p.effective_end_date))
                    .map(|p| CalculationPeriod {
                        contract_id: self.contract_id,
                        sub_period: *sub,
                        product_offering_id: p.product_offering_id.clone(),
                        billing_factors: p.billing_factors.clone(),
                        billing_period_days: billing_period.days(),
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn june() -> BillingPeriod {
        BillingPeriod::new(date(2024, 6, 1), date(2024, 7, 1)).unwrap()
    }

    #[test]
    fn test_factors_from_iter_and_get() {
        let factors: AdditionalBillingFactors =
            vec![("plan", "A"), ("region", "KR")].into_iter().collect();
        assert_eq!(factors.get("plan"), Some("A"));
        assert_eq!(factors.get("speed"), None);
        assert_eq!(factors.keys().collect::<Vec<_>>(), vec!["plan", "region"]);
    }

    #[test]
    fn test_calculation_periods_pair_products_with_sub_periods() {
        let contract = ContractWithProductsAndSuspensions::new(ContractId::new(1))
            .with_product(ProductInventory::new(
                ProductOfferingId::new("BASE"),
                date(2024, 1, 1),
                None,
            ))
            .with_product(ProductInventory::new(
                ProductOfferingId::new("ADDON"),
                date(2024, 6, 16),
                None,
            ));

        let periods = contract.calculation_periods(&june());
        let summary: Vec<_> = periods
            .iter()
            .map(|p| (p.product_offering_id.as_str(), p.sub_period.days()))
            .collect();
        assert_eq!(summary, vec![("BASE", 15), ("BASE", 15), ("ADDON", 15)]);
        assert!(periods.iter().all(|p| p.billing_period_days == 30));
    }

    #[test]
    fn test_calculation_period_prorate() {
        let contract = ContractWithProductsAndSuspensions::new(ContractId::new(1)).with_product(
            ProductInventory::new(ProductOfferingId::new("BASE"), date(2024, 6, 21), None),
        );
        let periods = contract.calculation_periods(&june());
        assert_eq!(periods.len(), 1);

        let full = Amount::from_str_canonical("300").unwrap();
        assert_eq!(
            periods[0].prorate(full),
            Amount::from_str_canonical("100").unwrap()
        );
    }

    #[test]
    fn test_contract_deserializes_with_defaults() {
        let json = r#"{"contract_id": 7, "products": [{
            "product_offering_id": "BASE",
            "effective_start_date": "2024-01-01",
            "effective_end_date": null
        }]}"#;
        let contract: ContractWithProductsAndSuspensions = serde_json::from_str(json).unwrap();
        assert_eq!(contract.contract_id, ContractId::new(7));
        assert!(contract.suspensions.is_empty());
        assert!(contract.products[0].billing_factors.is_empty());
    }
}
