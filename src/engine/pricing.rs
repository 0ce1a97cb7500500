//! Pricing policies and the product pricing catalog.

use crate::domain::{AdditionalBillingFactors, Amount, ProductOfferingId};
use crate::error::RuleConfigurationError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A named, unprorated price produced by a policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceComponent {
    pub charge_name: String,
    pub amount: Amount,
}

/// Constant price for every sub-period, prorated by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatPolicy {
    pub charge_name: String,
    pub price: Amount,
}

/// A named charge triggered when all of its factor conditions hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingRule {
    pub charge_name: String,
    pub conditions: BTreeMap<String, String>,
    pub amount_to_charge: Amount,
}

impl MatchingRule {
    pub fn new<K, V>(
        charge_name: impl Into<String>,
        conditions: impl IntoIterator<Item = (K, V)>,
        amount_to_charge: Amount,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            charge_name: charge_name.into(),
            conditions: conditions
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            amount_to_charge,
        }
    }

    /// Every condition key must be present with an equal value; extra factors
    /// are ignored.
    pub fn matches(&self, factors: &AdditionalBillingFactors) -> bool {
        self.conditions
            .iter()
            .all(|(key, value)| factors.get(key) == Some(value.as_str()))
    }
}

/// Evaluates rules against a sub-period's billing factors. Every matching
/// rule emits its own line unless the policy is exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingFactorPolicy {
    pub rules: Vec<MatchingRule>,
    /// Stop at the first matching rule.
    #[serde(default)]
    pub exclusive: bool,
}

impl MatchingFactorPolicy {
    pub fn new(rules: Vec<MatchingRule>) -> Self {
        Self {
            rules,
            exclusive: false,
        }
    }

    pub fn exclusive(rules: Vec<MatchingRule>) -> Self {
        Self {
            rules,
            exclusive: true,
        }
    }

    /// Matching rules in declared order.
    pub fn matching_rules<'a>(
        &'a self,
        factors: &'a AdditionalBillingFactors,
    ) -> impl Iterator<Item = &'a MatchingRule> + 'a {
        let limit = if self.exclusive { 1 } else { usize::MAX };
        self.rules.iter().filter(move |r| r.matches(factors)).take(limit)
    }

    /// Report condition keys that never occur in `known_factor_keys`.
    pub fn validate(
        &self,
        scope: &str,
        known_factor_keys: &BTreeSet<String>,
    ) -> Vec<RuleConfigurationError> {
        self.rules
            .iter()
            .flat_map(|rule| {
                rule.conditions
                    .keys()
                    .filter(|key| !known_factor_keys.contains(*key))
                    .map(|key| RuleConfigurationError {
                        scope: scope.to_string(),
                        charge_name: rule.charge_name.clone(),
                        factor_key: key.clone(),
                    })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PricingPolicy {
    Flat(FlatPolicy),
    MatchingFactor(MatchingFactorPolicy),
}

impl PricingPolicy {
    pub fn flat(charge_name: impl Into<String>, price: Amount) -> Self {
        PricingPolicy::Flat(FlatPolicy {
            charge_name: charge_name.into(),
            price,
        })
    }

    /// Unprorated lines for one set of factors, in emission order.
    pub fn price_components(&self, factors: &AdditionalBillingFactors) -> Vec<PriceComponent> {
        match self {
            PricingPolicy::Flat(flat) => vec![PriceComponent {
                charge_name: flat.charge_name.clone(),
                amount: flat.price,
            }],
            PricingPolicy::MatchingFactor(policy) => policy
                .matching_rules(factors)
                .map(|rule| PriceComponent {
                    charge_name: rule.charge_name.clone(),
                    amount: rule.amount_to_charge,
                })
                .collect(),
        }
    }

    /// Total unprorated price for one set of factors.
    pub fn get_price(&self, factors: &AdditionalBillingFactors) -> Decimal {
        self.price_components(factors)
            .iter()
            .map(|c| c.amount.inner())
            .sum()
    }
}

/// How a product is charged over a suspended sub-period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SuspensionCharging {
    /// No line for suspended sub-periods.
    Excluded,
    /// Suspension does not affect the charge.
    Full,
    /// Charge `rate` of the prorated amount.
    Reduced { rate: Decimal },
}

impl SuspensionCharging {
    pub fn from_rate(rate: Decimal) -> Self {
        if rate <= Decimal::ZERO {
            SuspensionCharging::Excluded
        } else if rate >= Decimal::ONE {
            SuspensionCharging::Full
        } else {
            SuspensionCharging::Reduced { rate }
        }
    }

    /// Multiplier for suspended sub-periods; None means no line at all.
    pub fn rate(&self) -> Option<Decimal> {
        match self {
            SuspensionCharging::Excluded => None,
            SuspensionCharging::Full => Some(Decimal::ONE),
            SuspensionCharging::Reduced { rate } => Some(*rate),
        }
    }
}

/// One policy applied to a product offering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPricing {
    pub policy: PricingPolicy,
    /// Falls back to the catalog default when unset.
    #[serde(default)]
    pub suspension_charging: Option<SuspensionCharging>,
}

impl ProductPricing {
    pub fn new(policy: PricingPolicy) -> Self {
        Self {
            policy,
            suspension_charging: None,
        }
    }

    pub fn with_suspension_charging(mut self, charging: SuspensionCharging) -> Self {
        self.suspension_charging = Some(charging);
        self
    }
}

/// Pricing by product offering, in policy declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingCatalog {
    /// Set from configuration, not from the catalog document.
    #[serde(skip, default = "default_suspension_charging")]
    pub default_suspension_charging: SuspensionCharging,
    #[serde(default)]
    pub products: BTreeMap<ProductOfferingId, Vec<ProductPricing>>,
}

fn default_suspension_charging() -> SuspensionCharging {
    SuspensionCharging::Excluded
}

impl Default for PricingCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl PricingCatalog {
    pub fn new() -> Self {
        Self {
            default_suspension_charging: SuspensionCharging::Excluded,
            products: BTreeMap::new(),
        }
    }

    pub fn with_default_suspension_charging(mut self, charging: SuspensionCharging) -> Self {
        self.default_suspension_charging = charging;
        self
    }

    pub fn with_pricing(mut self, product: ProductOfferingId, pricing: ProductPricing) -> Self {
        self.products.entry(product).or_default().push(pricing);
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn pricings_for(&self, product: &ProductOfferingId) -> &[ProductPricing] {
        self.products.get(product).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn suspension_charging_for(&self, pricing: &ProductPricing) -> SuspensionCharging {
        pricing
            .suspension_charging
            .unwrap_or(self.default_suspension_charging)
    }

    /// Check every matching rule against the factor keys seen in a run.
    pub fn validate_rules(&self, known_factor_keys: &BTreeSet<String>) -> Vec<RuleConfigurationError> {
        self.products
            .iter()
            .flat_map(|(product, pricings)| {
                pricings.iter().flat_map(move |pricing| match &pricing.policy {
                    PricingPolicy::MatchingFactor(policy) => {
                        policy.validate(product.as_str(), known_factor_keys)
                    }
                    PricingPolicy::Flat(_) => Vec::new(),
                })
            })
            .collect()
    }
}
