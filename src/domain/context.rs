//! Run-level calculation context.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Run mode. Selects period derivation and the product query strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingCalculationType {
    /// Closing calculation for a full billing cycle.
    Regular,
    /// Charges accrued so far in the current month, up to and including today.
    ///
    /// Amounts are prorated against the preview span itself, not the whole
    /// month, so a product active for the entire span is charged its full fee.
    Preview,
    /// Recalculation of a cycle, cut off at the adjustment date.
    Adjustment,
}

impl BillingCalculationType {
    pub const ALL: [BillingCalculationType; 3] = [
        BillingCalculationType::Regular,
        BillingCalculationType::Preview,
        BillingCalculationType::Adjustment,
    ];

    /// Whether runs of this type move one-time charges to CHARGED.
    /// Previews are read-only.
    pub fn persists_charge_status(&self) -> bool {
        !matches!(self, BillingCalculationType::Preview)
    }
}

impl std::fmt::Display for BillingCalculationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BillingCalculationType::Regular => write!(f, "REGULAR"),
            BillingCalculationType::Preview => write!(f, "PREVIEW"),
            BillingCalculationType::Adjustment => write!(f, "ADJUSTMENT"),
        }
    }
}

/// Immutable description of one batch run, passed explicitly to every stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationContext {
    pub billing_calculation_type: BillingCalculationType,
    /// Target cycle as `YYYYMM` or `YYYY-MM`.
    pub target_cycle: String,
    /// The run's notion of "today".
    pub as_of: NaiveDate,
}

impl CalculationContext {
    pub fn new(
        billing_calculation_type: BillingCalculationType,
        target_cycle: impl Into<String>,
        as_of: NaiveDate,
    ) -> Self {
        Self {
            billing_calculation_type,
            target_cycle: target_cycle.into(),
            as_of,
        }
    }

    /// Regular run for a cycle; `as_of` is the first day after the cycle.
    pub fn regular(target_cycle: impl Into<String>, as_of: NaiveDate) -> Self {
        Self::new(BillingCalculationType::Regular, target_cycle, as_of)
    }
}
