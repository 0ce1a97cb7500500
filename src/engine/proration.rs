//! Splits a contract's billing period at every state change.

use crate::domain::{BillingPeriod, ProductInventory, SubPeriod, Suspension};
use chrono::NaiveDate;
use rust_decimal::Decimal;

pub struct ProrationEngine;

impl ProrationEngine {
    /// Split the billing period at every product and suspension boundary.
    ///
    /// Returns sub-periods in chronological order. Only sub-periods with at
    /// least one effective product are kept, so the result covers exactly the
    /// contract's active span within the billing period.
    pub fn split(
        products: &[ProductInventory],
        suspensions: &[Suspension],
        billing_period: &BillingPeriod,
    ) -> Vec<SubPeriod> {
        let product_spans: Vec<(NaiveDate, NaiveDate)> = products
            .iter()
            .filter_map(|p| billing_period.clip(p.effective_start_date, p.effective_end_date))
            .collect();
        if product_spans.is_empty() {
            return Vec::new();
        }
        let suspension_spans: Vec<(NaiveDate, NaiveDate)> = suspensions
            .iter()
            .filter_map(|s| billing_period.clip(s.start_date, s.end_date))
            .collect();

        let mut boundaries = vec![billing_period.start_date(), billing_period.end_date()];
        for (start, end) in product_spans.iter().chain(suspension_spans.iter()) {
            boundaries.push(*start);
            boundaries.push(*end);
        }
        boundaries.sort_unstable();
        boundaries.dedup();

        boundaries
            .windows(2)
            .filter_map(|w| {
                let (start_date, end_date) = (w[0], w[1]);
                let covers = |&(s, e): &(NaiveDate, NaiveDate)| s <= start_date && e >= end_date;
                let is_active = product_spans.iter().any(covers);
                is_active.then(|| SubPeriod {
                    start_date,
                    end_date,
                    is_active,
                    is_suspended: suspension_spans.iter().any(covers),
                })
            })
            .collect()
    }

    /// `sub_period_days / period_days` in day units.
    pub fn fraction_of(sub_period_days: i64, period_days: i64) -> Decimal {
        if period_days <= 0 || sub_period_days <= 0 {
            return Decimal::ZERO;
        }
        Decimal::from(sub_period_days) / Decimal::from(period_days)
    }

    pub fn fraction(sub_period: &SubPeriod, billing_period: &BillingPeriod) -> Decimal {
        Self::fraction_of(sub_period.days(), billing_period.days())
    }
}
