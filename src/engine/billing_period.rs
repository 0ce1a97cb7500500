//! Billing period derivation from the calculation context.

use crate::domain::{BillingCalculationType, BillingPeriod, CalculationContext};
use crate::error::InvalidContextError;
use chrono::{Datelike, Months, NaiveDate};

/// Derives the run's billing period. The policy is a pure function of the
/// calculation type.
pub struct BillingPeriodResolver;

impl BillingPeriodResolver {
    /// - Regular: `[first of cycle month, first of next month)`
    /// - Preview: `[first of as_of's month, as_of + 1 day)`; the cycle is ignored
    /// - Adjustment: `[first of cycle month, min(as_of + 1 day, first of next month))`
    pub fn derive(ctx: &CalculationContext) -> Result<BillingPeriod, InvalidContextError> {
        match ctx.billing_calculation_type {
            BillingCalculationType::Regular => {
                let start = parse_cycle(&ctx.target_cycle)?;
                let end = first_of_next_month(start, &ctx.target_cycle)?;
                Ok(BillingPeriod::new(start, end)?)
            }
            BillingCalculationType::Preview => {
                let start = first_of_month(ctx.as_of);
                let end = day_after(ctx.as_of, &ctx.target_cycle)?;
                Ok(BillingPeriod::new(start, end)?)
            }
            BillingCalculationType::Adjustment => {
                let start = parse_cycle(&ctx.target_cycle)?;
                if ctx.as_of < start {
                    return Err(InvalidContextError::AsOfBeforeCycle {
                        cycle: ctx.target_cycle.clone(),
                        as_of: ctx.as_of,
                    });
                }
                let cycle_end = first_of_next_month(start, &ctx.target_cycle)?;
                let end = day_after(ctx.as_of, &ctx.target_cycle)?.min(cycle_end);
                Ok(BillingPeriod::new(start, end)?)
            }
        }
    }
}

/// Parse `YYYYMM` or `YYYY-MM` into the first day of that month.
pub fn parse_cycle(cycle: &str) -> Result<NaiveDate, InvalidContextError> {
    let malformed = |reason: &str| InvalidContextError::MalformedCycle {
        cycle: cycle.to_string(),
        reason: reason.to_string(),
    };

    if !cycle.is_ascii() {
        return Err(malformed("expected YYYYMM or YYYY-MM"));
    }
    let digits = match cycle.len() {
        6 => cycle.to_string(),
        7 if cycle.as_bytes()[4] == b'-' => format!("{}{}", &cycle[..4], &cycle[5..]),
        _ => return Err(malformed("expected YYYYMM or YYYY-MM")),
    };
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed("cycle must be numeric"));
    }

    let year: i32 = digits[..4]
        .parse()
        .map_err(|_| malformed("invalid year"))?;
    let month: u32 = digits[4..]
        .parse()
        .map_err(|_| malformed("invalid month"))?;

    NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| malformed("month out of range"))
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date - chrono::Duration::days(i64::from(date.day0()))
}

fn first_of_next_month(start: NaiveDate, cycle: &str) -> Result<NaiveDate, InvalidContextError> {
    start
        .checked_add_months(Months::new(1))
        .ok_or_else(|| InvalidContextError::MalformedCycle {
            cycle: cycle.to_string(),
            reason: "date out of range".to_string(),
        })
}

fn day_after(date: NaiveDate, cycle: &str) -> Result<NaiveDate, InvalidContextError> {
    date.succ_opt()
        .ok_or_else(|| InvalidContextError::MalformedCycle {
            cycle: cycle.to_string(),
            reason: "date out of range".to_string(),
        })
}
