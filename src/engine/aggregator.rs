//! Folds per-sub-period charge lines into a contract's final charges.

use crate::domain::{Charge, ContractId, ProductOfferingId};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargeAggregator {
    amount_scale: u32,
}

impl ChargeAggregator {
    pub fn new(amount_scale: u32) -> Self {
        Self { amount_scale }
    }

    /// Consolidate lines sharing `(product_offering_id, charge_name)`.
    ///
    /// Lines must arrive in (sub-period, product, policy, rule) order; each
    /// consolidated charge keeps the position of its first line, its amount is
    /// the exact sum rounded once, and its period spans all of its lines.
    /// Lines of other contracts are ignored.
    pub fn aggregate(
        &self,
        contract_id: ContractId,
        line_items: impl IntoIterator<Item = Charge>,
    ) -> Vec<Charge> {
        let mut merged: Vec<Charge> = Vec::new();
        let mut positions: HashMap<(Option<ProductOfferingId>, String), usize> = HashMap::new();

        for line in line_items {
            if line.contract_id != contract_id {
                tracing::warn!(
                    contract_id = %contract_id,
                    line_contract_id = %line.contract_id,
                    "Dropping charge line of another contract"
                );
                continue;
            }
            let key = (line.product_offering_id.clone(), line.charge_name.clone());
            match positions.get(&key) {
                Some(&idx) => {
                    let existing = &mut merged[idx];
                    existing.amount += line.amount;
                    existing.period = existing.period.span(&line.period);
                }
                None => {
                    positions.insert(key, merged.len());
                    merged.push(line);
                }
            }
        }

        merged
            .into_iter()
            .map(|mut charge| {
                charge.amount = charge.amount.round_to(self.amount_scale);
                charge
            })
            .collect()
    }

    /// Unconsolidated lines, rounded, in input order.
    pub fn line_items(
        &self,
        contract_id: ContractId,
        line_items: impl IntoIterator<Item = Charge>,
    ) -> Vec<Charge> {
        line_items
            .into_iter()
            .filter(|line| line.contract_id == contract_id)
            .map(|mut line| {
                line.amount = line.amount.round_to(self.amount_scale);
                line
            })
            .collect()
    }
}
