//! Computed charge line items.

use crate::domain::{Amount, ChargePeriod, ContractId, ProductOfferingId};
use serde::{Deserialize, Serialize};

/// Charge name emitted for a device installment.
pub const DEVICE_INSTALLMENT_CHARGE: &str = "DEVICE_INSTALLMENT";
/// Charge name emitted for an installation fee.
pub const INSTALLATION_FEE_CHARGE: &str = "INSTALLATION_FEE";

/// A single computed charge. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    pub contract_id: ContractId,
    pub charge_name: String,
    pub amount: Amount,
    pub period: ChargePeriod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_offering_id: Option<ProductOfferingId>,
}

impl Charge {
    pub fn new(
        contract_id: ContractId,
        charge_name: impl Into<String>,
        amount: Amount,
        period: ChargePeriod,
    ) -> Self {
        Self {
            contract_id,
            charge_name: charge_name.into(),
            amount,
            period,
            product_offering_id: None,
        }
    }

    pub fn with_product_offering(mut self, product_offering_id: ProductOfferingId) -> Self {
        self.product_offering_id = Some(product_offering_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_charge_json_omits_missing_product() {
        let period = ChargePeriod::new(
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
        );
        let charge = Charge::new(
            ContractId::new(1),
            INSTALLATION_FEE_CHARGE,
            Amount::from_str_canonical("30000").unwrap(),
            period,
        );
        let json = serde_json::to_string(&charge).unwrap();
        assert_eq!(
            json,
            r#"{"contract_id":1,"charge_name":"INSTALLATION_FEE","amount":"30000","period":{"start_date":"2024-06-01","end_date":"2024-07-01"}}"#
        );
    }
}
