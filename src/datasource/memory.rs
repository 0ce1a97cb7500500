//! In-memory billing store implementing every port.
//!
//! Seeded programmatically or from a JSON snapshot. Used by tests and by
//! harnesses that stage billing data without a database.

use super::{
    DeviceInstallmentQueryPort, InstallationHistoryCommandPort, InstallationHistoryQueryPort,
    PortError, ProductQueryPort,
};
use crate::domain::{
    ContractId, ContractWithProductsAndSuspensions, DeviceInstallmentMaster, InstallationHistory,
    InstallmentScheduleError,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;

/// Serialized form of the store contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingSnapshot {
    #[serde(default)]
    pub contracts: Vec<ContractWithProductsAndSuspensions>,
    #[serde(default)]
    pub installations: Vec<InstallationHistory>,
    #[serde(default)]
    pub installments: Vec<DeviceInstallmentMaster>,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Failed to read snapshot: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse snapshot: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid installment {contract_id}/{installment_sequence}: {source}")]
    Schedule {
        contract_id: ContractId,
        installment_sequence: i64,
        #[source]
        source: InstallmentScheduleError,
    },
}

type InstallationKey = (ContractId, i64);

#[derive(Debug, Default)]
pub struct InMemoryBillingStore {
    contracts: Vec<ContractWithProductsAndSuspensions>,
    installments: Vec<DeviceInstallmentMaster>,
    installations: RwLock<BTreeMap<InstallationKey, InstallationHistory>>,
    failing_contracts: BTreeSet<ContractId>,
    transient_failures: AtomicUsize,
    writes: AtomicUsize,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contract(mut self, contract: ContractWithProductsAndSuspensions) -> Self {
        self.contracts.push(contract);
        self
    }

    pub fn with_contracts(mut self, contracts: Vec<ContractWithProductsAndSuspensions>) -> Self {
        self.contracts.extend(contracts);
        self
    }

    pub fn with_installation(mut self, record: InstallationHistory) -> Self {
        self.installations.get_mut().insert(record.key(), record);
        self
    }

    pub fn with_installations(mut self, records: Vec<InstallationHistory>) -> Self {
        let installations = self.installations.get_mut();
        for record in records {
            installations.insert(record.key(), record);
        }
        self
    }

    pub fn with_installment(mut self, master: DeviceInstallmentMaster) -> Self {
        self.installments.push(master);
        self
    }

    pub fn with_installments(mut self, masters: Vec<DeviceInstallmentMaster>) -> Self {
        self.installments.extend(masters);
        self
    }

    /// Any query or write touching this contract fails.
    pub fn with_failing_contract(mut self, contract_id: ContractId) -> Self {
        self.failing_contracts.insert(contract_id);
        self
    }

    /// The next `count` queries fail with `PortError::Unavailable`.
    pub fn with_transient_failures(self, count: usize) -> Self {
        self.transient_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn from_snapshot(snapshot: BillingSnapshot) -> Result<Self, SnapshotError> {
        for master in &snapshot.installments {
            master.validate().map_err(|source| SnapshotError::Schedule {
                contract_id: master.contract_id,
                installment_sequence: master.installment_sequence,
                source,
            })?;
        }
        Ok(Self::new()
            .with_contracts(snapshot.contracts)
            .with_installations(snapshot.installations)
            .with_installments(snapshot.installments))
    }

    pub fn from_json_str(json: &str) -> Result<Self, SnapshotError> {
        Self::from_snapshot(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Number of status writes that changed a stored record.
    pub fn effective_writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn installation(&self, key: InstallationKey) -> Option<InstallationHistory> {
        self.installations.read().await.get(&key).cloned()
    }

    fn check_query(&self, contract_ids: &[ContractId]) -> Result<(), PortError> {
        let consumed = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            return Err(PortError::Unavailable("store temporarily unavailable".to_string()));
        }
        if let Some(id) = contract_ids
            .iter()
            .find(|id| self.failing_contracts.contains(id))
        {
            return Err(PortError::Query(format!("contract {} is unreadable", id)));
        }
        Ok(())
    }
}

fn requested(contract_ids: &[ContractId]) -> BTreeSet<ContractId> {
    contract_ids.iter().copied().collect()
}

#[async_trait]
impl ProductQueryPort for InMemoryBillingStore {
    async fn find_contracts_and_product_inventories_by_contract_ids(
        &self,
        contract_ids: &[ContractId],
        _billing_start_date: NaiveDate,
        _billing_end_date: NaiveDate,
    ) -> Result<Vec<ContractWithProductsAndSuspensions>, PortError> {
        self.check_query(contract_ids)?;
        let ids = requested(contract_ids);

        Ok(self
            .contracts
            .iter()
            .filter(|c| ids.contains(&c.contract_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl InstallationHistoryQueryPort for InMemoryBillingStore {
    async fn find_installations(
        &self,
        contract_ids: &[ContractId],
        _billing_start_date: NaiveDate,
        billing_end_date: NaiveDate,
    ) -> Result<Vec<InstallationHistory>, PortError> {
        self.check_query(contract_ids)?;
        let ids = requested(contract_ids);

        Ok(self
            .installations
            .read()
            .await
            .values()
            .filter(|r| ids.contains(&r.contract_id) && r.installation_date < billing_end_date)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl InstallationHistoryCommandPort for InMemoryBillingStore {
    async fn update_charge_status(&self, record: &InstallationHistory) -> Result<(), PortError> {
        if self.failing_contracts.contains(&record.contract_id) {
            return Err(PortError::Persistence(format!(
                "cannot update installation {} of contract {}",
                record.sequence, record.contract_id
            )));
        }

        let mut installations = self.installations.write().await;
        let unchanged = installations
            .get(&record.key())
            .map_or(false, |stored| stored.charge_status == record.charge_status);
        if unchanged {
            return Ok(());
        }

        installations.insert(record.key(), record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl DeviceInstallmentQueryPort for InMemoryBillingStore {
    async fn find_device_installments(
        &self,
        contract_ids: &[ContractId],
        billing_start_date: NaiveDate,
        billing_end_date: NaiveDate,
    ) -> Result<Vec<DeviceInstallmentMaster>, PortError> {
        self.check_query(contract_ids)?;
        let ids = requested(contract_ids);

        Ok(self
            .installments
            .iter()
            .filter(|m| {
                ids.contains(&m.contract_id)
                    && m.is_due_within(billing_start_date, billing_end_date)
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Amount, ChargeStatus};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn fee() -> Amount {
        Amount::from_str_canonical("30000").unwrap()
    }

    #[tokio::test]
    async fn test_queries_filter_by_contract() {
        let store = InMemoryBillingStore::new()
            .with_contract(ContractWithProductsAndSuspensions::new(ContractId::new(1)))
            .with_contract(ContractWithProductsAndSuspensions::new(ContractId::new(2)));

        let found = store
            .find_contracts_and_product_inventories_by_contract_ids(
                &[ContractId::new(2), ContractId::new(3)],
                date(2024, 6, 1),
                date(2024, 7, 1),
            )
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].contract_id, ContractId::new(2));
    }

    #[tokio::test]
    async fn test_installations_before_period_end() {
        let store = InMemoryBillingStore::new()
            .with_installation(InstallationHistory::new(ContractId::new(1), 1, date(2024, 6, 30), fee()))
            .with_installation(InstallationHistory::new(ContractId::new(1), 2, date(2024, 7, 1), fee()));

        let found = store
            .find_installations(&[ContractId::new(1)], date(2024, 6, 1), date(2024, 7, 1))
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].sequence, 1);
    }

    #[tokio::test]
    async fn test_unchanged_status_is_not_written() {
        let record = InstallationHistory::new(ContractId::new(1), 1, date(2024, 6, 3), fee());
        let store = InMemoryBillingStore::new().with_installation(record.clone());

        store.update_charge_status(&record).await.unwrap();
        assert_eq!(store.effective_writes(), 0);

        store.update_charge_status(&record.charged()).await.unwrap();
        store.update_charge_status(&record.charged()).await.unwrap();
        assert_eq!(store.effective_writes(), 1);

        let stored = store.installation(record.key()).await.unwrap();
        assert_eq!(stored.charge_status, ChargeStatus::Charged);
    }

    #[tokio::test]
    async fn test_failing_contract() {
        let store = InMemoryBillingStore::new().with_failing_contract(ContractId::new(7));

        let err = store
            .find_device_installments(
                &[ContractId::new(1), ContractId::new(7)],
                date(2024, 6, 1),
                date(2024, 7, 1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Query(_)));

        let record = InstallationHistory::new(ContractId::new(7), 1, date(2024, 6, 3), fee());
        let err = store.update_charge_status(&record).await.unwrap_err();
        assert!(matches!(err, PortError::Persistence(_)));
    }

    #[tokio::test]
    async fn test_transient_failures_are_consumed() {
        let store = InMemoryBillingStore::new().with_transient_failures(1);
        let ids = [ContractId::new(1)];

        let first = store
            .find_installations(&ids, date(2024, 6, 1), date(2024, 7, 1))
            .await;
        assert!(matches!(first, Err(PortError::Unavailable(_))));

        let second = store
            .find_installations(&ids, date(2024, 6, 1), date(2024, 7, 1))
            .await;
        assert!(second.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_finished_installments_not_returned() {
        let plan = |seq: i64, start: NaiveDate| {
            DeviceInstallmentMaster::from_principal(ContractId::new(1), seq, start, fee(), 3, 0)
                .unwrap()
        };
        let store = InMemoryBillingStore::new()
            .with_installment(plan(1, date(2024, 1, 1)))
            .with_installment(plan(2, date(2024, 4, 1)))
            .with_installment(plan(3, date(2024, 7, 1)));

        let found = store
            .find_device_installments(&[ContractId::new(1)], date(2024, 6, 1), date(2024, 7, 1))
            .await
            .unwrap();

        let sequences: Vec<i64> = found.iter().map(|m| m.installment_sequence).collect();
        assert_eq!(sequences, vec![2]);
    }

    #[test]
    fn test_snapshot_rejects_bad_schedule() {
        let json = r#"{
            "installments": [{
                "contract_id": 1,
                "installment_sequence": 1,
                "installment_start_date": "2024-05-01",
                "total_principal": "300",
                "schedule": ["100", "100"]
            }]
        }"#;
        let err = InMemoryBillingStore::from_json_str(json).unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::Schedule {
                source: InstallmentScheduleError::PrincipalMismatch { .. },
                ..
            }
        ));
    }
}
