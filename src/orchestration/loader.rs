//! Data loaders: fetch one domain shape for a set of contracts, grouped by contract.

use crate::datasource::{
    DeviceInstallmentQueryPort, InstallationHistoryQueryPort, PortError, ProductQueryPort,
};
use crate::domain::{
    BillingCalculationType, CalculationContext, ContractId, DeviceInstallmentMaster,
    InstallationHistory, MonthlyChargeDomain,
};
use crate::engine::BillingPeriodResolver;
use crate::error::DataLoadError;
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Loads records of one shape for a batch of contracts.
#[async_trait]
pub trait DataLoader<T: Send>: Send + Sync {
    /// Records grouped by contract. Every requested id is a key of the
    /// result, with an empty vec when nothing was found.
    async fn read(
        &self,
        contract_ids: &[ContractId],
        ctx: &CalculationContext,
    ) -> Result<BTreeMap<ContractId, Vec<T>>, DataLoadError>;
}

/// Explicit registry of product query strategies by calculation type.
#[derive(Debug, Clone, Default)]
pub struct ProductQueryPortResolver {
    ports: HashMap<BillingCalculationType, Arc<dyn ProductQueryPort>>,
}

impl ProductQueryPortResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        mut self,
        calculation_type: BillingCalculationType,
        port: Arc<dyn ProductQueryPort>,
    ) -> Self {
        self.ports.insert(calculation_type, port);
        self
    }

    /// Register one port for every calculation type.
    pub fn register_all(self, port: Arc<dyn ProductQueryPort>) -> Self {
        BillingCalculationType::ALL
            .into_iter()
            .fold(self, |resolver, t| resolver.register(t, Arc::clone(&port)))
    }

    pub fn resolve(
        &self,
        calculation_type: BillingCalculationType,
    ) -> Option<Arc<dyn ProductQueryPort>> {
        self.ports.get(&calculation_type).cloned()
    }
}

/// Run a port call, retrying while it reports the backend unavailable.
async fn query_with_retry<T, F, Fut>(
    what: &'static str,
    max_elapsed: Duration,
    mut op: F,
) -> Result<T, DataLoadError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PortError>>,
{
    let backoff = ExponentialBackoff {
        max_elapsed_time: Some(max_elapsed),
        ..Default::default()
    };

    retry(backoff, || {
        let call = op();
        async move {
            call.await.map_err(|e| {
                if e.is_transient() {
                    tracing::debug!(query = what, error = %e, "Port unavailable, retrying");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        }
    })
    .await
    .map_err(|e| DataLoadError::new(what, e))
}

fn group_by_contract<T>(
    contract_ids: &[ContractId],
    records: impl IntoIterator<Item = T>,
    contract_of: impl Fn(&T) -> ContractId,
) -> BTreeMap<ContractId, Vec<T>> {
    let mut grouped: BTreeMap<ContractId, Vec<T>> =
        contract_ids.iter().map(|id| (*id, Vec::new())).collect();

    for record in records {
        let contract_id = contract_of(&record);
        match grouped.get_mut(&contract_id) {
            Some(records) => records.push(record),
            None => tracing::warn!(
                contract_id = %contract_id,
                "Port returned a record for a contract that was not requested"
            ),
        }
    }

    grouped
}

#[derive(Debug, Clone)]
pub struct ContractWithProductsAndSuspensionsDataLoader {
    resolver: Arc<ProductQueryPortResolver>,
    retry_max_elapsed: Duration,
}

impl ContractWithProductsAndSuspensionsDataLoader {
    pub fn new(resolver: Arc<ProductQueryPortResolver>, retry_max_elapsed: Duration) -> Self {
        Self {
            resolver,
            retry_max_elapsed,
        }
    }
}

#[async_trait]
impl DataLoader<Arc<dyn MonthlyChargeDomain>> for ContractWithProductsAndSuspensionsDataLoader {
    async fn read(
        &self,
        contract_ids: &[ContractId],
        ctx: &CalculationContext,
    ) -> Result<BTreeMap<ContractId, Vec<Arc<dyn MonthlyChargeDomain>>>, DataLoadError> {
        let billing_period = BillingPeriodResolver::derive(ctx)?;
        let port = self
            .resolver
            .resolve(ctx.billing_calculation_type)
            .ok_or(DataLoadError::UnresolvedPort(ctx.billing_calculation_type))?;

        let contracts = query_with_retry("product", self.retry_max_elapsed, || {
            port.find_contracts_and_product_inventories_by_contract_ids(
                contract_ids,
                billing_period.start_date(),
                billing_period.end_date(),
            )
        })
        .await?;

        Ok(group_by_contract(
            contract_ids,
            contracts
                .into_iter()
                .map(|c| Arc::new(c) as Arc<dyn MonthlyChargeDomain>),
            |c| c.contract_id(),
        ))
    }
}

#[derive(Debug, Clone)]
pub struct InstallationHistoryDataLoader {
    port: Arc<dyn InstallationHistoryQueryPort>,
    retry_max_elapsed: Duration,
}

impl InstallationHistoryDataLoader {
    pub fn new(port: Arc<dyn InstallationHistoryQueryPort>, retry_max_elapsed: Duration) -> Self {
        Self {
            port,
            retry_max_elapsed,
        }
    }
}

#[async_trait]
impl DataLoader<InstallationHistory> for InstallationHistoryDataLoader {
    /// Records of each contract are ordered by sequence.
    async fn read(
        &self,
        contract_ids: &[ContractId],
        ctx: &CalculationContext,
    ) -> Result<BTreeMap<ContractId, Vec<InstallationHistory>>, DataLoadError> {
        let billing_period = BillingPeriodResolver::derive(ctx)?;

        let mut records = query_with_retry("installation history", self.retry_max_elapsed, || {
            self.port.find_installations(
                contract_ids,
                billing_period.start_date(),
                billing_period.end_date(),
            )
        })
        .await?;
        records.sort_by_key(|r| r.key());

        Ok(group_by_contract(contract_ids, records, |r| r.contract_id))
    }
}

#[derive(Debug, Clone)]
pub struct DeviceInstallmentDataLoader {
    port: Arc<dyn DeviceInstallmentQueryPort>,
    retry_max_elapsed: Duration,
}

impl DeviceInstallmentDataLoader {
    pub fn new(port: Arc<dyn DeviceInstallmentQueryPort>, retry_max_elapsed: Duration) -> Self {
        Self {
            port,
            retry_max_elapsed,
        }
    }
}

#[async_trait]
impl DataLoader<DeviceInstallmentMaster> for DeviceInstallmentDataLoader {
    async fn read(
        &self,
        contract_ids: &[ContractId],
        ctx: &CalculationContext,
    ) -> Result<BTreeMap<ContractId, Vec<DeviceInstallmentMaster>>, DataLoadError> {
        let billing_period = BillingPeriodResolver::derive(ctx)?;

        let mut masters = query_with_retry("device installment", self.retry_max_elapsed, || {
            self.port.find_device_installments(
                contract_ids,
                billing_period.start_date(),
                billing_period.end_date(),
            )
        })
        .await?;
        masters.sort_by_key(|m| (m.contract_id, m.installment_sequence));

        Ok(group_by_contract(contract_ids, masters, |m| m.contract_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::InMemoryBillingStore;
    use crate::domain::{Amount, ContractWithProductsAndSuspensions};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn june_ctx(calculation_type: BillingCalculationType) -> CalculationContext {
        CalculationContext::new(calculation_type, "202406", date(2024, 6, 20))
    }

    fn fee() -> Amount {
        Amount::from_str_canonical("100").unwrap()
    }

    #[tokio::test]
    async fn test_every_requested_contract_is_present() {
        let store = Arc::new(
            InMemoryBillingStore::new()
                .with_contract(ContractWithProductsAndSuspensions::new(ContractId::new(1))),
        );
        let resolver = Arc::new(ProductQueryPortResolver::new().register_all(store));
        let loader = ContractWithProductsAndSuspensionsDataLoader::new(resolver, Duration::ZERO);

        let loaded = loader
            .read(
                &[ContractId::new(1), ContractId::new(2)],
                &june_ctx(BillingCalculationType::Regular),
            )
            .await
            .unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[&ContractId::new(1)].len(), 1);
        assert!(loaded[&ContractId::new(2)].is_empty());
    }

    #[tokio::test]
    async fn test_resolver_selects_port_by_type() {
        let regular = Arc::new(
            InMemoryBillingStore::new()
                .with_contract(ContractWithProductsAndSuspensions::new(ContractId::new(1))),
        );
        let preview = Arc::new(InMemoryBillingStore::new());
        let resolver = Arc::new(
            ProductQueryPortResolver::new()
                .register(BillingCalculationType::Regular, regular)
                .register(BillingCalculationType::Preview, preview),
        );
        let loader = ContractWithProductsAndSuspensionsDataLoader::new(resolver, Duration::ZERO);
        let ids = [ContractId::new(1)];

        let from_regular = loader
            .read(&ids, &june_ctx(BillingCalculationType::Regular))
            .await
            .unwrap();
        let from_preview = loader
            .read(&ids, &june_ctx(BillingCalculationType::Preview))
            .await
            .unwrap();
        let unresolved = loader
            .read(&ids, &june_ctx(BillingCalculationType::Adjustment))
            .await;

        assert_eq!(from_regular[&ContractId::new(1)].len(), 1);
        assert!(from_preview[&ContractId::new(1)].is_empty());
        assert!(matches!(
            unresolved,
            Err(DataLoadError::UnresolvedPort(BillingCalculationType::Adjustment))
        ));
    }

    #[tokio::test]
    async fn test_installations_sorted_by_sequence() {
        let store = Arc::new(
            InMemoryBillingStore::new()
                .with_installation(InstallationHistory::new(ContractId::new(1), 2, date(2024, 6, 2), fee()))
                .with_installation(InstallationHistory::new(ContractId::new(1), 1, date(2024, 6, 9), fee())),
        );
        let loader = InstallationHistoryDataLoader::new(store, Duration::ZERO);

        let loaded = loader
            .read(&[ContractId::new(1)], &june_ctx(BillingCalculationType::Regular))
            .await
            .unwrap();

        let sequences: Vec<_> = loaded[&ContractId::new(1)].iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let store = Arc::new(InMemoryBillingStore::new().with_transient_failures(1));
        let loader = DeviceInstallmentDataLoader::new(store, Duration::from_secs(10));

        let loaded = loader
            .read(&[ContractId::new(1)], &june_ctx(BillingCalculationType::Regular))
            .await
            .unwrap();

        assert!(loaded[&ContractId::new(1)].is_empty());
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let store = Arc::new(InMemoryBillingStore::new().with_failing_contract(ContractId::new(1)));
        let loader = DeviceInstallmentDataLoader::new(store, Duration::from_secs(10));

        let err = loader
            .read(&[ContractId::new(1)], &june_ctx(BillingCalculationType::Regular))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DataLoadError::Query {
                what: "device installment",
                source: PortError::Query(_)
            }
        ));
    }

    #[tokio::test]
    async fn test_invalid_context_fails_load() {
        let store = Arc::new(InMemoryBillingStore::new());
        let loader = InstallationHistoryDataLoader::new(store, Duration::ZERO);
        let ctx = CalculationContext::regular("2024-13", date(2024, 6, 1));

        let err = loader.read(&[ContractId::new(1)], &ctx).await.unwrap_err();
        assert!(matches!(err, DataLoadError::InvalidContext(_)));
    }
}
