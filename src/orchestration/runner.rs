//! Batch runner: loads every domain shape for a set of contracts, then
//! computes each contract's charges on its own task.

use crate::config::Config;
use crate::datasource::{
    DeviceInstallmentQueryPort, InMemoryBillingStore, InstallationHistoryCommandPort,
    InstallationHistoryQueryPort,
};
use crate::domain::{
    BillingPeriod, CalculationContext, Charge, ContractId, DeviceInstallmentMaster,
    InstallationHistory, MonthlyChargeDomain,
};
use crate::engine::{
    BillingPeriodResolver, ChargeAggregator, InstallationCalculator, InstallmentCalculator,
    MonthlyFeeCalculator, PricingCatalog, StatusTransition, StatusUpdate,
};
use crate::error::{ContractError, RuleConfigurationError, RunError};
use crate::orchestration::loader::{
    ContractWithProductsAndSuspensionsDataLoader, DataLoader, DeviceInstallmentDataLoader,
    InstallationHistoryDataLoader, ProductQueryPortResolver,
};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A contract whose processing failed, entirely or in part.
///
/// Load and schedule failures withhold every charge of the contract. A failed
/// status write withholds only the installation fees that were not persisted.
#[derive(Debug, Clone)]
pub struct ContractFailure {
    pub contract_id: ContractId,
    pub error: ContractError,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalculationOutcome {
    pub run_id: Uuid,
    pub billing_period: BillingPeriod,
    pub charges: BTreeMap<ContractId, Vec<Charge>>,
    pub status_transitions: Vec<StatusTransition>,
    #[serde(skip)]
    pub failures: Vec<ContractFailure>,
    pub warnings: Vec<RuleConfigurationError>,
    /// Contracts not started because the run was cancelled.
    pub skipped: Vec<ContractId>,
}

impl CalculationOutcome {
    /// Canonical JSON of the charge map. Identical inputs render identical bytes.
    pub fn charges_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.charges)
    }

    /// Hex SHA-256 of `charges_json`.
    pub fn charges_digest(&self) -> Result<String, serde_json::Error> {
        let json = self.charges_json()?;
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }

    pub fn charge_count(&self) -> usize {
        self.charges.values().map(Vec::len).sum()
    }
}

/// Everything loaded for one contract.
#[derive(Debug)]
struct ContractInput {
    monthly: Vec<Arc<dyn MonthlyChargeDomain>>,
    installations: Vec<InstallationHistory>,
    installments: Vec<DeviceInstallmentMaster>,
}

#[derive(Debug)]
struct ContractCharges {
    charges: Vec<Charge>,
    transitions: Vec<StatusTransition>,
    factor_keys: BTreeSet<String>,
    /// First failed status write; the affected fees are not in `charges`.
    status_failure: Option<ContractError>,
}

enum ContractResult {
    Done(ContractCharges),
    Failed(ContractError),
    Skipped,
}

#[derive(Debug, Clone)]
pub struct BillingRunner {
    config: Config,
    resolver: Arc<ProductQueryPortResolver>,
    contracts: ContractWithProductsAndSuspensionsDataLoader,
    installations: InstallationHistoryDataLoader,
    installments: DeviceInstallmentDataLoader,
    installation_commands: Arc<dyn InstallationHistoryCommandPort>,
    catalog: Arc<PricingCatalog>,
}

impl BillingRunner {
    pub fn new(
        config: Config,
        resolver: ProductQueryPortResolver,
        installation_queries: Arc<dyn InstallationHistoryQueryPort>,
        installation_commands: Arc<dyn InstallationHistoryCommandPort>,
        installment_queries: Arc<dyn DeviceInstallmentQueryPort>,
        catalog: PricingCatalog,
    ) -> Self {
        let resolver = Arc::new(resolver);
        let retry = config.port_retry_max_elapsed;
        Self {
            contracts: ContractWithProductsAndSuspensionsDataLoader::new(Arc::clone(&resolver), retry),
            installations: InstallationHistoryDataLoader::new(installation_queries, retry),
            installments: DeviceInstallmentDataLoader::new(installment_queries, retry),
            resolver,
            installation_commands,
            catalog: Arc::new(catalog),
            config,
        }
    }

    /// Runner reading and writing through one in-memory store for every calculation type.
    pub fn with_store(config: Config, store: Arc<InMemoryBillingStore>, catalog: PricingCatalog) -> Self {
        let resolver = ProductQueryPortResolver::new().register_all(store.clone());
        Self::new(config, resolver, store.clone(), store.clone(), store, catalog)
    }

    /// Calculate charges for `contract_ids` under `ctx`.
    ///
    /// Fails only when the context cannot be resolved; everything else is
    /// isolated to the affected contracts and reported in the outcome.
    pub async fn run(
        &self,
        contract_ids: &[ContractId],
        ctx: &CalculationContext,
        cancel: CancellationToken,
    ) -> Result<CalculationOutcome, RunError> {
        let run_id = Uuid::new_v4();
        let billing_period = BillingPeriodResolver::derive(ctx)?;
        if self.resolver.resolve(ctx.billing_calculation_type).is_none() {
            return Err(RunError::NoProductQueryPort(ctx.billing_calculation_type));
        }

        let ids: Vec<ContractId> = contract_ids
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        tracing::info!(
            %run_id,
            calculation_type = %ctx.billing_calculation_type,
            %billing_period,
            contracts = ids.len(),
            "Starting billing run"
        );

        let chunk_size = self.config.chunk_size;
        let (
            (mut monthly, monthly_failures),
            (mut installations, installation_failures),
            (mut installments, installment_failures),
        ) = tokio::join!(
            load_chunked(&self.contracts, &ids, ctx, chunk_size),
            load_chunked(&self.installations, &ids, ctx, chunk_size),
            load_chunked(&self.installments, &ids, ctx, chunk_size),
        );

        let mut failures: BTreeMap<ContractId, ContractError> = BTreeMap::new();
        for (contract_id, error) in monthly_failures
            .into_iter()
            .chain(installation_failures)
            .chain(installment_failures)
        {
            failures.entry(contract_id).or_insert(error);
        }

        let pending: Vec<(ContractId, ContractInput)> = ids
            .iter()
            .filter(|id| !failures.contains_key(id))
            .map(|id| {
                let input = ContractInput {
                    monthly: monthly.remove(id).unwrap_or_default(),
                    installations: installations.remove(id).unwrap_or_default(),
                    installments: installments.remove(id).unwrap_or_default(),
                };
                (*id, input)
            })
            .collect();

        let calculator = MonthlyFeeCalculator::new(
            Arc::clone(&self.catalog),
            ChargeAggregator::new(self.config.amount_scale),
        );
        let persist_status = ctx.billing_calculation_type.persists_charge_status();

        let results: Vec<(ContractId, ContractResult)> = stream::iter(pending)
            .map(|(contract_id, input)| {
                let cancel = cancel.clone();
                let calculator = calculator.clone();
                let commands = Arc::clone(&self.installation_commands);
                async move {
                    if cancel.is_cancelled() {
                        return (contract_id, ContractResult::Skipped);
                    }
                    let task = tokio::spawn(process_contract(
                        contract_id,
                        input,
                        billing_period,
                        calculator,
                        persist_status.then_some(commands),
                    ));
                    let result = match task.await {
                        Ok(Ok(charges)) => ContractResult::Done(charges),
                        Ok(Err(error)) => ContractResult::Failed(error),
                        Err(join_error) => {
                            ContractResult::Failed(ContractError::Aborted(join_error.to_string()))
                        }
                    };
                    (contract_id, result)
                }
            })
            .buffer_unordered(self.config.worker_count)
            .collect()
            .await;

        let mut charges = BTreeMap::new();
        let mut transitions = BTreeMap::new();
        let mut factor_keys = BTreeSet::new();
        let mut skipped = Vec::new();

        for (contract_id, result) in results {
            match result {
                ContractResult::Done(done) => {
                    if let Some(error) = done.status_failure {
                        failures.insert(contract_id, error);
                    }
                    factor_keys.extend(done.factor_keys);
                    transitions.insert(contract_id, done.transitions);
                    charges.insert(contract_id, done.charges);
                }
                ContractResult::Failed(error) => {
                    failures.insert(contract_id, error);
                }
                ContractResult::Skipped => skipped.push(contract_id),
            }
        }
        skipped.sort();

        let warnings = self.catalog.validate_rules(&factor_keys);
        for warning in &warnings {
            tracing::warn!(%run_id, %warning, "Pricing rule references an unknown billing factor");
        }
        for (contract_id, error) in &failures {
            tracing::warn!(%run_id, %contract_id, %error, "Contract failed");
        }

        let outcome = CalculationOutcome {
            run_id,
            billing_period,
            charges,
            status_transitions: transitions.into_values().flatten().collect(),
            failures: failures
                .into_iter()
                .map(|(contract_id, error)| ContractFailure { contract_id, error })
                .collect(),
            warnings,
            skipped,
        };

        tracing::info!(
            %run_id,
            contracts = outcome.charges.len(),
            charges = outcome.charge_count(),
            transitions = outcome.status_transitions.len(),
            failures = outcome.failures.len(),
            skipped = outcome.skipped.len(),
            "Billing run finished"
        );

        Ok(outcome)
    }
}

/// Load one shape in chunks. A failed chunk is re-read contract by contract
/// so only the contracts that still fail are reported.
async fn load_chunked<T, L>(
    loader: &L,
    contract_ids: &[ContractId],
    ctx: &CalculationContext,
    chunk_size: usize,
) -> (BTreeMap<ContractId, Vec<T>>, BTreeMap<ContractId, ContractError>)
where
    T: Send,
    L: DataLoader<T>,
{
    let mut loaded = BTreeMap::new();
    let mut failures = BTreeMap::new();

    for chunk in contract_ids.chunks(chunk_size.max(1)) {
        match loader.read(chunk, ctx).await {
            Ok(records) => loaded.extend(records),
            Err(error) => {
                tracing::warn!(
                    chunk_len = chunk.len(),
                    %error,
                    "Chunk load failed, retrying contract by contract"
                );
                for contract_id in chunk {
                    match loader.read(std::slice::from_ref(contract_id), ctx).await {
                        Ok(records) => loaded.extend(records),
                        Err(error) => {
                            failures.insert(*contract_id, ContractError::DataLoad(error));
                        }
                    }
                }
            }
        }
    }

    (loaded, failures)
}

async fn process_contract(
    contract_id: ContractId,
    input: ContractInput,
    billing_period: BillingPeriod,
    calculator: MonthlyFeeCalculator,
    commands: Option<Arc<dyn InstallationHistoryCommandPort>>,
) -> Result<ContractCharges, ContractError> {
    let monthly = calculator.calculate(contract_id, &input.monthly, &billing_period);
    let mut charges = monthly.charges;

    for master in &input.installments {
        if let Some(charge) = InstallmentCalculator::calculate(master, &billing_period)? {
            charges.push(charge);
        }
    }

    let mut billable = Vec::new();
    for record in input.installations {
        if let Some(charge) = InstallationCalculator::calculate(&record, &billing_period) {
            billable.push((record, charge));
        }
    }

    // Status moves only once every charge of the contract is computed. A fee
    // whose status write fails is withheld so the record stays billable.
    let mut transitions = Vec::new();
    let mut status_failure = None;
    match commands {
        Some(commands) => {
            for (mut record, charge) in billable {
                match InstallationCalculator::mark_charged(&mut record, commands.as_ref()).await {
                    Ok(update) => {
                        if let StatusUpdate::Transitioned(transition) = update {
                            transitions.push(transition);
                        }
                        charges.push(charge);
                    }
                    Err(error) => {
                        tracing::warn!(
                            %contract_id,
                            sequence = record.sequence,
                            %error,
                            "Installation fee withheld, charge status not persisted"
                        );
                        status_failure.get_or_insert(ContractError::StatusUpdate(error));
                    }
                }
            }
        }
        None => charges.extend(billable.into_iter().map(|(_, charge)| charge)),
    }

    tracing::debug!(
        %contract_id,
        charges = charges.len(),
        transitions = transitions.len(),
        "Contract calculated"
    );

    Ok(ContractCharges {
        charges,
        transitions,
        factor_keys: monthly.factor_keys,
        status_failure,
    })
}
