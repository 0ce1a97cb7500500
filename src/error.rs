use crate::datasource::PortError;
use crate::domain::{BillingCalculationType, ContractId, EmptyPeriodError};
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

/// The run context cannot be resolved to a billing period. Fatal for the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidContextError {
    #[error("malformed billing cycle {cycle:?}: {reason}")]
    MalformedCycle { cycle: String, reason: String },
    #[error("as-of date {as_of} is before billing cycle {cycle}")]
    AsOfBeforeCycle { cycle: String, as_of: NaiveDate },
    #[error(transparent)]
    EmptyPeriod(#[from] EmptyPeriodError),
}

/// Loading a domain shape for a set of contracts failed.
#[derive(Debug, Clone, Error)]
pub enum DataLoadError {
    #[error("{what} query failed: {source}")]
    Query {
        what: &'static str,
        #[source]
        source: PortError,
    },
    #[error(transparent)]
    InvalidContext(#[from] InvalidContextError),
    #[error("no product query port registered for calculation type {0}")]
    UnresolvedPort(BillingCalculationType),
}

impl DataLoadError {
    pub fn new(what: &'static str, source: PortError) -> Self {
        DataLoadError::Query { what, source }
    }
}

/// The installment index is past the end of the schedule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "installment {installment_sequence} of contract {contract_id}: period index {index} is past the schedule ({len} periods)"
)]
pub struct ScheduleExhaustedError {
    pub contract_id: ContractId,
    pub installment_sequence: i64,
    pub index: usize,
    pub len: usize,
}

/// A matching rule names a factor that no loaded factor set carries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Error)]
#[error("rule {charge_name:?} of {scope} conditions on factor {factor_key:?}, which no billing factor set carries")]
pub struct RuleConfigurationError {
    pub scope: String,
    pub charge_name: String,
    pub factor_key: String,
}

/// Failure isolated to a single contract.
#[derive(Debug, Clone, Error)]
pub enum ContractError {
    #[error(transparent)]
    DataLoad(#[from] DataLoadError),
    #[error(transparent)]
    ScheduleExhausted(#[from] ScheduleExhaustedError),
    #[error("charge status update failed: {0}")]
    StatusUpdate(#[source] PortError),
    #[error("contract task aborted: {0}")]
    Aborted(String),
}

/// Failure that stops the whole run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    InvalidContext(#[from] InvalidContextError),
    #[error("no product query port registered for calculation type {0}")]
    NoProductQueryPort(BillingCalculationType),
}
