//! Domain primitives: ContractId, ProductOfferingId, ChargeStatus.

use serde::{Deserialize, Serialize};

/// Contract identifier.
///
/// Ordered so that per-contract maps iterate deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContractId(pub i64);

impl ContractId {
    /// Create a ContractId from its numeric value.
    pub fn new(id: i64) -> Self {
        ContractId(id)
    }

    /// Get the underlying numeric value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for ContractId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Product offering identifier (catalog key for pricing).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProductOfferingId(pub String);

impl ProductOfferingId {
    /// Create a ProductOfferingId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        ProductOfferingId(id.into())
    }

    /// Get the identifier as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductOfferingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Billing flag on a one-time event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargeStatus {
    /// The event has not been billed yet.
    NotCharged,
    /// The event has been billed; never reverts.
    Charged,
}

impl ChargeStatus {
    pub fn is_charged(&self) -> bool {
        matches!(self, ChargeStatus::Charged)
    }
}

impl std::fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChargeStatus::NotCharged => write!(f, "NOT_CHARGED"),
            ChargeStatus::Charged => write!(f, "CHARGED"),
        }
    }
}
