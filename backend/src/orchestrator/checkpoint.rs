//! Checkpoint - Ledger Snapshots and Digests
//!
//! Captures the ledger at a step boundary and reduces it to a SHA256 digest,
//! so two runs can be compared without diffing every entry.
//!
//! # Critical Invariants
//!
//! - **Determinism**: same seed + config produces the same digest at every step
//! - **Canonical form**: object keys are sorted before hashing, entries are
//!   ordered by id

use crate::models::environment::Environment;
use crate::models::transaction::{Transaction, TransactionKind};
use crate::orchestrator::SimulationError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

// ============================================================================
// Snapshot Structures
// ============================================================================

/// Ledger state at a step boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Number of completed steps
    pub step: usize,

    /// Live entries, ordered by id
    pub entries: Vec<EntrySnapshot>,

    /// Run-level parameters (prices)
    pub parameters: BTreeMap<String, f64>,
}

/// One ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub id: u64,
    pub kind: TransactionKind,
    pub from: String,
    pub to: String,
    pub amount: f64,
    pub interest_rate: f64,
    pub origin_time: usize,
    pub duration: i64,
}

impl From<&Transaction> for EntrySnapshot {
    fn from(tx: &Transaction) -> Self {
        EntrySnapshot {
            id: tx.id().value(),
            kind: tx.kind(),
            from: tx.from().to_string(),
            to: tx.to().to_string(),
            amount: tx.amount(),
            interest_rate: tx.interest_rate(),
            origin_time: tx.origin_time(),
            duration: tx.duration(),
        }
    }
}

impl LedgerSnapshot {
    pub fn capture(env: &Environment, step: usize) -> Self {
        LedgerSnapshot {
            step,
            entries: env.transactions().map(EntrySnapshot::from).collect(),
            parameters: env.variable_parameters().clone(),
        }
    }

    /// Sum of entry amounts of one kind
    pub fn total(&self, kind: TransactionKind) -> f64 {
        self.entries
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.amount)
            .sum()
    }
}

// ============================================================================
// Hashing
// ============================================================================

/// Compute deterministic SHA256 hash of any serializable value
///
/// Uses canonical JSON serialization with sorted keys to ensure
/// deterministic hashing regardless of map iteration order.
pub fn compute_config_hash<T: Serialize>(config: &T) -> Result<String, SimulationError> {
    use serde_json::Value;

    let value = serde_json::to_value(config).map_err(|e| {
        SimulationError::SerializationError(format!("Config serialization failed: {}", e))
    })?;

    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let json = serde_json::to_string(&canonicalize(value)).map_err(|e| {
        SimulationError::SerializationError(format!("Config serialization failed: {}", e))
    })?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Digest of the live ledger and parameters of an environment
pub fn compute_ledger_digest(env: &Environment, step: usize) -> Result<String, SimulationError> {
    compute_config_hash(&LedgerSnapshot::capture(env, step))
}
