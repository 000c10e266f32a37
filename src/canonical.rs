//! Canonical serialization for deterministic plan fingerprints.
//!
//! ## Determinism Guarantees
//!
//! - Stable field order: Struct fields serialize in declaration order
//! - Stable Vec order: Vectors serialize in index order
//! - No HashMap allowed: Use BTreeMap for maps in hashed data

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

/// Serialize a value to canonical JSON bytes for hashing.
///
/// # Panics
///
/// Only if `T`'s `Serialize` impl fails, which cannot happen for the plain
/// structs and string-keyed maps this crate hashes.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).expect("Canonical serialization failed")
}

/// Compute canonical hash of a serializable value.
pub fn canonical_hash<T: Serialize>(value: &T) -> u64 {
    xxh64(&to_canonical_bytes(value), 0)
}

/// Compute canonical hash and return as a 16-digit hex string.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> String {
    format!("{:016x}", canonical_hash(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExecutionStep, NodeType};

    fn step(id: &str, deps: &[&str]) -> ExecutionStep {
        ExecutionStep {
            node_id: id.into(),
            node_type: NodeType::TextToText,
            depends_on: deps.iter().map(|d| (*d).into()).collect(),
        }
    }

    #[test]
    fn test_determinism() {
        let steps = vec![step("g1", &[]), step("g2", &["g1"])];
        assert_eq!(canonical_hash(&steps), canonical_hash(&steps.clone()));
    }

    #[test]
    fn test_dependency_change_changes_hash() {
        let a = vec![step("g1", &[]), step("g2", &["g1"])];
        let b = vec![step("g1", &[]), step("g2", &[])];
        assert_ne!(canonical_hash_hex(&a), canonical_hash_hex(&b));
        assert_eq!(canonical_hash_hex(&a).len(), 16);
    }
}
