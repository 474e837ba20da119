//! Canonical serialization for signatures and deterministic hashing.
//!
//! Token payloads are signed over their canonical JSON form, and the signature
//! verdict cache is keyed by a hash of the same bytes.
//!
//! ## Determinism Guarantees
//!
//! - Object keys are emitted in lexicographic order at every depth
//! - No insignificant whitespace
//! - Array order is preserved
//! - Struct field declaration order is irrelevant

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

/// Serialize a value to canonical JSON bytes.
///
/// The value passes through [`serde_json::Value`], whose object map is
/// ordered by key, so two values with equal content produce equal bytes
/// regardless of how their fields were declared.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let tree = serde_json::to_value(value)?;
    serde_json::to_vec(&tree)
}

/// Compute canonical hash of a serializable value.
pub fn canonical_hash<T: Serialize>(value: &T) -> Result<u64, serde_json::Error> {
    Ok(xxh64(&to_canonical_bytes(value)?, 0))
}

/// Compute canonical hash and return as hex string.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    Ok(format!("{:016x}", canonical_hash(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Forward {
        alpha: u32,
        beta: &'static str,
    }

    #[derive(Serialize)]
    struct Reversed {
        beta: &'static str,
        alpha: u32,
    }

    #[test]
    fn test_keys_sorted_without_whitespace() {
        let bytes = to_canonical_bytes(&Reversed { beta: "b", alpha: 1 }).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), r#"{"alpha":1,"beta":"b"}"#);
    }

    #[test]
    fn test_field_order_does_not_change_hash() {
        let a = canonical_hash(&Forward { alpha: 7, beta: "x" }).unwrap();
        let b = canonical_hash(&Reversed { beta: "x", alpha: 7 }).unwrap();
        assert_eq!(a, b);
        assert_eq!(canonical_hash_hex(&Forward { alpha: 7, beta: "x" }).unwrap().len(), 16);
    }

    #[test]
    fn test_nested_objects_sorted() {
        let value = serde_json::json!({"z": {"b": 1, "a": 2}, "a": [3, 1]});
        let bytes = to_canonical_bytes(&value).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), r#"{"a":[3,1],"z":{"a":2,"b":1}}"#);
    }
}
