//! Size estimation policies for memory-bounded caches.
//!
//! Sizes are estimates. An estimator never fails: values it cannot measure
//! are charged [`FALLBACK_ESTIMATE`](crate::constants::size::FALLBACK_ESTIMATE).

use serde::Serialize;
use serde_json::Value;
use tracing::trace;

use crate::constants::size::{BOOL_SIZE, BYTES_PER_CHAR, FALLBACK_ESTIMATE, NUMBER_SIZE};

/// Policy that estimates how many bytes a cached value occupies.
pub trait SizeEstimator<V: ?Sized>: Send + Sync {
    fn estimate(&self, value: &V) -> usize;
}

impl<V: ?Sized, F> SizeEstimator<V> for F
where
    F: Fn(&V) -> usize + Send + Sync,
{
    fn estimate(&self, value: &V) -> usize {
        self(value)
    }
}

/// Charges every value the same number of bytes.
#[derive(Debug, Clone, Copy)]
pub struct FixedSizeEstimator(pub usize);

impl<V: ?Sized> SizeEstimator<V> for FixedSizeEstimator {
    fn estimate(&self, _value: &V) -> usize {
        self.0
    }
}

/// Estimates any serializable value through its JSON representation.
///
/// Booleans and numbers get fixed sizes, strings are charged per character,
/// composites by their serialized length. Values serde refuses to serialize
/// (maps with non-string keys, failing `Serialize` impls) get the fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSizeEstimator;

impl<V: Serialize + ?Sized> SizeEstimator<V> for JsonSizeEstimator {
    fn estimate(&self, value: &V) -> usize {
        match serde_json::to_value(value) {
            Ok(json) => estimate_json(&json),
            Err(e) => {
                trace!(error = %e, "Size estimation fell back to default");
                FALLBACK_ESTIMATE
            }
        }
    }
}

/// Estimate a JSON value's footprint
pub fn estimate_json(value: &Value) -> usize {
    match value {
        Value::Null => 0,
        Value::Bool(_) => BOOL_SIZE,
        Value::Number(_) => NUMBER_SIZE,
        Value::String(s) => s.encode_utf16().count() * BYTES_PER_CHAR,
        Value::Array(_) | Value::Object(_) => match serde_json::to_string(value) {
            Ok(text) => text.encode_utf16().count() * BYTES_PER_CHAR,
            Err(_) => FALLBACK_ESTIMATE,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::Error as _;
    use std::collections::HashMap;

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _s: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("not supported"))
        }
    }

    #[test]
    fn test_scalar_estimates() {
        assert_eq!(JsonSizeEstimator.estimate(&true), BOOL_SIZE);
        assert_eq!(JsonSizeEstimator.estimate(&42.5f64), NUMBER_SIZE);
        assert_eq!(JsonSizeEstimator.estimate("abcd"), 8);
    }

    #[test]
    fn test_composite_uses_serialized_length() {
        let values = vec![1, 2, 3];
        // "[1,2,3]" is 7 characters
        assert_eq!(JsonSizeEstimator.estimate(&values), 14);
    }

    #[test]
    fn test_unserializable_falls_back() {
        assert_eq!(JsonSizeEstimator.estimate(&Unserializable), FALLBACK_ESTIMATE);

        let mut tuple_keys = HashMap::new();
        tuple_keys.insert((1, 2), "x");
        assert_eq!(JsonSizeEstimator.estimate(&tuple_keys), FALLBACK_ESTIMATE);
    }

    #[test]
    fn test_closure_and_fixed_estimators() {
        let by_len = |v: &Vec<u8>| v.len();
        assert_eq!(by_len.estimate(&vec![0u8; 40]), 40);
        assert_eq!(FixedSizeEstimator(16).estimate(&"anything"), 16);
    }
}
