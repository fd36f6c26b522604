//! Module: value
//! Responsibility: structured document values plus the numeric, ordering,
//! and hashing helpers the aggregation stages share.
//! Does not own: wire decoding of continuation tokens.

mod hash;
mod order;

pub use hash::{ContentHash, hash_value};
pub use order::compare_primitives;
pub use serde_json::Value;

#[cfg(test)]
pub(crate) use hash::with_test_hash_override;

// Largest magnitude below which every integral f64 is exactly representable.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Build a canonical JSON number.
///
/// Integral values inside the exactly-representable range become integer
/// numbers so `35.0` and `35` compare and hash identically after folding.
/// Non-finite input has no JSON form and yields `None`.
#[must_use]
#[expect(clippy::cast_possible_truncation)]
pub fn number(x: f64) -> Option<Value> {
    if !x.is_finite() {
        return None;
    }

    if x.fract() == 0.0 && x.abs() <= MAX_SAFE_INTEGER {
        return Some(Value::from(x as i64));
    }

    serde_json::Number::from_f64(x).map(Value::Number)
}

/// Read a JSON number as f64, `None` for every other value kind.
#[must_use]
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integral_numbers_are_canonicalized_to_integers() {
        assert_eq!(number(35.0), Some(json!(35)));
        assert_eq!(number(-2.0), Some(json!(-2)));
        assert_eq!(number(2.5), Some(json!(2.5)));
    }

    #[test]
    fn non_finite_numbers_have_no_json_form() {
        assert_eq!(number(f64::NAN), None);
        assert_eq!(number(f64::INFINITY), None);
    }

    #[test]
    fn as_number_ignores_non_numbers() {
        assert_eq!(as_number(&json!(4)), Some(4.0));
        assert_eq!(as_number(&json!("4")), None);
        assert_eq!(as_number(&Value::Null), None);
    }
}
