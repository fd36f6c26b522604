use crate::value::Value;
use std::cmp::Ordering;

// Cross-type ordering: null < false < true < numbers < strings.
const fn primitive_rank(value: &Value) -> Option<u8> {
    match value {
        Value::Null => Some(0),
        Value::Bool(_) => Some(1),
        Value::Number(_) => Some(2),
        Value::String(_) => Some(3),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Compare two primitive values under the cross-type MIN/MAX ordering.
///
/// Returns `None` when either side is an array or object; such values have
/// no position in the ordering and make the aggregate result undefined.
#[must_use]
pub fn compare_primitives(left: &Value, right: &Value) -> Option<Ordering> {
    let left_rank = primitive_rank(left)?;
    let right_rank = primitive_rank(right)?;

    let ordering = match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64().unwrap_or(0.0);
            let b = b.as_f64().unwrap_or(0.0);
            a.total_cmp(&b)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => left_rank.cmp(&right_rank),
    };

    Some(ordering)
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cross_type_ordering_follows_rank() {
        let ordered = [
            json!(null),
            json!(false),
            json!(true),
            json!(-3),
            json!(7.5),
            json!(""),
            json!("b"),
        ];

        for pair in ordered.windows(2) {
            assert_eq!(
                compare_primitives(&pair[0], &pair[1]),
                Some(Ordering::Less),
                "{} should order before {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn composite_values_have_no_ordering() {
        assert_eq!(compare_primitives(&json!([1]), &json!(1)), None);
        assert_eq!(compare_primitives(&json!(1), &json!({"a": 1})), None);
    }

    #[test]
    fn integer_and_float_forms_compare_equal() {
        assert_eq!(
            compare_primitives(&json!(3), &json!(3.0)),
            Some(Ordering::Equal)
        );
    }
}
