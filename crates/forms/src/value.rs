//! Helpers over `serde_json::Value`, the dynamic value type every field holds.
//!
//! `Value::Null` is the "unset" state. Equality between values is structural:
//! numbers compare numerically, objects compare key-by-key regardless of
//! insertion order.

use serde_json::Value;

pub use countries::only_digits;

/// Structural equality for dynamic values.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => {
            x == y
                || match (x.as_f64(), y.as_f64()) {
                    (Some(x), Some(y)) => x == y || (x.is_nan() && y.is_nan()),
                    _ => false,
                }
        }
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| deep_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| deep_equal(v, other)))
        }
        _ => false,
    }
}

/// Null or the empty string.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Numeric reading of a value: numbers as is, strings that parse to a
/// finite number, nothing else.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// Length used by length-based bounds: characters of a string, items of an
/// array, entries of an object, characters of the textual form otherwise.
pub fn length(value: &Value) -> usize {
    match value {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        other => text(other).chars().count(),
    }
}

/// Textual form of a value as a user would see it in an input.
pub fn text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn objects_compare_regardless_of_key_order() {
        let a: Value = serde_json::from_str(r#"{"size": 30, "dough": "thin"}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"dough": "thin", "size": 30}"#).unwrap();
        assert!(deep_equal(&a, &b));
        assert!(!deep_equal(&a, &json!({"dough": "thin", "size": 31})));
    }

    #[test]
    fn numbers_compare_numerically() {
        assert!(deep_equal(&json!(1), &json!(1.0)));
        assert!(!deep_equal(&json!(1), &json!("1")));
    }

    #[test]
    fn arrays_are_ordered() {
        assert!(deep_equal(&json!([1, 2]), &json!([1, 2])));
        assert!(!deep_equal(&json!([1, 2]), &json!([2, 1])));
    }

    #[test]
    fn empty_means_null_or_empty_string() {
        assert!(is_empty(&Value::Null));
        assert!(is_empty(&json!("")));
        assert!(!is_empty(&json!(" ")));
        assert!(!is_empty(&json!(0)));
        assert!(!is_empty(&json!([])));
    }

    #[test]
    fn numeric_reading() {
        assert_eq!(as_number(&json!("42")), Some(42.0));
        assert_eq!(as_number(&json!(" 4.5 ")), Some(4.5));
        assert_eq!(as_number(&json!("12a")), None);
        assert_eq!(as_number(&json!("inf")), None);
        assert_eq!(as_number(&json!(true)), None);
    }

    #[test]
    fn lengths() {
        assert_eq!(length(&json!("пицца")), 5);
        assert_eq!(length(&json!([1, 2, 3])), 3);
        assert_eq!(length(&json!(12345)), 5);
    }
}
