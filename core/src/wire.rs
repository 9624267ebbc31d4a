//! Helpers shared by the entity serializers.

use serde_json::{Map, Number, Value};

/// Largest integer an `f64` represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Render a number the way the server writes it: integral values as JSON
/// integers, everything else as a float. Non-finite values become `null`.
pub(crate) fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < MAX_SAFE_INTEGER {
        return Value::from(value as i64);
    }
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

pub(crate) fn exclude_keys(map: &mut Map<String, Value>, keys: &[&str]) {
    for key in keys {
        map.shift_remove(*key);
    }
}

/// Read a count field that the schema already accepted as a number.
pub(crate) fn count_value(value: &Value) -> Option<usize> {
    value
        .as_u64()
        .map(|n| n as usize)
        .or_else(|| value.as_f64().map(|n| n.max(0.0) as usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integral_numbers_are_written_as_integers() {
        assert_eq!(number_value(30.0), json!(30));
        assert_eq!(number_value(-2.0), json!(-2));
        assert_eq!(number_value(2.5), json!(2.5));
        assert_eq!(number_value(f64::NAN), Value::Null);
    }

    #[test]
    fn exclude_keys_keeps_the_rest_in_order() {
        let mut map = json!({ "a": 1, "b": 2, "c": 3 }).as_object().unwrap().clone();
        exclude_keys(&mut map, &["a", "b", "missing"]);
        assert_eq!(Value::Object(map), json!({ "c": 3 }));
    }

    #[test]
    fn counts_accept_floats() {
        assert_eq!(count_value(&json!(4)), Some(4));
        assert_eq!(count_value(&json!(4.0)), Some(4));
        assert_eq!(count_value(&json!("4")), None);
    }
}
