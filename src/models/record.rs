use serde_json::{Map, Value};

/// Field carrying the dialogue identifier on every normalized record.
pub const DIALOGUE_ID_FIELD: &str = "dialogue_id";
/// Field carrying the submitter identifier on every normalized record.
pub const SUBMITTER_ID_FIELD: &str = "submitter_id";

/// Flat mapping from field name to a scalar, a string sequence, or null.
pub type NormalizedRecord = Map<String, Value>;

/// Render a dialogue identifier as a report key.
///
/// Strings are used verbatim, numbers without quotes. Null and missing ids
/// yield `None` (such records cannot be grouped).
pub fn dialogue_key(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Read the submitter identifier of a record as a string, if it has one.
pub fn submitter_of(record: &NormalizedRecord) -> Option<&str> {
    record.get(SUBMITTER_ID_FIELD).and_then(Value::as_str)
}

/// True when a value carries no annotation: null, `""` or `[]`.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Type-aware equality between two present values.
///
/// Numbers compare by numeric value (`1` equals `1.0`), sequences are
/// order-sensitive, everything else is exact.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        _ => a == b,
    }
}
