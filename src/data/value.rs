use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ---------------------------------------------------------------------------
// Value – a single cell in an attribute column
// ---------------------------------------------------------------------------

/// A dynamically-typed attribute value for user-defined columns
/// (lithology codes, sample numbers, area labels, ...).
/// Values are used as keys in `BTreeMap` / `BTreeSet`, so `Value` must be `Ord`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

// -- Manual Eq/Ord/Hash so we can put Value in BTreeSet and HashMap --

/// Float key used for ordering and hashing: `-0.0` is `0.0` and every NaN is
/// the same NaN.
fn float_key(v: f64) -> f64 {
    if v == 0.0 {
        0.0
    } else if v.is_nan() {
        f64::NAN
    } else {
        v
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use Value::*;
        fn rank(v: &Value) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) | Float(_) => 2,
                String(_) => 3,
            }
        }
        let ra = rank(self);
        let rb = rank(other);
        if ra != rb {
            return ra.cmp(&rb);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => float_key(*a).total_cmp(&float_key(*b)),
            // Mixed numerics compare by magnitude, integers first on ties.
            (Integer(a), Float(b)) => float_key(*a as f64)
                .total_cmp(&float_key(*b))
                .then(std::cmp::Ordering::Less),
            (Float(a), Integer(b)) => float_key(*a)
                .total_cmp(&float_key(*b as f64))
                .then(std::cmp::Ordering::Greater),
            (String(a), String(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::String(s) => s.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => float_key(*f).to_bits().hash(state),
            Value::Bool(b) => b.hash(state),
            Value::Null => {}
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => Ok(()),
        }
    }
}

impl Value {
    /// Interpret the value as an `f64` when it is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Float cell, with NaN mapped to `Null`.
    pub fn float(v: f64) -> Value {
        if v.is_nan() {
            Value::Null
        } else {
            Value::Float(v)
        }
    }

    /// Guess the type of a text cell (CSV input).
    pub fn infer(s: &str) -> Value {
        if s.is_empty() {
            return Value::Null;
        }
        if let Ok(i) = s.parse::<i64>() {
            return Value::Integer(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            return Value::float(f);
        }
        if s == "true" || s == "false" {
            return Value::Bool(s == "true");
        }
        Value::String(s.to_string())
    }

    /// Value equality used by selections: numeric values match across
    /// integer/float representations.
    pub fn matches(&self, other: &Value) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }
}

impl From<&JsonValue> for Value {
    /// Integral JSON numbers become `Integer`, other numbers `Float`. Arrays
    /// and objects are kept as their JSON text.
    fn from(val: &JsonValue) -> Self {
        match val {
            JsonValue::String(s) => Value::String(s.clone()),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    Value::String(n.to_string())
                }
            }
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Null => Value::Null,
            other => Value::String(other.to_string()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::float(v)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Build a `Vec<Value>` from anything convertible, e.g. `values(["Z", "K"])`.
pub fn values<I, T>(items: I) -> Vec<Value>
where
    I: IntoIterator<Item = T>,
    T: Into<Value>,
{
    items.into_iter().map(Into::into).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn infer_types() {
        assert_eq!(Value::infer(""), Value::Null);
        assert_eq!(Value::infer("12"), Value::Integer(12));
        assert_eq!(Value::infer("1.5"), Value::Float(1.5));
        assert_eq!(Value::infer("true"), Value::Bool(true));
        assert_eq!(Value::infer("Zk"), Value::from("Zk"));
    }

    #[test]
    fn numeric_values_match_across_types() {
        assert!(Value::Integer(2).matches(&Value::Float(2.0)));
        assert!(!Value::Integer(2).matches(&Value::from("2")));
    }

    #[test]
    fn signed_zero_and_nan_are_one_key() {
        use std::collections::HashSet;

        assert_eq!(Value::Float(-0.0), Value::Float(0.0));
        assert_eq!(Value::Float(f64::NAN), Value::Float(-f64::NAN));
        let set: HashSet<Value> = [Value::Float(-0.0), Value::Float(0.0), Value::Float(f64::NAN), Value::Float(f64::NAN)]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
        let ordered: BTreeSet<Value> = [Value::Float(-0.0), Value::Float(0.0)].into_iter().collect();
        assert_eq!(ordered.len(), 1);
    }

    #[test]
    fn json_numbers_keep_integer_type() {
        let json: JsonValue = serde_json::json!([1, 1.5, "007", null, true, [1]]);
        let cells: Vec<Value> = json.as_array().unwrap().iter().map(Value::from).collect();
        assert_eq!(
            cells,
            vec![
                Value::Integer(1),
                Value::Float(1.5),
                Value::from("007"),
                Value::Null,
                Value::Bool(true),
                Value::from("[1]"),
            ]
        );
    }

    #[test]
    fn ordering_is_total() {
        let set: BTreeSet<Value> = values([3.0, 1.0]).into_iter().chain([Value::Null]).collect();
        let ordered: Vec<_> = set.into_iter().collect();
        assert_eq!(ordered, vec![Value::Null, Value::Float(1.0), Value::Float(3.0)]);
    }
}
