use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::records::DataRecord;
use super::value::Value;

// ---------------------------------------------------------------------------
// Value sets: which values of a column are selected
// ---------------------------------------------------------------------------

/// Selected values of one column. Numbers are normalised to floats so that
/// `Integer(2)` and `Float(2.0)` select the same rows.
pub type ValueSet = BTreeSet<Value>;

fn normalised(value: &Value) -> Value {
    match value {
        Value::Integer(i) => Value::Float(*i as f64),
        other => other.clone(),
    }
}

/// Build a [`ValueSet`] from the requested values.
pub fn value_set(values: &[Value]) -> ValueSet {
    values.iter().map(normalised).collect()
}

/// How several requested values combine in an object-level selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SelectionMode {
    /// Object has at least one row matching any value.
    #[default]
    Or,
    /// Object has, across its rows, a match for every value.
    And,
}

// ---------------------------------------------------------------------------
// Index helpers
// ---------------------------------------------------------------------------

/// Per-row flags: does the row's `column` hold one of `selected`?
/// Rows without the column never match.
pub fn matching_rows<R: DataRecord>(records: &[R], column: &str, selected: &ValueSet) -> Vec<bool> {
    records
        .iter()
        .map(|r| {
            r.get(column)
                .map(|v| selected.contains(&normalised(&v)))
                .unwrap_or(false)
        })
        .collect()
}

/// Return indices of rows that belong to a qualifying object.
///
/// One pass groups the matched values per id, a second pass keeps every row
/// of a qualifying object, so non-matching rows of a kept object survive.
pub fn object_indices<R: DataRecord>(
    records: &[R],
    column: &str,
    selected: &ValueSet,
    mode: SelectionMode,
) -> Vec<usize> {
    let mut found: HashMap<&str, BTreeSet<Value>> = HashMap::new();
    for r in records {
        if let Some(v) = r.get(column) {
            let v = normalised(&v);
            if selected.contains(&v) {
                found.entry(r.id()).or_default().insert(v);
            }
        }
    }
    let qualifying: HashSet<&str> = found
        .into_iter()
        .filter(|(_, values)| match mode {
            SelectionMode::Or => !values.is_empty(),
            SelectionMode::And => values.len() == selected.len(),
        })
        .map(|(id, _)| id)
        .collect();

    records
        .iter()
        .enumerate()
        .filter(|(_, r)| qualifying.contains(r.id()))
        .map(|(i, _)| i)
        .collect()
}

/// Return indices of rows that match on their own (or do not, with `invert`).
pub fn row_indices<R: DataRecord>(
    records: &[R],
    column: &str,
    selected: &ValueSet,
    invert: bool,
) -> Vec<usize> {
    matching_rows(records, column, selected)
        .into_iter()
        .enumerate()
        .filter(|(_, hit)| *hit != invert)
        .map(|(i, _)| i)
        .collect()
}

/// Return indices of rows passing `condition` (or failing it, with `invert`).
pub fn condition_indices<R, F>(records: &[R], condition: F, invert: bool) -> Vec<usize>
where
    R: DataRecord,
    F: Fn(&R) -> bool,
{
    records
        .iter()
        .enumerate()
        .filter(|(_, r)| condition(r) != invert)
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::records::Layer;
    use crate::data::value::values;

    fn layers() -> Vec<Layer> {
        vec![
            Layer::new("A", 0.0, 1.0).with("lith", "Z"),
            Layer::new("A", 1.0, 2.0).with("lith", "K"),
            Layer::new("B", 0.0, 1.0).with("lith", "K"),
            Layer::new("C", 0.0, 1.0).with("lith", "Z"),
            Layer::new("C", 1.0, 2.0),
        ]
    }

    #[test]
    fn object_level_keeps_sibling_rows() {
        let rows = layers();
        let sel = value_set(&values(["Z"]));
        assert_eq!(object_indices(&rows, "lith", &sel, SelectionMode::Or), vec![0, 1, 3, 4]);
    }

    #[test]
    fn and_mode_needs_every_value() {
        let rows = layers();
        let sel = value_set(&values(["Z", "K"]));
        assert_eq!(object_indices(&rows, "lith", &sel, SelectionMode::And), vec![0, 1]);
        assert_eq!(object_indices(&rows, "lith", &sel, SelectionMode::Or).len(), 5);
    }

    #[test]
    fn row_level_and_inverse() {
        let rows = layers();
        let sel = value_set(&values(["Z"]));
        assert_eq!(row_indices(&rows, "lith", &sel, false), vec![0, 3]);
        // The row without a lith value is a non-match, so it appears inverted.
        assert_eq!(row_indices(&rows, "lith", &sel, true), vec![1, 2, 4]);
    }

    #[test]
    fn integers_select_floats() {
        let rows = vec![Layer::new("A", 0.0, 1.0).with("code", 2.0)];
        let sel = value_set(&values([2i64]));
        assert_eq!(row_indices(&rows, "code", &sel, false), vec![0]);
    }
}
