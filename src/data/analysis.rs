//! Per-object aggregates of layered data.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::filter;
use super::records::Layer;
use super::table::LayeredData;
use super::value::Value;
use crate::error::{Result, StratumError};
use crate::reference::VerticalReference;

// ---------------------------------------------------------------------------
// ObjectTable – one row per object, one column per requested value
// ---------------------------------------------------------------------------

/// Result of a per-object aggregate. `None` marks "not found".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectTable {
    ids: Vec<String>,
    columns: BTreeMap<String, Vec<Option<f64>>>,
}

impl ObjectTable {
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Single cell; `None` when the id or column is unknown or the cell is
    /// "not found".
    pub fn value(&self, id: &str, column: &str) -> Option<f64> {
        let row = self.ids.iter().position(|i| i == id)?;
        self.columns.get(column)?[row]
    }

    /// Column keyed by id, ready for a header join. "Not found" becomes `Null`.
    pub fn keyed(&self, column: &str) -> HashMap<String, Value> {
        match self.columns.get(column) {
            Some(cells) => self
                .ids
                .iter()
                .zip(cells)
                .map(|(id, v)| (id.clone(), v.map(Value::float).unwrap_or(Value::Null)))
                .collect(),
            None => HashMap::new(),
        }
    }
}

/// Column name for a value, e.g. `Z` or `2`.
fn label(value: &Value) -> String {
    value.to_string()
}

fn check_values(data: &LayeredData, column: &str, values: &[Value]) -> Result<()> {
    if !data.has_column(column) {
        return Err(StratumError::UnknownColumn(column.to_string()));
    }
    if values.is_empty() {
        return Err(StratumError::Schema(format!(
            "no values given for column '{column}'"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Cumulative thickness
// ---------------------------------------------------------------------------

impl LayeredData {
    /// Summed thickness of layers whose `column` equals each value, per
    /// object. Objects without a matching layer get `0.0`, never "not found".
    pub fn get_cumulative_layer_thickness(&self, column: &str, values: &[Value]) -> Result<ObjectTable> {
        check_values(self, column, values)?;
        let ranges = self.object_ranges();
        let ids: Vec<String> = ranges.iter().map(|(id, _)| id.to_string()).collect();
        let mut columns = BTreeMap::new();

        for value in values {
            let selected = filter::value_set(std::slice::from_ref(value));
            let hits = filter::matching_rows(self.records(), column, &selected);
            let sums = ranges
                .iter()
                .map(|(_, range)| {
                    let total: f64 = self.records()[range.clone()]
                        .iter()
                        .zip(&hits[range.clone()])
                        .filter(|(_, hit)| **hit)
                        .map(|(layer, _)| layer.thickness())
                        .sum();
                    Some(total)
                })
                .collect();
            columns.insert(label(value), sums);
        }
        Ok(ObjectTable { ids, columns })
    }

    /// Depth below the surface of the first run of layers matching each value
    /// that is at least `min_thickness` thick below `min_depth`.
    ///
    /// Adjacent matching layers are merged into one run before the thickness
    /// test. A run partly above `min_depth` is clipped there. Objects without
    /// a qualifying run get "not found".
    pub fn get_layer_top(
        &self,
        column: &str,
        values: &[Value],
        min_thickness: f64,
        min_depth: f64,
    ) -> Result<ObjectTable> {
        check_values(self, column, values)?;
        let reference = self.vertical_reference();
        let ranges = self.object_ranges();
        let ids: Vec<String> = ranges.iter().map(|(id, _)| id.to_string()).collect();
        let mut columns = BTreeMap::new();

        for value in values {
            let selected = filter::value_set(std::slice::from_ref(value));
            let hits = filter::matching_rows(self.records(), column, &selected);
            let tops = ranges
                .iter()
                .map(|(_, range)| {
                    let layers = &self.records()[range.clone()];
                    let runs = matching_runs(layers, &hits[range.clone()], reference);
                    runs.into_iter().find_map(|(top, bottom)| {
                        let top = top.max(min_depth);
                        let thickness = bottom - top;
                        (thickness > 0.0 && thickness >= min_thickness).then_some(top)
                    })
                })
                .collect();
            columns.insert(label(value), tops);
        }
        Ok(ObjectTable { ids, columns })
    }
}

/// Depth ranges of consecutive matching layers of one object.
fn matching_runs(
    layers: &[Layer],
    hits: &[bool],
    reference: VerticalReference,
) -> Vec<(f64, f64)> {
    let mut runs: Vec<(f64, f64)> = Vec::new();
    let mut open = false;
    for (layer, hit) in layers.iter().zip(hits) {
        if !*hit {
            open = false;
            continue;
        }
        let (top, bottom) = layer.depth_range(reference);
        match runs.last_mut() {
            Some(run) if open => run.1 = run.1.max(bottom),
            _ => runs.push((top, bottom)),
        }
        open = true;
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::value::values;

    fn data() -> LayeredData {
        let rows = vec![
            Layer::new("A", 0.0, 1.0).with("lith", "K"),
            Layer::new("A", 1.0, 1.5).with("lith", "Z"),
            Layer::new("A", 1.5, 2.0).with("lith", "Z"),
            Layer::new("A", 2.0, 3.0).with("lith", "K"),
            Layer::new("A", 3.0, 6.0).with("lith", "Z"),
            Layer::new("B", 0.0, 2.0).with("lith", "K"),
        ];
        LayeredData::new(rows, VerticalReference::Depth)
    }

    #[test]
    fn cumulative_thickness_zero_for_missing() {
        let table = data()
            .get_cumulative_layer_thickness("lith", &values(["Z", "V"]))
            .unwrap();
        assert_eq!(table.value("A", "Z"), Some(4.0));
        assert_eq!(table.value("B", "Z"), Some(0.0));
        assert_eq!(table.value("A", "V"), Some(0.0));
        assert_eq!(table.ids(), &["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn layer_top_merges_runs() {
        let d = data();
        let top = d.get_layer_top("lith", &values(["Z"]), 0.0, 0.0).unwrap();
        assert_eq!(top.value("A", "Z"), Some(1.0));
        assert_eq!(top.value("B", "Z"), None);

        // The first run is 1 m thick when merged, so 0.8 m still finds it.
        let top = d.get_layer_top("lith", &values(["Z"]), 0.8, 0.0).unwrap();
        assert_eq!(top.value("A", "Z"), Some(1.0));
        let top = d.get_layer_top("lith", &values(["Z"]), 1.5, 0.0).unwrap();
        assert_eq!(top.value("A", "Z"), Some(3.0));
    }

    #[test]
    fn layer_top_respects_min_depth() {
        let top = data().get_layer_top("lith", &values(["Z"]), 0.0, 1.7).unwrap();
        assert_eq!(top.value("A", "Z"), Some(1.7));
        let top = data().get_layer_top("lith", &values(["Z"]), 0.5, 1.7).unwrap();
        assert_eq!(top.value("A", "Z"), Some(3.0));
    }

    #[test]
    fn keyed_column_uses_null_for_not_found() {
        let top = data().get_layer_top("lith", &values(["Z"]), 0.0, 0.0).unwrap();
        let keyed = top.keyed("Z");
        assert_eq!(keyed["A"], Value::Float(1.0));
        assert_eq!(keyed["B"], Value::Null);
    }

    #[test]
    fn unknown_column_fails() {
        assert!(data().get_cumulative_layer_thickness("colour", &values(["Z"])).is_err());
    }
}
