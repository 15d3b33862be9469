use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::Range;

use serde::{Deserialize, Serialize};

use super::filter::{self, SelectionMode};
use super::header::{HeaderRecord, PointHeader};
use super::records::{DataRecord, Layer, Measurement};
use super::value::Value;
use crate::error::{Result, StratumError};
use crate::reference::{convert_vertical, HorizontalReference, Transformer, VerticalReference};

// ---------------------------------------------------------------------------
// DataTable – rows of every object, grouped by id
// ---------------------------------------------------------------------------

/// Rows of one or more objects. Rows of an object are contiguous and ordered
/// from shallow to deep; objects keep the order in which they first appear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTable<R> {
    records: Vec<R>,
    /// Attribute column names (excludes the built-in columns).
    attribute_columns: Vec<String>,
    vertical_reference: VerticalReference,
}

/// Interval rows (borehole descriptions).
pub type LayeredData = DataTable<Layer>;
/// Point rows (CPT samples, logs).
pub type DiscreteData = DataTable<Measurement>;

impl<R: DataRecord> DataTable<R> {
    /// Build a table, grouping rows by id and sorting each group by depth.
    pub fn new(mut records: Vec<R>, vertical_reference: VerticalReference) -> Self {
        let mut order: HashMap<String, usize> = HashMap::new();
        for r in &records {
            let next = order.len();
            order.entry(r.id().to_string()).or_insert(next);
        }
        records.sort_by(|a, b| {
            order[a.id()]
                .cmp(&order[b.id()])
                .then(a.sort_depth(vertical_reference).total_cmp(&b.sort_depth(vertical_reference)))
        });
        Self::from_sorted(records, vertical_reference)
    }

    /// Build from rows that are already grouped and sorted.
    pub(crate) fn from_sorted(records: Vec<R>, vertical_reference: VerticalReference) -> Self {
        let columns: BTreeSet<&String> = records.iter().flat_map(|r| r.attributes().keys()).collect();
        let attribute_columns = columns.into_iter().cloned().collect();
        Self {
            records,
            attribute_columns,
            vertical_reference,
        }
    }

    /// Keep the rows at `indices` (ascending).
    fn take(&self, indices: &[usize]) -> Self {
        let records = indices.iter().map(|&i| self.records[i].clone()).collect();
        log::debug!(
            "{} selection kept {} of {} rows",
            R::KIND,
            indices.len(),
            self.records.len()
        );
        Self::from_sorted(records, self.vertical_reference)
    }

    // ---- accessors ----

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn into_records(self) -> Vec<R> {
        self.records
    }

    pub fn vertical_reference(&self) -> VerticalReference {
        self.vertical_reference
    }

    /// Unique ids in table order.
    pub fn ids(&self) -> Vec<&str> {
        self.object_ranges().into_iter().map(|(id, _)| id).collect()
    }

    pub fn id_set(&self) -> HashSet<&str> {
        self.records.iter().map(|r| r.id()).collect()
    }

    pub fn n_objects(&self) -> usize {
        self.object_ranges().len()
    }

    pub fn attribute_columns(&self) -> &[String] {
        &self.attribute_columns
    }

    /// Built-in plus attribute column names.
    pub fn columns(&self) -> Vec<String> {
        R::builtin_columns()
            .into_iter()
            .map(str::to_string)
            .chain(self.attribute_columns.iter().cloned())
            .collect()
    }

    pub fn has_column(&self, column: &str) -> bool {
        R::builtin_columns().contains(&column) || self.attribute_columns.iter().any(|c| c == column)
    }

    fn require_column(&self, column: &str) -> Result<()> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(StratumError::UnknownColumn(column.to_string()))
        }
    }

    /// All values of a column in row order; missing cells are `Null`.
    pub fn column(&self, column: &str) -> Result<Vec<Value>> {
        self.require_column(column)?;
        Ok(self
            .records
            .iter()
            .map(|r| r.get(column).unwrap_or(Value::Null))
            .collect())
    }

    /// Row ranges of every object, in table order.
    pub fn object_ranges(&self) -> Vec<(&str, Range<usize>)> {
        let mut ranges: Vec<(&str, Range<usize>)> = Vec::new();
        for (i, r) in self.records.iter().enumerate() {
            match ranges.last_mut() {
                Some((id, range)) if *id == r.id() => range.end = i + 1,
                _ => ranges.push((r.id(), i..i + 1)),
            }
        }
        ranges
    }

    /// Rows of one object.
    pub fn object(&self, id: &str) -> &[R] {
        match self.object_ranges().into_iter().find(|(object, _)| *object == id) {
            Some((_, range)) => &self.records[range],
            None => &[],
        }
    }

    // ---- selections ----

    /// Keep every row of objects that have rows matching `values` in
    /// `column`; see [`SelectionMode`] for how several values combine.
    pub fn select_by_values(
        &self,
        column: &str,
        values: &[Value],
        mode: SelectionMode,
    ) -> Result<Self> {
        self.require_column(column)?;
        let selected = filter::value_set(values);
        Ok(self.take(&filter::object_indices(&self.records, column, &selected, mode)))
    }

    /// Keep only the rows whose `column` matches `values` (drop them with
    /// `invert`). Objects stay as long as one of their rows does.
    pub fn slice_by_values(&self, column: &str, values: &[Value], invert: bool) -> Result<Self> {
        self.require_column(column)?;
        let selected = filter::value_set(values);
        Ok(self.take(&filter::row_indices(&self.records, column, &selected, invert)))
    }

    /// Keep rows passing `condition`, or failing it with `invert`.
    pub fn select_by_condition<F>(&self, condition: F, invert: bool) -> Self
    where
        F: Fn(&R) -> bool,
    {
        self.take(&filter::condition_indices(&self.records, condition, invert))
    }

    /// Keep rows where `mask` is true (false with `invert`). The mask must
    /// have one entry per row.
    pub fn select_by_mask(&self, mask: &[bool], invert: bool) -> Result<Self> {
        if mask.len() != self.records.len() {
            return Err(StratumError::Schema(format!(
                "mask has {} entries for {} rows",
                mask.len(),
                self.records.len()
            )));
        }
        let indices: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter(|(_, keep)| **keep != invert)
            .map(|(i, _)| i)
            .collect();
        Ok(self.take(&indices))
    }

    /// Rows whose id is in `ids`.
    pub fn retain_ids(&self, ids: &HashSet<&str>) -> Self {
        let records = self
            .records
            .iter()
            .filter(|r| ids.contains(r.id()))
            .cloned()
            .collect();
        Self::from_sorted(records, self.vertical_reference)
    }

    // ---- columns ----

    /// Append (or replace) an attribute column keyed by object id. Rows of
    /// objects missing from `values` get `fill`.
    pub fn add_column(&self, column: &str, values: &HashMap<String, Value>, fill: Value) -> Result<Self> {
        if R::builtin_columns().contains(&column) {
            return Err(StratumError::DuplicateColumn(column.to_string()));
        }
        let records = self
            .records
            .iter()
            .map(|r| {
                let mut r = r.clone();
                let value = values.get(r.id()).cloned().unwrap_or_else(|| fill.clone());
                r.attributes_mut().insert(column.to_string(), value);
                r
            })
            .collect();
        Ok(Self::from_sorted(records, self.vertical_reference))
    }

    /// Append (or replace) a per-row attribute column.
    pub fn with_row_column(&self, column: &str, values: Vec<Value>) -> Result<Self> {
        if R::builtin_columns().contains(&column) {
            return Err(StratumError::DuplicateColumn(column.to_string()));
        }
        if values.len() != self.records.len() {
            return Err(StratumError::Schema(format!(
                "column '{column}' has {} values for {} rows",
                values.len(),
                self.records.len()
            )));
        }
        let records = self
            .records
            .iter()
            .zip(values)
            .map(|(r, v)| {
                let mut r = r.clone();
                r.attributes_mut().insert(column.to_string(), v);
                r
            })
            .collect();
        Ok(Self::from_sorted(records, self.vertical_reference))
    }

    // ---- references ----

    /// Re-express every vertical value in `target`.
    pub fn change_vertical_reference(&self, target: VerticalReference) -> Self {
        let from = self.vertical_reference;
        let records = self
            .records
            .iter()
            .map(|r| {
                let mut r = r.clone();
                r.convert_vertical(from, target);
                r
            })
            .collect();
        Self::from_sorted(records, target)
    }

    /// Move the repeated `x`/`y` columns with `transformer`.
    pub fn reproject(&self, transformer: &Transformer) -> Result<Self> {
        let records = self
            .records
            .iter()
            .map(|r| {
                let (x, y) = transformer.transform(r.x(), r.y())?;
                let mut r = r.clone();
                r.set_xy(x, y);
                Ok(r)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_sorted(records, self.vertical_reference))
    }

    // ---- derivation ----

    /// Header rows derived from the first row of every object.
    pub fn header_records(&self) -> Vec<HeaderRecord> {
        self.object_ranges()
            .into_iter()
            .map(|(id, range)| {
                let first = &self.records[range.start];
                HeaderRecord::new(id, first.x(), first.y(), first.surface(), first.end())
            })
            .collect()
    }

    /// A header with one row per object, taken from the repeated location
    /// columns.
    pub fn to_header(&self, horizontal_reference: HorizontalReference) -> PointHeader {
        PointHeader::from_parts(self.header_records(), horizontal_reference, self.vertical_reference)
    }
}

// ---------------------------------------------------------------------------
// Depth slicing – capability shared by layered and discrete data
// ---------------------------------------------------------------------------

/// Vertical interval used by [`DepthSlice`]. `upper` is the shallow bound,
/// `lower` the deep one; either may be open. Bounds are given in
/// `reference` and converted per object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthInterval {
    pub upper: Option<f64>,
    pub lower: Option<f64>,
    pub reference: VerticalReference,
    /// Clip straddling layers to the interval instead of keeping their
    /// original boundaries.
    pub update_layer_boundaries: bool,
}

impl DepthInterval {
    pub fn new(upper: Option<f64>, lower: Option<f64>, reference: VerticalReference) -> Self {
        Self {
            upper,
            lower,
            reference,
            update_layer_boundaries: true,
        }
    }

    /// Interval in metres below the surface.
    pub fn depth(upper: f64, lower: f64) -> Self {
        Self::new(Some(upper), Some(lower), VerticalReference::Depth)
    }

    /// Interval in datum elevations; `upper` is the higher elevation.
    pub fn datum(upper: f64, lower: f64) -> Self {
        Self::new(Some(upper), Some(lower), VerticalReference::Datum)
    }

    /// Keep original layer boundaries (builder style).
    pub fn keep_boundaries(mut self) -> Self {
        self.update_layer_boundaries = false;
        self
    }

    /// Bounds as depth below a surface at `surface`, shallow first. Open
    /// bounds become infinite.
    pub fn in_depth(&self, surface: f64) -> (f64, f64) {
        let to_depth = |v: f64| convert_vertical(v, surface, self.reference, VerticalReference::Depth);
        let upper = self.upper.map(to_depth).unwrap_or(f64::NEG_INFINITY);
        let lower = self.lower.map(to_depth).unwrap_or(f64::INFINITY);
        (upper.min(lower), upper.max(lower))
    }
}

/// Tables whose rows can be clipped to a vertical interval.
pub trait DepthSlice: Sized {
    fn slice_depth_interval(&self, interval: &DepthInterval) -> Self;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::value::values;

    fn table() -> LayeredData {
        // Deliberately unsorted input.
        LayeredData::new(
            vec![
                Layer::new("B", 1.0, 2.0).at(1.0, 1.0, 0.0, 2.0).with("lith", "Z"),
                Layer::new("A", 1.0, 3.0).at(0.0, 0.0, 5.0, 3.0).with("lith", "K"),
                Layer::new("A", 0.0, 1.0).at(0.0, 0.0, 5.0, 3.0).with("lith", "Z"),
                Layer::new("B", 0.0, 1.0).at(1.0, 1.0, 0.0, 2.0).with("lith", "V"),
            ],
            VerticalReference::Depth,
        )
    }

    #[test]
    fn rows_grouped_and_sorted() {
        let t = table();
        assert_eq!(t.ids(), vec!["B", "A"]);
        let tops: Vec<f64> = t.records().iter().map(|r| r.top).collect();
        assert_eq!(tops, vec![0.0, 1.0, 0.0, 1.0]);
        assert_eq!(t.object("A").len(), 2);
        assert!(t.object("A").iter().all(|r| r.id == "A"));
        assert_eq!(t.object("B")[1].top, 1.0);
        assert!(t.object("Z").is_empty());
    }

    #[test]
    fn object_vs_row_level_value_selection() {
        let t = table();
        let objects = t.select_by_values("lith", &values(["Z"]), SelectionMode::Or).unwrap();
        assert_eq!(objects.len(), 4);
        let rows = t.slice_by_values("lith", &values(["Z"]), false).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.n_objects(), 2);
    }

    #[test]
    fn unknown_column_is_an_error() {
        let t = table();
        assert!(matches!(
            t.select_by_values("colour", &values(["red"]), SelectionMode::Or),
            Err(StratumError::UnknownColumn(_))
        ));
    }

    #[test]
    fn mask_must_match_length() {
        let t = table();
        assert!(t.select_by_mask(&[true, false], false).is_err());
        let kept = t.select_by_mask(&[true, false, false, true], true).unwrap();
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn condition_is_row_level() {
        let t = table();
        let thick = t.select_by_condition(|l| l.thickness() > 1.5, false);
        assert_eq!(thick.len(), 1);
        assert_eq!(thick.ids(), vec!["A"]);
    }

    #[test]
    fn header_from_data() {
        let t = table();
        let header = t.to_header(HorizontalReference::RD_NEW);
        assert_eq!(header.len(), 2);
        assert_eq!(header.records()[1].surface, 5.0);
        assert_eq!(header.records()[1].end, 3.0);
    }

    #[test]
    fn interval_bounds_in_depth() {
        let interval = DepthInterval::datum(-1.0, -4.0);
        assert_eq!(interval.in_depth(1.0), (2.0, 5.0));
        let open = DepthInterval::new(None, Some(3.0), VerticalReference::Depth);
        assert_eq!(open.in_depth(10.0), (f64::NEG_INFINITY, 3.0));
    }
}
