//! Header and data of the same objects, kept aligned.
//!
//! ```text
//!   spatial / attribute selection        value / depth selection
//!            │                                    │
//!            ▼                                    ▼
//!      ┌──────────┐   surviving ids      ┌──────────────┐
//!      │  header   │ ──────────────────▶ │     data      │
//!      │           │ ◀────────────────── │               │
//!      └──────────┘   surviving ids      └──────────────┘
//! ```
//!
//! Every operation filters one side first and prunes the other to the
//! surviving ids, so `set(header.id) == set(data.id)` holds for every value
//! a [`Collection`] hands out.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use geo::{LineString, Point};
use serde::{Deserialize, Serialize};

use crate::config::ValidationSettings;
use crate::data::analysis::ObjectTable;
use crate::data::filter::SelectionMode;
use crate::data::header::PointHeader;
use crate::data::records::{DataRecord, Layer, Measurement};
use crate::data::table::{DataTable, DepthInterval, DepthSlice, DiscreteData, LayeredData};
use crate::data::value::Value;
use crate::error::{Result, StratumError};
use crate::io;
use crate::model::{ProfileSamples, VoxelModel};
use crate::reference::{HorizontalReference, VerticalReference};
use crate::spatial::{PolygonPredicate, PolygonSource};

/// A header plus the data rows of the same objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection<R> {
    header: PointHeader,
    data: DataTable<R>,
}

/// Boreholes: layered descriptions.
pub type BoreholeCollection = Collection<Layer>;
/// CPTs and other logs: discrete measurements.
pub type CptCollection = Collection<Measurement>;

impl<R: DataRecord> Collection<R> {
    // ---- construction ----

    /// Pair a header with data. Fails when the vertical references differ or
    /// the id sets do not match.
    pub fn new(header: PointHeader, data: DataTable<R>) -> Result<Self> {
        if header.vertical_reference() != data.vertical_reference() {
            return Err(StratumError::ReferenceMismatch(format!(
                "header is in {} but data is in {}",
                header.vertical_reference(),
                data.vertical_reference()
            )));
        }
        let collection = Self { header, data };
        collection.check_header_to_data_alignment()?;
        Ok(collection)
    }

    /// Pair a header with data, pruning both to their common ids when
    /// `settings.auto_align` is set.
    pub fn from_parts_aligned(
        header: PointHeader,
        data: DataTable<R>,
        settings: &ValidationSettings,
    ) -> Result<Self> {
        if !settings.auto_align {
            return Self::new(header, data);
        }
        let data = if data.vertical_reference() != header.vertical_reference() {
            data.change_vertical_reference(header.vertical_reference())
        } else {
            data
        };
        let header_ids = header.id_set();
        let data_ids = data.id_set();
        let common: HashSet<&str> = header_ids.intersection(&data_ids).copied().collect();
        if common.len() != header_ids.len() || common.len() != data_ids.len() {
            log::warn!(
                "aligning header ({} objects) and data ({} objects) to {} common ids",
                header_ids.len(),
                data_ids.len(),
                common.len()
            );
            let header = header.retain_ids(&common);
            let data = data.retain_ids(&common);
            return Self::new(header, data);
        }
        Self::new(header, data)
    }

    /// Collection whose header is derived from the data's location columns.
    pub fn from_data(data: DataTable<R>, horizontal_reference: HorizontalReference) -> Self {
        let header = data.to_header(horizontal_reference);
        Self { header, data }
    }

    /// Data-first result: prune the header to the surviving ids.
    fn with_data(&self, data: DataTable<R>) -> Self {
        let header = self.header.retain_ids(&data.id_set());
        self.aligned(header, data)
    }

    /// Header-first result: prune the data to the surviving ids.
    fn with_header(&self, header: PointHeader) -> Self {
        let data = self.data.retain_ids(&header.id_set());
        self.aligned(header, data)
    }

    fn aligned(&self, header: PointHeader, data: DataTable<R>) -> Self {
        let collection = Self { header, data };
        debug_assert!(
            collection.check_header_to_data_alignment().is_ok(),
            "collection operation broke header/data alignment"
        );
        collection
    }

    // ---- accessors ----

    pub fn header(&self) -> &PointHeader {
        &self.header
    }

    pub fn data(&self) -> &DataTable<R> {
        &self.data
    }

    pub fn into_parts(self) -> (PointHeader, DataTable<R>) {
        (self.header, self.data)
    }

    /// Number of objects.
    pub fn n_points(&self) -> usize {
        self.header.len()
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_empty()
    }

    pub fn horizontal_reference(&self) -> HorizontalReference {
        self.header.horizontal_reference()
    }

    pub fn vertical_reference(&self) -> VerticalReference {
        self.header.vertical_reference()
    }

    // ---- alignment ----

    /// Verify that header and data cover exactly the same ids.
    pub fn check_header_to_data_alignment(&self) -> Result<()> {
        let header_ids = self.header.id_set();
        let data_ids = self.data.id_set();
        if header_ids == data_ids {
            return Ok(());
        }
        let mut header_only: Vec<String> =
            header_ids.difference(&data_ids).map(|s| s.to_string()).collect();
        let mut data_only: Vec<String> =
            data_ids.difference(&header_ids).map(|s| s.to_string()).collect();
        header_only.sort();
        data_only.sort();
        Err(StratumError::Alignment {
            header_only,
            data_only,
        })
    }

    /// Rebuild the header from the ids present in the data. Existing header
    /// rows (with their extra columns) are kept; objects missing from the
    /// header are added from the data's location columns.
    pub fn reset_header(&self) -> Result<Self> {
        let ids = self.data.id_set();
        let kept = self.header.retain_ids(&ids);
        let known = kept.id_set();
        let mut records = kept.records().to_vec();
        let mut added: Vec<_> = self
            .data
            .header_records()
            .into_iter()
            .filter(|r| !known.contains(r.id.as_str()))
            .collect();
        if !added.is_empty() {
            log::info!("reset_header added {} object(s) from data", added.len());
        }
        let xy_reference = self.header.xy_reference();
        let horizontal_reference = self.header.horizontal_reference();
        if !added.is_empty() && xy_reference != horizontal_reference {
            // Data x/y are in the scalar reference; the geometry is not.
            let transformer = xy_reference.transformer_to(horizontal_reference)?;
            for record in &mut added {
                let (x, y) = transformer.transform(record.x, record.y)?;
                record.geometry = Point::new(x, y);
            }
        }
        records.extend(added);
        let header = PointHeader::new(records, horizontal_reference, self.header.vertical_reference())?
            .with_xy_reference(xy_reference);
        Self::new(header, self.data.clone())
    }

    // ---- lookups ----

    /// Objects with the given ids; fails on the first absent id.
    pub fn get<I, S>(&self, ids: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(self.with_header(self.header.get(ids)?))
    }

    /// Objects whose header `column` matches any of `values`.
    pub fn get_by(&self, column: &str, values: &[Value]) -> Result<Self> {
        Ok(self.with_header(self.header.get_by(column, values)?))
    }

    // ---- header-first selections ----

    pub fn select_within_bbox(&self, xmin: f64, xmax: f64, ymin: f64, ymax: f64, invert: bool) -> Self {
        self.with_header(self.header.select_within_bbox(xmin, xmax, ymin, ymax, invert))
    }

    pub fn select_with_points(&self, points: &[Point<f64>], buffer: f64, invert: bool) -> Self {
        self.with_header(self.header.select_with_points(points, buffer, invert))
    }

    pub fn select_with_lines(&self, lines: &[LineString<f64>], buffer: f64, invert: bool) -> Self {
        self.with_header(self.header.select_with_lines(lines, buffer, invert))
    }

    pub fn select_within_polygons<'a>(
        &self,
        polygons: impl Into<PolygonSource<'a>>,
        buffer: f64,
        predicate: PolygonPredicate,
        invert: bool,
    ) -> Result<Self> {
        Ok(self.with_header(
            self.header
                .select_within_polygons(polygons, buffer, predicate, invert)?,
        ))
    }

    pub fn select_by_depth(
        &self,
        top_min: Option<f64>,
        top_max: Option<f64>,
        end_min: Option<f64>,
        end_max: Option<f64>,
    ) -> Self {
        self.with_header(self.header.select_by_depth(top_min, top_max, end_min, end_max))
    }

    pub fn select_by_length(&self, min_length: Option<f64>, max_length: Option<f64>) -> Self {
        self.with_header(self.header.select_by_length(min_length, max_length))
    }

    /// Per-object area labels, in header order.
    pub fn get_area_labels<'a>(
        &self,
        polygons: impl Into<PolygonSource<'a>>,
        column: &str,
    ) -> Result<Vec<(String, Value)>> {
        self.header.get_area_labels(polygons, column)
    }

    /// Collection with the area labels added as a header column.
    pub fn with_area_labels<'a>(
        &self,
        polygons: impl Into<PolygonSource<'a>>,
        column: &str,
    ) -> Result<Self> {
        let header = self.header.with_area_labels(polygons, column)?;
        Ok(self.aligned(header, self.data.clone()))
    }

    // ---- data-first selections ----

    pub fn select_by_values(&self, column: &str, values: &[Value], mode: SelectionMode) -> Result<Self> {
        Ok(self.with_data(self.data.select_by_values(column, values, mode)?))
    }

    pub fn slice_by_values(&self, column: &str, values: &[Value], invert: bool) -> Result<Self> {
        Ok(self.with_data(self.data.slice_by_values(column, values, invert)?))
    }

    pub fn select_by_condition<F>(&self, condition: F, invert: bool) -> Self
    where
        F: Fn(&R) -> bool,
    {
        self.with_data(self.data.select_by_condition(condition, invert))
    }

    pub fn select_by_mask(&self, mask: &[bool], invert: bool) -> Result<Self> {
        Ok(self.with_data(self.data.select_by_mask(mask, invert)?))
    }

    // ---- columns ----

    /// Copy a header column onto every data row of the same object.
    pub fn add_header_column_to_data(&self, column: &str) -> Result<Self> {
        let values = self.header.column(column)?;
        let keyed: HashMap<String, Value> = self
            .header
            .ids()
            .map(str::to_string)
            .zip(values)
            .collect();
        let data = self.data.add_column(column, &keyed, Value::Null)?;
        Ok(self.aligned(self.header.clone(), data))
    }

    // ---- references ----

    /// Reproject header and data. With `only_geometries` only the header
    /// geometry moves; scalar `x`/`y` in header and data stay as they are and
    /// keep the header's `xy_reference`.
    pub fn change_horizontal_reference(
        &self,
        target: HorizontalReference,
        only_geometries: bool,
    ) -> Result<Self> {
        let header = self.header.change_horizontal_reference(target, only_geometries)?;
        let data = if only_geometries {
            self.data.clone()
        } else {
            let transformer = self.header.xy_reference().transformer_to(target)?;
            self.data.reproject(&transformer)?
        };
        Ok(self.aligned(header, data))
    }

    /// Re-express header and data in `target`.
    pub fn change_vertical_reference(&self, target: VerticalReference) -> Self {
        log::info!(
            "changing vertical reference {} -> {target}",
            self.vertical_reference()
        );
        self.aligned(
            self.header.change_vertical_reference(target),
            self.data.change_vertical_reference(target),
        )
    }

    // ---- voxel join ----

    /// Profile of `model` at every header location, in header order.
    /// Locations are reprojected when the model uses another CRS.
    pub fn sample_voxel_model(&self, model: &VoxelModel) -> Result<ProfileSamples> {
        let points: Vec<Point<f64>> = if model.crs() == self.horizontal_reference() {
            self.header.records().iter().map(|r| r.geometry).collect()
        } else {
            let transformer = self.horizontal_reference().transformer_to(model.crs())?;
            self.header
                .records()
                .iter()
                .map(|r| {
                    transformer
                        .transform(r.geometry.x(), r.geometry.y())
                        .map(|(x, y)| Point::new(x, y))
                })
                .collect::<Result<_>>()?
        };
        let ids = self.header.ids().map(str::to_string).collect();
        Ok(model.select_with_points(&points).with_labels(ids))
    }

    // ---- snapshots and export ----

    /// Snapshot as JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Restore a snapshot. Header ids must be unique, data rows are regrouped
    /// per object, and both halves must share vertical reference and ids.
    pub fn from_json(text: &str) -> Result<Self> {
        let Self { header, data } = serde_json::from_str(text)?;
        let vertical_reference = data.vertical_reference();
        Self::new(header, DataTable::new(data.into_records(), vertical_reference))
    }

    /// Write header and data as CSV. References are not stored in the files.
    pub fn to_csv(&self, header_path: &Path, data_path: &Path) -> Result<()> {
        io::writer::write_csv(header_path, &io::convert::header_to_table(&self.header))?;
        io::writer::write_csv(data_path, &io::convert::data_to_table(&self.data))?;
        log::info!(
            "wrote {} objects to {} and {}",
            self.n_points(),
            header_path.display(),
            data_path.display()
        );
        Ok(())
    }

    /// Write header and data as Parquet, with the references in the schema
    /// metadata.
    pub fn to_parquet(&self, header_path: &Path, data_path: &Path) -> Result<()> {
        let mut metadata = io::convert::reference_metadata(self.horizontal_reference(), self.vertical_reference());
        if self.header.xy_reference() != self.horizontal_reference() {
            metadata.insert(
                io::convert::XY_REFERENCE_KEY.to_string(),
                self.header.xy_reference().to_string(),
            );
        }
        io::writer::write_parquet(
            header_path,
            &io::convert::header_to_table(&self.header),
            &metadata,
        )?;
        io::writer::write_parquet(data_path, &io::convert::data_to_table(&self.data), &metadata)?;
        log::info!(
            "wrote {} objects to {} and {}",
            self.n_points(),
            header_path.display(),
            data_path.display()
        );
        Ok(())
    }
}

impl<R: DataRecord> Collection<R>
where
    DataTable<R>: DepthSlice,
{
    /// Clip the data to `interval`; objects left without rows are dropped.
    pub fn slice_depth_interval(&self, interval: &DepthInterval) -> Self {
        self.with_data(self.data.slice_depth_interval(interval))
    }
}

// ---------------------------------------------------------------------------
// Borehole-only analysis
// ---------------------------------------------------------------------------

impl Collection<Layer> {
    pub fn get_cumulative_layer_thickness(&self, column: &str, values: &[Value]) -> Result<ObjectTable> {
        self.data.get_cumulative_layer_thickness(column, values)
    }

    /// Collection with one `<value>_thickness` header column per value.
    pub fn with_cumulative_layer_thickness(&self, column: &str, values: &[Value]) -> Result<Self> {
        let table = self.get_cumulative_layer_thickness(column, values)?;
        self.with_object_columns(&table, "thickness", Value::Float(0.0))
    }

    pub fn get_layer_top(
        &self,
        column: &str,
        values: &[Value],
        min_thickness: f64,
        min_depth: f64,
    ) -> Result<ObjectTable> {
        self.data.get_layer_top(column, values, min_thickness, min_depth)
    }

    /// Collection with one `<value>_top` header column per value.
    pub fn with_layer_top(
        &self,
        column: &str,
        values: &[Value],
        min_thickness: f64,
        min_depth: f64,
    ) -> Result<Self> {
        let table = self.get_layer_top(column, values, min_thickness, min_depth)?;
        self.with_object_columns(&table, "top", Value::Null)
    }

    fn with_object_columns(&self, table: &ObjectTable, suffix: &str, fill: Value) -> Result<Self> {
        let mut header = self.header.clone();
        for name in table.column_names() {
            header = header.add_column(&format!("{name}_{suffix}"), &table.keyed(name), fill.clone())?;
        }
        Ok(self.aligned(header, self.data.clone()))
    }
}

impl LayeredData {
    /// Wrap in a collection whose header is derived from the rows.
    pub fn to_collection(self, horizontal_reference: HorizontalReference) -> Collection<Layer> {
        Collection::from_data(self, horizontal_reference)
    }
}

impl DiscreteData {
    pub fn to_collection(self, horizontal_reference: HorizontalReference) -> Collection<Measurement> {
        Collection::from_data(self, horizontal_reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::header::HeaderRecord;
    use crate::data::value::values;

    fn boreholes() -> BoreholeCollection {
        let locations = [("A", 0.0, 0.0), ("B", 10.0, 0.0), ("C", 20.0, 0.0)];
        let mut layers = Vec::new();
        for (id, x, y) in locations {
            layers.push(Layer::new(id, 0.0, 1.0).at(x, y, 2.0, 3.0).with("lith", "K"));
            layers.push(Layer::new(id, 1.0, 3.0).at(x, y, 2.0, 3.0).with("lith", if id == "B" { "V" } else { "Z" }));
        }
        LayeredData::new(layers, VerticalReference::Depth).to_collection(HorizontalReference::RD_NEW)
    }

    #[test]
    fn misaligned_parts_fail_loudly() {
        let collection = boreholes();
        let (header, data) = collection.into_parts();
        let header = header.get(["A", "B"]).unwrap();
        let err = Collection::new(header.clone(), data.clone()).unwrap_err();
        assert!(err.is_internal());
        match err {
            StratumError::Alignment { header_only, data_only } => {
                assert!(header_only.is_empty());
                assert_eq!(data_only, vec!["C".to_string()]);
            }
            other => panic!("unexpected error {other}"),
        }

        let aligned = Collection::from_parts_aligned(header, data, &ValidationSettings::default()).unwrap();
        assert_eq!(aligned.n_points(), 2);
        assert_eq!(aligned.data().len(), 4);
    }

    #[test]
    fn header_first_selection_prunes_data() {
        let sel = boreholes().select_within_bbox(-1.0, 11.0, -1.0, 1.0, false);
        assert_eq!(sel.n_points(), 2);
        assert_eq!(sel.data().n_objects(), 2);
        assert!(sel.check_header_to_data_alignment().is_ok());
    }

    #[test]
    fn data_first_selection_prunes_header() {
        let sel = boreholes().select_by_values("lith", &values(["Z"]), SelectionMode::Or).unwrap();
        assert_eq!(sel.header().ids().collect::<Vec<_>>(), vec!["A", "C"]);
        assert_eq!(sel.data().len(), 4);

        let sliced = boreholes().slice_by_values("lith", &values(["Z"]), false).unwrap();
        assert_eq!(sliced.n_points(), 2);
        assert_eq!(sliced.data().len(), 2);
    }

    #[test]
    fn depth_slice_drops_emptied_objects() {
        let collection = boreholes().select_by_values("lith", &values(["V"]), SelectionMode::Or).unwrap();
        let sliced = collection.slice_depth_interval(&DepthInterval::depth(5.0, 6.0));
        assert!(sliced.is_empty());
        assert!(sliced.data().is_empty());
    }

    #[test]
    fn reset_header_restores_missing_objects() {
        let collection = boreholes();
        let bad = Collection {
            header: collection.header().get(["A"]).unwrap(),
            data: collection.data().clone(),
        };
        let fixed = bad.reset_header().unwrap();
        assert_eq!(fixed.n_points(), 3);
        assert!(fixed.check_header_to_data_alignment().is_ok());
    }

    #[test]
    fn scalar_coordinates_keep_their_reference() {
        let layers = vec![
            Layer::new("A", 0.0, 1.0).at(155_000.0, 463_000.0, 1.0, 1.0),
            Layer::new("B", 0.0, 1.0).at(155_100.0, 463_100.0, 1.0, 1.0),
        ];
        let rd = LayeredData::new(layers, VerticalReference::Depth).to_collection(HorizontalReference::RD_NEW);
        let moved = rd.change_horizontal_reference(HorizontalReference::WGS84, true).unwrap();
        assert_eq!(moved.header().xy_reference(), HorizontalReference::RD_NEW);
        assert_eq!(moved.data().records()[0].x, 155_000.0);

        let full = moved.change_horizontal_reference(HorizontalReference::WGS84, false).unwrap();
        let a = &full.header().records()[0];
        assert!((a.x - 5.387).abs() < 0.01 && (a.y - 52.155).abs() < 0.01);
        assert!((a.x - a.geometry.x()).abs() < 1e-9);
        assert!((full.data().records()[0].x - a.x).abs() < 1e-9);
        assert_eq!(full.header().xy_reference(), HorizontalReference::WGS84);

        let missing_b = Collection {
            header: moved.header().get(["A"]).unwrap(),
            data: moved.data().clone(),
        };
        let reset = missing_b.reset_header().unwrap();
        let b = reset.header().record("B").unwrap();
        assert_eq!((b.x, b.y), (155_100.0, 463_100.0));
        assert!(b.geometry.x() > 5.0 && b.geometry.x() < 6.0);
        assert_eq!(reset.header().xy_reference(), HorizontalReference::RD_NEW);
    }

    #[test]
    fn header_column_broadcast_to_data() {
        let collection = boreholes();
        let mut records = collection.header().records().to_vec();
        for (i, r) in records.iter_mut().enumerate() {
            r.attributes.insert("campaign".into(), Value::Integer(i as i64));
        }
        let header = PointHeader::new(records, HorizontalReference::RD_NEW, VerticalReference::Depth).unwrap();
        let collection = Collection::new(header, collection.data().clone()).unwrap();
        let with = collection.add_header_column_to_data("campaign").unwrap();
        let c_rows = with.data().object("C");
        assert!(c_rows.iter().all(|l| l.attributes["campaign"] == Value::Integer(2)));
    }

    #[test]
    fn thickness_and_top_columns_in_header() {
        let collection = boreholes()
            .with_cumulative_layer_thickness("lith", &values(["Z"]))
            .unwrap()
            .with_layer_top("lith", &values(["Z"]), 0.0, 0.0)
            .unwrap();
        let header = collection.header();
        assert_eq!(
            header.column("Z_thickness").unwrap(),
            vec![Value::Float(2.0), Value::Float(0.0), Value::Float(2.0)]
        );
        assert_eq!(
            header.column("Z_top").unwrap(),
            vec![Value::Float(1.0), Value::Null, Value::Float(1.0)]
        );
    }

    #[test]
    fn vertical_reference_change_moves_both_sides() {
        let datum = boreholes().change_vertical_reference(VerticalReference::Datum);
        assert_eq!(datum.header().records()[0].end, -1.0);
        assert_eq!(datum.data().records()[1].bottom, -1.0);
        let back = datum.change_vertical_reference(VerticalReference::Depth);
        assert_eq!(back, boreholes());
    }

    #[test]
    fn json_snapshot_round_trip() {
        let collection = boreholes();
        let text = collection.to_json().unwrap();
        assert_eq!(BoreholeCollection::from_json(&text).unwrap(), collection);
    }

    fn snapshot(collection: &BoreholeCollection) -> serde_json::Value {
        serde_json::from_str(&collection.to_json().unwrap()).unwrap()
    }

    #[test]
    fn snapshot_with_duplicate_header_ids_is_rejected() {
        let mut json = snapshot(&boreholes());
        let records = json["header"]["records"].as_array_mut().unwrap();
        let copy = records[0].clone();
        records.push(copy);
        let err = BoreholeCollection::from_json(&json.to_string()).unwrap_err();
        assert!(matches!(err, StratumError::Json(_)));
        assert!(err.to_string().contains("duplicate object id 'A'"));
    }

    #[test]
    fn snapshot_rows_are_regrouped() {
        let collection = boreholes();
        let mut json = snapshot(&collection);
        let records = json["data"]["records"].as_array_mut().unwrap();
        let first = records.remove(0);
        records.push(first);
        let back = BoreholeCollection::from_json(&json.to_string()).unwrap();
        assert_eq!(back, collection);
        assert_eq!(back.data().object("A").len(), 2);
    }

    #[test]
    fn snapshot_with_mixed_vertical_references_is_rejected() {
        let mut json = snapshot(&boreholes());
        json["data"]["vertical_reference"] = serde_json::json!("Datum");
        assert!(matches!(
            BoreholeCollection::from_json(&json.to_string()),
            Err(StratumError::ReferenceMismatch(_))
        ));
    }

    #[test]
    fn reference_mismatch_is_rejected() {
        let collection = boreholes();
        let header = PointHeader::new(
            vec![HeaderRecord::new("A", 0.0, 0.0, 2.0, -1.0)],
            HorizontalReference::RD_NEW,
            VerticalReference::Datum,
        )
        .unwrap();
        let data = collection.data().retain_ids(&["A"].into_iter().collect());
        assert!(matches!(
            Collection::new(header, data),
            Err(StratumError::ReferenceMismatch(_))
        ));
    }
}
