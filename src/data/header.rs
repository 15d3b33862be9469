use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use geo::{BoundingRect, LineString, MultiPoint, Point, Rect};
use serde::{Deserialize, Serialize};

use super::value::Value;
use crate::error::{Result, StratumError};
use crate::reference::{convert_vertical, HorizontalReference, VerticalReference};
use crate::spatial::{self, PolygonPredicate, PolygonSource};

/// Built-in header columns in table order.
pub const HEADER_COLUMNS: &[&str] = &["id", "x", "y", "surface", "end", "geometry"];

// ---------------------------------------------------------------------------
// HeaderRecord – one row per physical object
// ---------------------------------------------------------------------------

/// Metadata of one borehole or CPT.
///
/// `surface` is always a datum elevation; `end` follows the header's vertical
/// reference. `geometry` is in the header's horizontal reference, `x`/`y` in
/// its [`PointHeader::xy_reference`]; the two differ after a geometry-only
/// reprojection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderRecord {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub surface: f64,
    pub end: f64,
    pub geometry: Point<f64>,
    pub attributes: BTreeMap<String, Value>,
}

impl HeaderRecord {
    pub fn new(id: impl Into<String>, x: f64, y: f64, surface: f64, end: f64) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            surface,
            end,
            geometry: Point::new(x, y),
            attributes: BTreeMap::new(),
        }
    }

    /// Add an attribute (builder style).
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(column.to_string(), value.into());
        self
    }

    /// Column lookup across built-in and attribute columns. `geometry` is not
    /// a scalar and is not returned here.
    pub fn get(&self, column: &str) -> Option<Value> {
        match column {
            "id" => Some(Value::String(self.id.clone())),
            "x" => Some(Value::float(self.x)),
            "y" => Some(Value::float(self.y)),
            "surface" => Some(Value::float(self.surface)),
            "end" => Some(Value::float(self.end)),
            other => self.attributes.get(other).cloned(),
        }
    }

    /// Length of the object along the vertical.
    pub fn length(&self, reference: VerticalReference) -> f64 {
        convert_vertical(self.end, self.surface, reference, VerticalReference::Depth)
    }
}

// ---------------------------------------------------------------------------
// PointHeader – the per-object table
// ---------------------------------------------------------------------------

/// Header table of point objects. Every operation returns a new header; the
/// receiver is never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PointHeaderRepr")]
pub struct PointHeader {
    records: Vec<HeaderRecord>,
    /// Attribute column names (excludes the built-in columns).
    attribute_columns: Vec<String>,
    horizontal_reference: HorizontalReference,
    /// Reference of the scalar `x`/`y` columns of header and data.
    xy_reference: HorizontalReference,
    vertical_reference: VerticalReference,
}

/// Serialized form; deserializing goes through [`PointHeader::new`].
#[derive(Deserialize)]
struct PointHeaderRepr {
    records: Vec<HeaderRecord>,
    horizontal_reference: HorizontalReference,
    #[serde(default)]
    xy_reference: Option<HorizontalReference>,
    vertical_reference: VerticalReference,
}

impl TryFrom<PointHeaderRepr> for PointHeader {
    type Error = StratumError;

    fn try_from(repr: PointHeaderRepr) -> Result<Self> {
        let header = Self::new(repr.records, repr.horizontal_reference, repr.vertical_reference)?;
        Ok(match repr.xy_reference {
            Some(xy) => header.with_xy_reference(xy),
            None => header,
        })
    }
}

impl PointHeader {
    /// Build a header, rejecting duplicate ids.
    pub fn new(
        records: Vec<HeaderRecord>,
        horizontal_reference: HorizontalReference,
        vertical_reference: VerticalReference,
    ) -> Result<Self> {
        let mut seen = HashSet::with_capacity(records.len());
        for rec in &records {
            if !seen.insert(rec.id.as_str()) {
                return Err(StratumError::DuplicateId(rec.id.clone()));
            }
        }
        Ok(Self::from_parts(records, horizontal_reference, vertical_reference))
    }

    /// Build without the uniqueness check; callers guarantee unique ids.
    pub(crate) fn from_parts(
        records: Vec<HeaderRecord>,
        horizontal_reference: HorizontalReference,
        vertical_reference: VerticalReference,
    ) -> Self {
        let columns: BTreeSet<&String> = records.iter().flat_map(|r| r.attributes.keys()).collect();
        let attribute_columns = columns.into_iter().cloned().collect();
        Self {
            records,
            attribute_columns,
            horizontal_reference,
            xy_reference: horizontal_reference,
            vertical_reference,
        }
    }

    /// The same header with scalar `x`/`y` declared to be in `reference`.
    pub fn with_xy_reference(mut self, reference: HorizontalReference) -> Self {
        self.xy_reference = reference;
        self
    }

    /// A header with the same references and the given rows.
    fn derive(&self, records: Vec<HeaderRecord>) -> Self {
        Self::from_parts(records, self.horizontal_reference, self.vertical_reference)
            .with_xy_reference(self.xy_reference)
    }

    /// Keep rows where `keep` is true (or false when `invert`).
    fn filter<F>(&self, invert: bool, keep: F) -> Self
    where
        F: Fn(&HeaderRecord) -> bool,
    {
        let records: Vec<_> = self
            .records
            .iter()
            .filter(|r| keep(r) != invert)
            .cloned()
            .collect();
        log::debug!("header selection kept {} of {} objects", records.len(), self.len());
        self.derive(records)
    }

    // ---- accessors ----

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[HeaderRecord] {
        &self.records
    }

    pub fn horizontal_reference(&self) -> HorizontalReference {
        self.horizontal_reference
    }

    /// Reference of the scalar `x`/`y` columns. Equal to
    /// [`horizontal_reference`](Self::horizontal_reference) unless only the
    /// geometries were reprojected.
    pub fn xy_reference(&self) -> HorizontalReference {
        self.xy_reference
    }

    pub fn vertical_reference(&self) -> VerticalReference {
        self.vertical_reference
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.id.as_str())
    }

    pub fn id_set(&self) -> HashSet<&str> {
        self.ids().collect()
    }

    pub fn attribute_columns(&self) -> &[String] {
        &self.attribute_columns
    }

    /// Built-in plus attribute column names.
    pub fn columns(&self) -> Vec<String> {
        HEADER_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(self.attribute_columns.iter().cloned())
            .collect()
    }

    pub fn has_column(&self, column: &str) -> bool {
        HEADER_COLUMNS.contains(&column) || self.attribute_columns.iter().any(|c| c == column)
    }

    /// All values of a scalar column in row order; missing cells are `Null`.
    pub fn column(&self, column: &str) -> Result<Vec<Value>> {
        if column == "geometry" || !self.has_column(column) {
            return Err(StratumError::UnknownColumn(column.to_string()));
        }
        Ok(self
            .records
            .iter()
            .map(|r| r.get(column).unwrap_or(Value::Null))
            .collect())
    }

    /// Extent of the geometries; `None` for an empty header.
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        MultiPoint::from(self.records.iter().map(|r| r.geometry).collect::<Vec<_>>()).bounding_rect()
    }

    pub fn record(&self, id: &str) -> Option<&HeaderRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    // ---- lookups ----

    /// Rows for the given ids, in header order. Fails with
    /// [`StratumError::KeyNotFound`] for the first id that is absent.
    pub fn get<I, S>(&self, ids: I) -> Result<PointHeader>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let present = self.id_set();
        let mut wanted = HashSet::new();
        for id in ids {
            let id = id.as_ref();
            if !present.contains(id) {
                return Err(StratumError::KeyNotFound(id.to_string()));
            }
            wanted.insert(id.to_string());
        }
        Ok(self.filter(false, |r| wanted.contains(&r.id)))
    }

    /// Rows whose `column` matches any of `values`. Absent values are not an
    /// error; the result may be empty.
    pub fn get_by(&self, column: &str, values: &[Value]) -> Result<PointHeader> {
        if column == "geometry" || !self.has_column(column) {
            return Err(StratumError::UnknownColumn(column.to_string()));
        }
        Ok(self.filter(false, |r| {
            r.get(column)
                .map(|v| values.iter().any(|s| s.matches(&v)))
                .unwrap_or(false)
        }))
    }

    /// Rows whose id is in `ids`, in header order.
    pub fn retain_ids(&self, ids: &HashSet<&str>) -> PointHeader {
        self.derive(
            self.records
                .iter()
                .filter(|r| ids.contains(r.id.as_str()))
                .cloned()
                .collect(),
        )
    }

    // ---- spatial selections ----

    /// Objects whose geometry lies in the box (bounds inclusive).
    pub fn select_within_bbox(
        &self,
        xmin: f64,
        xmax: f64,
        ymin: f64,
        ymax: f64,
        invert: bool,
    ) -> PointHeader {
        self.filter(invert, |r| spatial::within_bbox(&r.geometry, xmin, xmax, ymin, ymax))
    }

    /// Objects closer than `buffer` to any of `points`.
    pub fn select_with_points(&self, points: &[Point<f64>], buffer: f64, invert: bool) -> PointHeader {
        self.filter(invert, |r| spatial::near_points(&r.geometry, points, buffer))
    }

    /// Objects closer than `buffer` to any of `lines`.
    pub fn select_with_lines(
        &self,
        lines: &[LineString<f64>],
        buffer: f64,
        invert: bool,
    ) -> PointHeader {
        self.filter(invert, |r| spatial::near_lines(&r.geometry, lines, buffer))
    }

    /// Objects matching any polygon under `predicate`, with the polygons
    /// optionally grown by `buffer`. Polygons in another CRS are reprojected
    /// to this header's reference first.
    pub fn select_within_polygons<'a>(
        &self,
        polygons: impl Into<PolygonSource<'a>>,
        buffer: f64,
        predicate: PolygonPredicate,
        invert: bool,
    ) -> Result<PointHeader> {
        let set = polygons.into().resolve(self.horizontal_reference)?;
        Ok(self.filter(invert, |r| set.matches(&r.geometry, buffer, predicate)))
    }

    /// For every object (in header order), the `column` label of the polygon
    /// it falls in, or `Null` when it falls in none.
    pub fn get_area_labels<'a>(
        &self,
        polygons: impl Into<PolygonSource<'a>>,
        column: &str,
    ) -> Result<Vec<(String, Value)>> {
        let set = polygons.into().resolve(self.horizontal_reference)?;
        Ok(self
            .records
            .iter()
            .map(|r| (r.id.clone(), set.label_at(&r.geometry, column)))
            .collect())
    }

    /// Header with the area labels of [`Self::get_area_labels`] added as
    /// `column`, replacing an existing column of that name.
    pub fn with_area_labels<'a>(
        &self,
        polygons: impl Into<PolygonSource<'a>>,
        column: &str,
    ) -> Result<PointHeader> {
        let labels: HashMap<String, Value> = self.get_area_labels(polygons, column)?.into_iter().collect();
        self.add_column(column, &labels, Value::Null)
    }

    // ---- attribute selections ----

    /// Filter on surface level and end, all bounds optional and inclusive.
    /// `top_*` compare against the datum surface level, `end_*` against the
    /// end in the header's vertical reference.
    pub fn select_by_depth(
        &self,
        top_min: Option<f64>,
        top_max: Option<f64>,
        end_min: Option<f64>,
        end_max: Option<f64>,
    ) -> PointHeader {
        self.filter(false, |r| {
            top_min.map_or(true, |v| r.surface >= v)
                && top_max.map_or(true, |v| r.surface <= v)
                && end_min.map_or(true, |v| r.end >= v)
                && end_max.map_or(true, |v| r.end <= v)
        })
    }

    /// Filter on object length (surface to end), bounds optional and inclusive.
    pub fn select_by_length(&self, min_length: Option<f64>, max_length: Option<f64>) -> PointHeader {
        let reference = self.vertical_reference;
        self.filter(false, |r| {
            let length = r.length(reference);
            min_length.map_or(true, |v| length >= v) && max_length.map_or(true, |v| length <= v)
        })
    }

    // ---- column append ----

    /// Append (or replace) an attribute column keyed by object id. Objects
    /// missing from `values` get `fill`.
    pub fn add_column(
        &self,
        column: &str,
        values: &HashMap<String, Value>,
        fill: Value,
    ) -> Result<PointHeader> {
        if HEADER_COLUMNS.contains(&column) {
            return Err(StratumError::DuplicateColumn(column.to_string()));
        }
        let records = self
            .records
            .iter()
            .map(|r| {
                let mut r = r.clone();
                let value = values.get(&r.id).cloned().unwrap_or_else(|| fill.clone());
                r.attributes.insert(column.to_string(), value);
                r
            })
            .collect();
        Ok(self.derive(records))
    }

    // ---- references ----

    /// Reproject to `target`. With `only_geometries` the scalar `x`/`y`
    /// columns are left untouched and keep their [`xy_reference`](Self::xy_reference);
    /// otherwise they are transformed from it to `target` as well.
    pub fn change_horizontal_reference(
        &self,
        target: HorizontalReference,
        only_geometries: bool,
    ) -> Result<PointHeader> {
        let transformer = self.horizontal_reference.transformer_to(target)?;
        let xy_transformer = if only_geometries || self.xy_reference == self.horizontal_reference {
            None
        } else {
            Some(self.xy_reference.transformer_to(target)?)
        };
        let records = self
            .records
            .iter()
            .map(|r| {
                let at_geometry = (r.x, r.y) == (r.geometry.x(), r.geometry.y());
                let (x, y) = transformer.transform(r.geometry.x(), r.geometry.y())?;
                let mut r = r.clone();
                r.geometry = Point::new(x, y);
                if !only_geometries {
                    (r.x, r.y) = match &xy_transformer {
                        Some(xy) => xy.transform(r.x, r.y)?,
                        None if at_geometry => (x, y),
                        None => transformer.transform(r.x, r.y)?,
                    };
                }
                Ok(r)
            })
            .collect::<Result<Vec<_>>>()?;
        log::info!(
            "changed header horizontal reference {} -> {target}",
            self.horizontal_reference
        );
        let xy_reference = if only_geometries { self.xy_reference } else { target };
        Ok(Self::from_parts(records, target, self.vertical_reference).with_xy_reference(xy_reference))
    }

    /// Re-express `end` in `target`. The datum surface level is unchanged.
    pub fn change_vertical_reference(&self, target: VerticalReference) -> PointHeader {
        let from = self.vertical_reference;
        let records = self
            .records
            .iter()
            .map(|r| {
                let mut r = r.clone();
                r.end = convert_vertical(r.end, r.surface, from, target);
                r
            })
            .collect();
        Self::from_parts(records, self.horizontal_reference, target).with_xy_reference(self.xy_reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::value::values;
    use crate::spatial::PolygonSet;
    use geo::{line_string, point, polygon};

    /// 5 x 5 grid of points at (1..=5, 1..=5), surface i, end -i.
    fn grid_header() -> PointHeader {
        let mut records = Vec::new();
        let mut n = 0;
        for x in 1..=5 {
            for y in 1..=5 {
                n += 1;
                records.push(HeaderRecord::new(
                    format!("nr{n}"),
                    x as f64,
                    y as f64,
                    n as f64,
                    -(n as f64),
                ));
            }
        }
        PointHeader::new(records, HorizontalReference::RD_NEW, VerticalReference::Datum).unwrap()
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let records = vec![
            HeaderRecord::new("A", 0.0, 0.0, 1.0, -1.0),
            HeaderRecord::new("A", 1.0, 1.0, 1.0, -1.0),
        ];
        let err = PointHeader::new(records, HorizontalReference::RD_NEW, VerticalReference::Datum);
        assert!(matches!(err, Err(StratumError::DuplicateId(id)) if id == "A"));
    }

    #[test]
    fn bbox_selection_and_inverse_partition() {
        let header = grid_header();
        let inside = header.select_within_bbox(1.0, 3.0, 1.0, 3.0, false);
        let outside = header.select_within_bbox(1.0, 3.0, 1.0, 3.0, true);
        assert_eq!(inside.len(), 9);
        assert_eq!(outside.len(), 16);
        assert_eq!(header.len(), 25, "receiver untouched");
    }

    #[test]
    fn empty_bbox_is_empty_not_error() {
        let header = grid_header();
        assert!(header.select_within_bbox(100.0, 200.0, 100.0, 200.0, false).is_empty());
    }

    #[test]
    fn point_and_line_selections() {
        let header = grid_header();
        let sel = header.select_with_points(&[point!(x: 1.0, y: 1.0), point!(x: 5.0, y: 5.0)], 1.1, false);
        // Each corner plus its two direct neighbours.
        assert_eq!(sel.len(), 6);

        let line = line_string![(x: 0.0, y: 3.0), (x: 6.0, y: 3.0)];
        let sel = header.select_with_lines(&[line], 0.5, false);
        assert_eq!(sel.len(), 5);
        assert!(sel.records().iter().all(|r| r.y == 3.0));
    }

    #[test]
    fn polygon_selection_policies() {
        let header = grid_header();
        let square = polygon![(x: 1.0, y: 1.0), (x: 3.0, y: 1.0), (x: 3.0, y: 3.0), (x: 1.0, y: 3.0), (x: 1.0, y: 1.0)];
        let set = PolygonSet::from_polygons(vec![square]);
        let within = header
            .select_within_polygons(&set, 0.0, PolygonPredicate::Within, false)
            .unwrap();
        assert_eq!(within.len(), 1, "only (2, 2) is strictly inside");
        let intersects = header
            .select_within_polygons(&set, 0.0, PolygonPredicate::Intersects, false)
            .unwrap();
        assert_eq!(intersects.len(), 9);
    }

    #[test]
    fn area_labels_follow_header_order() {
        let header = grid_header();
        let left = polygon![(x: 0.0, y: 0.0), (x: 2.5, y: 0.0), (x: 2.5, y: 6.0), (x: 0.0, y: 6.0), (x: 0.0, y: 0.0)];
        let set = PolygonSet::from_polygons(vec![left])
            .with_labels("unit", values(["west"]))
            .unwrap();
        let labels = header.get_area_labels(&set, "unit").unwrap();
        assert_eq!(labels.len(), 25);
        assert_eq!(labels[0], ("nr1".to_string(), Value::from("west")));
        assert_eq!(labels[24].1, Value::Null);

        let labelled = header.with_area_labels(&set, "unit").unwrap();
        assert!(labelled.has_column("unit"));
        let west = labelled.get_by("unit", &values(["west"])).unwrap();
        assert_eq!(west.len(), 10);
    }

    #[test]
    fn get_fails_on_missing_id() {
        let header = grid_header();
        assert_eq!(header.get(["nr1", "nr2"]).unwrap().len(), 2);
        assert!(matches!(header.get(["nr1", "zz"]), Err(StratumError::KeyNotFound(id)) if id == "zz"));
    }

    #[test]
    fn depth_and_length_bounds_are_inclusive() {
        let header = grid_header();
        assert_eq!(header.select_by_depth(None, None, None, Some(-20.0)).len(), 6);
        assert_eq!(header.select_by_depth(Some(3.0), Some(5.0), None, None).len(), 3);
        // Length is 2n for object n.
        assert_eq!(header.select_by_length(Some(10.0), Some(20.0)).len(), 6);
        assert_eq!(header.select_by_length(Some(50.0), None).len(), 1);
    }

    #[test]
    fn vertical_reference_round_trip() {
        let header = grid_header();
        let depth = header.change_vertical_reference(VerticalReference::Depth);
        assert_eq!(depth.records()[0].end, 2.0);
        assert_eq!(depth.records()[0].surface, 1.0);
        let back = depth.change_vertical_reference(VerticalReference::Datum);
        for (a, b) in back.records().iter().zip(header.records()) {
            assert!((a.end - b.end).abs() < 1e-12);
        }
    }

    #[test]
    fn only_geometries_leaves_scalar_columns() {
        let records = vec![HeaderRecord::new("A", 500000.0, 5800000.0, 0.0, -10.0)];
        let header =
            PointHeader::new(records, HorizontalReference(32631), VerticalReference::Datum).unwrap();
        let moved = header
            .change_horizontal_reference(HorizontalReference::WGS84, true)
            .unwrap();
        let rec = &moved.records()[0];
        assert_eq!((rec.x, rec.y), (500000.0, 5800000.0));
        assert!((rec.geometry.x() - 3.0).abs() < 1e-6);
        assert_eq!(moved.horizontal_reference(), HorizontalReference::WGS84);
        assert_eq!(moved.xy_reference(), HorizontalReference(32631));
        assert_eq!(moved.retain_ids(&["A"].into()).xy_reference(), HorizontalReference(32631));
    }

    #[test]
    fn full_reprojection_after_geometry_only_uses_scalar_reference() {
        let records = vec![HeaderRecord::new("A", 500000.0, 5800000.0, 0.0, -10.0)];
        let header =
            PointHeader::new(records, HorizontalReference(32631), VerticalReference::Datum).unwrap();
        let moved = header
            .change_horizontal_reference(HorizontalReference::WGS84, true)
            .unwrap();

        let back = moved
            .change_horizontal_reference(HorizontalReference(32631), false)
            .unwrap();
        let rec = &back.records()[0];
        assert_eq!((rec.x, rec.y), (500000.0, 5800000.0));
        assert!((rec.geometry.x() - 500000.0).abs() < 1e-3);
        assert!((rec.geometry.y() - 5800000.0).abs() < 1e-3);
        assert_eq!(back.xy_reference(), HorizontalReference(32631));

        let rd = moved
            .change_horizontal_reference(HorizontalReference::RD_NEW, false)
            .unwrap();
        let rec = &rd.records()[0];
        assert!((rec.x - rec.geometry.x()).abs() < 1e-3);
        assert!((rec.y - rec.geometry.y()).abs() < 1e-3);
        assert_eq!(rd.xy_reference(), HorizontalReference::RD_NEW);
    }

    #[test]
    fn add_column_rejects_builtin_names() {
        let header = grid_header();
        assert!(matches!(
            header.add_column("x", &HashMap::new(), Value::Null),
            Err(StratumError::DuplicateColumn(_))
        ));
    }
}
