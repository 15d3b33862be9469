//! Spatial predicates and selection geometries.
//!
//! Headers and voxel models select with in-memory `geo` geometries. Polygon
//! selections additionally accept a GeoJSON-like file of labelled polygons,
//! which is read and coerced to the caller's horizontal reference.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use geo::{
    BoundingRect, Contains, Coord, EuclideanDistance, Intersects, LineString, MapCoords,
    Point, Polygon, Rect,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::data::value::Value;
use crate::error::{Result, StratumError};
use crate::reference::HorizontalReference;

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

/// How a point is matched against selection polygons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PolygonPredicate {
    /// Point lies in a polygon's interior; boundary points are excluded.
    #[default]
    Within,
    /// Point lies in a polygon's interior or on its boundary.
    Intersects,
}

/// Inclusive bounding-box test.
#[inline]
pub fn within_bbox(point: &Point<f64>, xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> bool {
    point.x() >= xmin && point.x() <= xmax && point.y() >= ymin && point.y() <= ymax
}

/// Strictly closer than `buffer` to any of `points`.
pub fn near_points(point: &Point<f64>, points: &[Point<f64>], buffer: f64) -> bool {
    points.iter().any(|p| point.euclidean_distance(p) < buffer)
}

/// Strictly closer than `buffer` to any of `lines`.
pub fn near_lines(point: &Point<f64>, lines: &[LineString<f64>], buffer: f64) -> bool {
    lines.iter().any(|l| point.euclidean_distance(l) < buffer)
}

/// Point matched against a polygon with the given predicate, optionally
/// grown by `buffer`.
pub fn in_polygon(
    point: &Point<f64>,
    polygon: &Polygon<f64>,
    buffer: f64,
    predicate: PolygonPredicate,
) -> bool {
    let hit = match predicate {
        PolygonPredicate::Within => polygon.contains(point),
        PolygonPredicate::Intersects => polygon.intersects(point),
    };
    hit || (buffer > 0.0 && point.euclidean_distance(polygon) < buffer)
}

// ---------------------------------------------------------------------------
// Polygon sets
// ---------------------------------------------------------------------------

/// A polygon with the attribute values it carries in its source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledPolygon {
    pub polygon: Polygon<f64>,
    pub labels: BTreeMap<String, Value>,
}

/// Polygons used for selections and area labelling. `crs` is `None` when the
/// source did not declare one; it is then assumed to match the data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolygonSet {
    pub polygons: Vec<LabeledPolygon>,
    pub crs: Option<HorizontalReference>,
}

impl PolygonSet {
    pub fn new(polygons: Vec<LabeledPolygon>, crs: Option<HorizontalReference>) -> Self {
        Self { polygons, crs }
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    /// Plain polygons without labels or CRS.
    pub fn from_polygons(polygons: Vec<Polygon<f64>>) -> Self {
        Self {
            polygons: polygons
                .into_iter()
                .map(|polygon| LabeledPolygon {
                    polygon,
                    labels: BTreeMap::new(),
                })
                .collect(),
            crs: None,
        }
    }

    /// Attach a label column, one value per polygon (builder style).
    pub fn with_labels(mut self, column: &str, labels: Vec<Value>) -> Result<Self> {
        if labels.len() != self.polygons.len() {
            return Err(StratumError::Schema(format!(
                "{} labels for {} polygons",
                labels.len(),
                self.polygons.len()
            )));
        }
        for (poly, label) in self.polygons.iter_mut().zip(labels) {
            poly.labels.insert(column.to_string(), label);
        }
        Ok(self)
    }

    pub fn with_crs(mut self, crs: HorizontalReference) -> Self {
        self.crs = Some(crs);
        self
    }

    pub fn iter_polygons(&self) -> impl Iterator<Item = &Polygon<f64>> {
        self.polygons.iter().map(|p| &p.polygon)
    }

    /// Bounding rectangle of all polygons, `None` when empty.
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        self.iter_polygons()
            .filter_map(|p| p.bounding_rect())
            .reduce(|a, b| {
                Rect::new(
                    Coord {
                        x: a.min().x.min(b.min().x),
                        y: a.min().y.min(b.min().y),
                    },
                    Coord {
                        x: a.max().x.max(b.max().x),
                        y: a.max().y.max(b.max().y),
                    },
                )
            })
    }

    /// Whether `point` matches any polygon.
    pub fn matches(
        &self,
        point: &Point<f64>,
        buffer: f64,
        predicate: PolygonPredicate,
    ) -> bool {
        self.iter_polygons()
            .any(|poly| in_polygon(point, poly, buffer, predicate))
    }

    /// Label of the first polygon intersecting `point`, `Null` if none does
    /// or the polygon lacks the column.
    pub fn label_at(&self, point: &Point<f64>, column: &str) -> Value {
        self.polygons
            .iter()
            .find(|p| p.polygon.intersects(point))
            .and_then(|p| p.labels.get(column).cloned())
            .unwrap_or(Value::Null)
    }

    /// Express the set in `target`. Sets without a CRS are assumed to be in
    /// `target` already.
    pub fn coerce_to(&self, target: HorizontalReference) -> Result<PolygonSet> {
        match self.crs {
            None => {
                log::warn!(
                    "selection polygons have no crs, assuming {target}; check whether this is correct"
                );
                Ok(PolygonSet {
                    polygons: self.polygons.clone(),
                    crs: Some(target),
                })
            }
            Some(crs) if crs == target => Ok(self.clone()),
            Some(crs) => {
                log::info!("reprojecting selection polygons from {crs} to {target}");
                let transformer = crs.transformer_to(target)?;
                let polygons = self
                    .polygons
                    .iter()
                    .map(|p| {
                        let polygon = p.polygon.try_map_coords(|c| {
                            transformer.transform(c.x, c.y).map(|(x, y)| Coord { x, y })
                        })?;
                        Ok(LabeledPolygon {
                            polygon,
                            labels: p.labels.clone(),
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(PolygonSet {
                    polygons,
                    crs: Some(target),
                })
            }
        }
    }

    /// Read polygons from a GeoJSON-like feature collection.
    ///
    /// Accepted layout:
    ///
    /// ```json
    /// {
    ///   "type": "FeatureCollection",
    ///   "crs": { "properties": { "name": "EPSG:28992" } },
    ///   "features": [
    ///     { "properties": { "unit": "A" },
    ///       "geometry": { "type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]] } }
    ///   ]
    /// }
    /// ```
    ///
    /// `MultiPolygon` features are split into one entry per part with the
    /// same labels.
    pub fn from_json_file(path: &Path) -> Result<PolygonSet> {
        let text = std::fs::read_to_string(path)?;
        let set = Self::from_json_str(&text)?;
        log::info!("read {} polygon(s) from {}", set.len(), path.display());
        Ok(set)
    }

    pub fn from_json_str(text: &str) -> Result<PolygonSet> {
        let root: JsonValue = serde_json::from_str(text)?;
        let crs = root
            .pointer("/crs/properties/name")
            .and_then(|v| v.as_str())
            .and_then(|name| name.rsplit(':').next())
            .and_then(|code| code.parse::<u32>().ok())
            .map(HorizontalReference);

        let features = root
            .get("features")
            .and_then(|f| f.as_array())
            .ok_or_else(|| StratumError::Schema("expected a 'features' array".into()))?;

        let mut polygons = Vec::with_capacity(features.len());
        for (i, feature) in features.iter().enumerate() {
            let labels: BTreeMap<String, Value> = feature
                .get("properties")
                .and_then(|p| p.as_object())
                .map(|props| {
                    props
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::from(v)))
                        .collect()
                })
                .unwrap_or_default();

            let geometry = feature
                .get("geometry")
                .ok_or_else(|| StratumError::Schema(format!("feature {i} has no geometry")))?;
            let kind = geometry.get("type").and_then(|t| t.as_str()).unwrap_or("");
            let coords = geometry
                .get("coordinates")
                .ok_or_else(|| StratumError::Schema(format!("feature {i} has no coordinates")))?;

            match kind {
                "Polygon" => polygons.push(LabeledPolygon {
                    polygon: json_polygon(coords, i)?,
                    labels,
                }),
                "MultiPolygon" => {
                    let parts = coords.as_array().ok_or_else(|| {
                        StratumError::Schema(format!("feature {i}: invalid MultiPolygon"))
                    })?;
                    for part in parts {
                        polygons.push(LabeledPolygon {
                            polygon: json_polygon(part, i)?,
                            labels: labels.clone(),
                        });
                    }
                }
                other => {
                    return Err(StratumError::Schema(format!(
                        "feature {i}: unsupported geometry type '{other}'"
                    )))
                }
            }
        }
        Ok(PolygonSet { polygons, crs })
    }
}

impl From<Vec<Polygon<f64>>> for PolygonSet {
    fn from(polygons: Vec<Polygon<f64>>) -> Self {
        PolygonSet::from_polygons(polygons)
    }
}

/// Where selection polygons come from: memory or a file read on use.
#[derive(Debug, Clone)]
pub enum PolygonSource<'a> {
    Set(&'a PolygonSet),
    File(PathBuf),
}

impl<'a> PolygonSource<'a> {
    /// Materialise the polygons in `target`.
    pub fn resolve(&self, target: HorizontalReference) -> Result<PolygonSet> {
        match self {
            PolygonSource::Set(set) => set.coerce_to(target),
            PolygonSource::File(path) => PolygonSet::from_json_file(path)?.coerce_to(target),
        }
    }
}

impl<'a> From<&'a PolygonSet> for PolygonSource<'a> {
    fn from(set: &'a PolygonSet) -> Self {
        PolygonSource::Set(set)
    }
}

impl<'a> From<&'a Path> for PolygonSource<'a> {
    fn from(path: &'a Path) -> Self {
        PolygonSource::File(path.to_path_buf())
    }
}

impl<'a> From<PathBuf> for PolygonSource<'a> {
    fn from(path: PathBuf) -> Self {
        PolygonSource::File(path)
    }
}

// -- JSON helpers --

fn json_ring(value: &JsonValue, feature: usize) -> Result<LineString<f64>> {
    let points = value
        .as_array()
        .ok_or_else(|| StratumError::Schema(format!("feature {feature}: ring is not an array")))?;
    points
        .iter()
        .map(|p| {
            let xy = p.as_array().filter(|a| a.len() >= 2);
            match xy.map(|a| (a[0].as_f64(), a[1].as_f64())) {
                Some((Some(x), Some(y))) => Ok(Coord { x, y }),
                _ => Err(StratumError::Schema(format!(
                    "feature {feature}: invalid coordinate {p}"
                ))),
            }
        })
        .collect::<Result<Vec<_>>>()
        .map(LineString::new)
}

fn json_polygon(value: &JsonValue, feature: usize) -> Result<Polygon<f64>> {
    let rings = value
        .as_array()
        .filter(|r| !r.is_empty())
        .ok_or_else(|| StratumError::Schema(format!("feature {feature}: polygon has no rings")))?;
    let exterior = json_ring(&rings[0], feature)?;
    let interiors = rings[1..]
        .iter()
        .map(|r| json_ring(r, feature))
        .collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, point, polygon};

    fn square() -> Polygon<f64> {
        polygon![(x: 0.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: 2.0), (x: 0.0, y: 2.0), (x: 0.0, y: 0.0)]
    }

    #[test]
    fn polygon_predicates_differ_on_boundary() {
        let edge = point!(x: 2.0, y: 1.0);
        assert!(!in_polygon(&edge, &square(), 0.0, PolygonPredicate::Within));
        assert!(in_polygon(&edge, &square(), 0.0, PolygonPredicate::Intersects));
        let outside = point!(x: 2.5, y: 1.0);
        assert!(in_polygon(&outside, &square(), 1.0, PolygonPredicate::Within));
    }

    #[test]
    fn buffers_are_strict() {
        let p = point!(x: 0.0, y: 0.0);
        assert!(!near_points(&p, &[point!(x: 1.0, y: 0.0)], 1.0));
        assert!(near_points(&p, &[point!(x: 1.0, y: 0.0)], 1.01));
        let line = line_string![(x: -5.0, y: 0.5), (x: 5.0, y: 0.5)];
        assert!(near_lines(&p, &[line], 0.6));
    }

    #[test]
    fn read_feature_collection() {
        let json = r#"{
            "type": "FeatureCollection",
            "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::28992" } },
            "features": [
                { "type": "Feature", "properties": { "unit": "A", "code": 3 },
                  "geometry": { "type": "Polygon", "coordinates": [[[0,0],[2,0],[2,2],[0,2],[0,0]]] } },
                { "type": "Feature", "properties": { "unit": "B" },
                  "geometry": { "type": "MultiPolygon", "coordinates": [
                      [[[5,5],[6,5],[6,6],[5,6],[5,5]]],
                      [[[8,8],[9,8],[9,9],[8,9],[8,8]]]
                  ] } }
            ]
        }"#;
        let set = PolygonSet::from_json_str(json).unwrap();
        assert_eq!(set.crs, Some(HorizontalReference::RD_NEW));
        assert_eq!(set.len(), 3);
        assert_eq!(set.label_at(&point!(x: 1.0, y: 1.0), "unit"), Value::from("A"));
        assert_eq!(set.label_at(&point!(x: 8.5, y: 8.5), "unit"), Value::from("B"));
        assert_eq!(set.label_at(&point!(x: 3.0, y: 3.0), "unit"), Value::Null);
        let rect = set.bounding_rect().unwrap();
        assert_eq!((rect.min().x, rect.max().y), (0.0, 9.0));
    }

    #[test]
    fn unsupported_geometry_is_schema_error() {
        let json = r#"{ "features": [ { "geometry": { "type": "Point", "coordinates": [1, 2] } } ] }"#;
        assert!(matches!(
            PolygonSet::from_json_str(json),
            Err(StratumError::Schema(_))
        ));
    }
}
