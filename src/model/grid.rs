use std::collections::BTreeMap;

use geo::Point;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StratumError};

/// Grid axes of a voxel model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Axis::X => write!(f, "x"),
            Axis::Y => write!(f, "y"),
            Axis::Z => write!(f, "z"),
        }
    }
}

/// Index of the centre nearest to `value` in ascending `centres`.
pub(crate) fn nearest_index(centres: &[f64], value: f64) -> Option<usize> {
    if centres.is_empty() || !value.is_finite() {
        return None;
    }
    let i = centres.partition_point(|c| *c < value);
    if i == 0 {
        return Some(0);
    }
    if i == centres.len() {
        return Some(i - 1);
    }
    if value - centres[i - 1] <= centres[i] - value {
        Some(i - 1)
    } else {
        Some(i)
    }
}

// ---------------------------------------------------------------------------
// LabeledArray2 – a (y, x) raster
// ---------------------------------------------------------------------------

/// A 2D raster on the horizontal axes of a voxel model, row-major `(y, x)`.
/// NaN marks "no data".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LabeledArray2Repr")]
pub struct LabeledArray2 {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub values: Vec<f64>,
}

#[derive(Deserialize)]
struct LabeledArray2Repr {
    x: Vec<f64>,
    y: Vec<f64>,
    values: Vec<f64>,
}

impl TryFrom<LabeledArray2Repr> for LabeledArray2 {
    type Error = StratumError;

    fn try_from(repr: LabeledArray2Repr) -> Result<Self> {
        Self::new(repr.x, repr.y, repr.values)
    }
}

impl LabeledArray2 {
    pub fn new(x: Vec<f64>, y: Vec<f64>, values: Vec<f64>) -> Result<Self> {
        if values.len() != x.len() * y.len() {
            return Err(StratumError::Shape(format!(
                "raster of {} values does not fit {} x {} cells",
                values.len(),
                y.len(),
                x.len()
            )));
        }
        Ok(Self { x, y, values })
    }

    /// Same value everywhere.
    pub fn filled(x: Vec<f64>, y: Vec<f64>, value: f64) -> Self {
        let values = vec![value; x.len() * y.len()];
        Self { x, y, values }
    }

    pub(crate) fn from_fn<F>(x: &[f64], y: &[f64], mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> f64,
    {
        let mut values = Vec::with_capacity(x.len() * y.len());
        for iy in 0..y.len() {
            for ix in 0..x.len() {
                values.push(f(iy, ix));
            }
        }
        Self {
            x: x.to_vec(),
            y: y.to_vec(),
            values,
        }
    }

    /// `(ny, nx)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.y.len(), self.x.len())
    }

    pub fn get(&self, iy: usize, ix: usize) -> f64 {
        self.values[iy * self.x.len() + ix]
    }

    /// Value of the cell whose centre is nearest to `(x, y)`.
    pub fn value_at(&self, x: f64, y: f64) -> Option<f64> {
        let ix = nearest_index(&self.x, x)?;
        let iy = nearest_index(&self.y, y)?;
        Some(self.get(iy, ix))
    }

    /// Whether the raster lies on the given axes, up to rounding.
    pub fn matches_axes(&self, x: &[f64], y: &[f64]) -> bool {
        fn same(a: &[f64], b: &[f64]) -> bool {
            a.len() == b.len()
                && a.iter()
                    .zip(b)
                    .all(|(p, q)| (p - q).abs() <= 1e-9 * p.abs().max(1.0))
        }
        same(&self.x, x) && same(&self.y, y)
    }
}

// ---------------------------------------------------------------------------
// ProfileSamples – z profiles at scattered points
// ---------------------------------------------------------------------------

/// Full z profiles at a sequence of points, stacked along an `idx`
/// dimension in input order. Points outside the grid have all-NaN profiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSamples {
    pub points: Vec<Point<f64>>,
    /// Optional label per point, e.g. the object id it was sampled for.
    pub labels: Vec<String>,
    pub z: Vec<f64>,
    /// Per variable, row-major `(idx, z)`.
    pub variables: BTreeMap<String, Vec<f64>>,
}

impl ProfileSamples {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Attach labels (builder style); ignored when the count differs.
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        if labels.len() == self.points.len() {
            self.labels = labels;
        } else {
            log::warn!(
                "{} labels for {} sampled points, labels not attached",
                labels.len(),
                self.points.len()
            );
        }
        self
    }

    /// Profile of `variable` at sample `idx`.
    pub fn profile(&self, variable: &str, idx: usize) -> Option<&[f64]> {
        let nz = self.z.len();
        self.variables
            .get(variable)
            .filter(|_| idx < self.points.len())
            .map(|values| &values[idx * nz..(idx + 1) * nz])
    }

    /// Whether every variable at sample `idx` is NaN.
    pub fn is_empty_profile(&self, idx: usize) -> bool {
        self.variables
            .keys()
            .filter_map(|v| self.profile(v, idx))
            .all(|p| p.iter().all(|v| v.is_nan()))
    }
}

// ---------------------------------------------------------------------------
// Section – z profiles along a line
// ---------------------------------------------------------------------------

/// Profiles sampled along a line, indexed by distance from the line start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub dist: Vec<f64>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
    /// Per variable, row-major `(dist, z)`.
    pub variables: BTreeMap<String, Vec<f64>>,
}

impl Section {
    pub fn len(&self) -> usize {
        self.dist.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dist.is_empty()
    }

    pub fn profile(&self, variable: &str, i: usize) -> Option<&[f64]> {
        let nz = self.z.len();
        self.variables
            .get(variable)
            .filter(|_| i < self.dist.len())
            .map(|values| &values[i * nz..(i + 1) * nz])
    }
}

// ---------------------------------------------------------------------------
// ValueCounts
// ---------------------------------------------------------------------------

/// Occurrences of each distinct value of a variable, optionally per
/// coordinate along one axis. NaN cells are not counted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueCounts {
    /// Distinct values, ascending.
    pub values: Vec<f64>,
    /// Axis the counts are kept along; `None` for whole-model totals.
    pub axis: Option<Axis>,
    /// Coordinates along `axis` (empty for totals).
    pub coords: Vec<f64>,
    /// `counts[i][j]`: occurrences of `values[j]` at `coords[i]`; a single
    /// row for totals.
    pub counts: Vec<Vec<usize>>,
}

impl ValueCounts {
    /// Total occurrences of `value` over all rows.
    pub fn total(&self, value: f64) -> usize {
        match self.values.iter().position(|v| *v == value) {
            Some(j) => self.counts.iter().map(|row| row[j]).sum(),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_index_rounds_to_closest_centre() {
        let centres = [0.5, 1.5, 2.5];
        assert_eq!(nearest_index(&centres, -10.0), Some(0));
        assert_eq!(nearest_index(&centres, 1.4), Some(1));
        assert_eq!(nearest_index(&centres, 2.1), Some(2));
        assert_eq!(nearest_index(&centres, 9.0), Some(2));
        assert_eq!(nearest_index(&[], 1.0), None);
    }

    #[test]
    fn raster_shape_is_checked() {
        assert!(LabeledArray2::new(vec![0.0, 1.0], vec![0.0], vec![1.0]).is_err());
        let raster = LabeledArray2::new(vec![0.0, 1.0], vec![0.0, 1.0], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(raster.get(1, 0), 3.0);
        assert_eq!(raster.value_at(0.9, 0.1), Some(2.0));
        assert!(raster.matches_axes(&[0.0, 1.0 + 1e-12], &[0.0, 1.0]));
        assert!(!raster.matches_axes(&[0.0, 2.0], &[0.0, 1.0]));
    }

    #[test]
    fn deserialized_raster_is_shape_checked() {
        let ok: LabeledArray2 = serde_json::from_str(r#"{"x": [0.0], "y": [0.0, 1.0], "values": [1.0, 2.0]}"#).unwrap();
        assert_eq!(ok.shape(), (2, 1));
        let short = serde_json::from_str::<LabeledArray2>(r#"{"x": [0.0, 1.0], "y": [0.0, 1.0], "values": [1.0]}"#);
        assert!(short.is_err());
    }
}
