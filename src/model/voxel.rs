use std::collections::BTreeMap;
use std::ops::Range;

use geo::{EuclideanLength, LineInterpolatePoint, LineString, Point};
use serde::{Deserialize, Serialize};

use super::grid::{nearest_index, Axis, LabeledArray2, ProfileSamples, Section, ValueCounts};
use crate::error::{Result, StratumError};
use crate::reference::HorizontalReference;
use crate::spatial::{PolygonPredicate, PolygonSource};

const SPACING_TOLERANCE: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// Cell size along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
}

/// One bound of a vertical slice: a single elevation or an elevation per
/// `(y, x)` column.
#[derive(Debug, Clone, Copy)]
pub enum DepthBound<'a> {
    Scalar(f64),
    Surface(&'a LabeledArray2),
}

impl DepthBound<'_> {
    fn at(&self, iy: usize, ix: usize) -> f64 {
        match self {
            DepthBound::Scalar(v) => *v,
            DepthBound::Surface(raster) => raster.get(iy, ix),
        }
    }

    fn is_scalar(&self) -> bool {
        matches!(self, DepthBound::Scalar(_))
    }
}

/// What a vertical slice does with cells outside the bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VoxelSlicePolicy {
    /// Always keep the z axis and set outside cells to NaN.
    Mask,
    /// Crop the z axis when both bounds are scalar; mask otherwise.
    #[default]
    TruncateScalar,
}

/// Sample spacing along a line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LineSampling {
    /// A sample every `d` metres from the start.
    Distance(f64),
    /// `n` evenly spaced samples including both ends.
    Count(usize),
}

fn check_axis(name: &str, values: &[f64]) -> Result<()> {
    if values.iter().any(|v| !v.is_finite()) {
        return Err(StratumError::Shape(format!("{name} axis has non-finite coordinates")));
    }
    if values.windows(2).any(|w| w[1] <= w[0]) {
        return Err(StratumError::Shape(format!("{name} axis is not strictly increasing")));
    }
    Ok(())
}

fn spacing(name: &str, values: &[f64]) -> Result<f64> {
    if values.len() < 2 {
        return Err(StratumError::Shape(format!(
            "cannot infer {name} resolution from {} coordinate(s)",
            values.len()
        )));
    }
    Ok(values[1] - values[0])
}

fn is_uniform(values: &[f64], step: f64) -> bool {
    values
        .windows(2)
        .all(|w| ((w[1] - w[0]) - step).abs() <= SPACING_TOLERANCE * step.abs().max(1.0))
}

/// Indices of ascending `centres` within `[min, max]`.
fn index_range(centres: &[f64], min: f64, max: f64) -> Range<usize> {
    let start = centres.partition_point(|c| *c < min);
    let end = centres.partition_point(|c| *c <= max);
    start..end.max(start)
}

// ---------------------------------------------------------------------------
// VoxelModel
// ---------------------------------------------------------------------------

/// A gridded 3D model. Coordinates are cell centres in ascending order;
/// `z` holds datum elevations. Variables are stored row-major `(y, x, z)`
/// and use NaN for "no data".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "VoxelModelRepr")]
pub struct VoxelModel {
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
    resolution: Resolution,
    crs: HorizontalReference,
    variables: BTreeMap<String, Vec<f64>>,
}

/// Serialized form; deserializing goes through
/// [`VoxelModel::with_resolution`].
#[derive(Deserialize)]
struct VoxelModelRepr {
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
    resolution: Resolution,
    crs: HorizontalReference,
    variables: BTreeMap<String, Vec<f64>>,
}

impl TryFrom<VoxelModelRepr> for VoxelModel {
    type Error = StratumError;

    fn try_from(repr: VoxelModelRepr) -> Result<Self> {
        Self::with_resolution(repr.x, repr.y, repr.z, repr.resolution, repr.variables, repr.crs)
    }
}

impl VoxelModel {
    /// Build a model, inferring the resolution from the coordinate spacing.
    /// Every axis needs at least two coordinates.
    pub fn new(
        x: Vec<f64>,
        y: Vec<f64>,
        z: Vec<f64>,
        variables: BTreeMap<String, Vec<f64>>,
        crs: HorizontalReference,
    ) -> Result<Self> {
        let resolution = Resolution {
            dx: spacing("x", &x)?,
            dy: spacing("y", &y)?,
            dz: spacing("z", &z)?,
        };
        Self::with_resolution(x, y, z, resolution, variables, crs)
    }

    /// Build a model with an explicit resolution.
    pub fn with_resolution(
        x: Vec<f64>,
        y: Vec<f64>,
        z: Vec<f64>,
        resolution: Resolution,
        variables: BTreeMap<String, Vec<f64>>,
        crs: HorizontalReference,
    ) -> Result<Self> {
        check_axis("x", &x)?;
        check_axis("y", &y)?;
        check_axis("z", &z)?;
        if [resolution.dx, resolution.dy, resolution.dz]
            .iter()
            .any(|d| !d.is_finite() || *d <= 0.0)
        {
            return Err(StratumError::Shape(format!(
                "resolution must be positive, got {resolution:?}"
            )));
        }
        let cells = x.len() * y.len() * z.len();
        for (name, values) in &variables {
            if values.len() != cells {
                return Err(StratumError::Shape(format!(
                    "variable '{name}' has {} values, expected {} (y={}, x={}, z={})",
                    values.len(),
                    cells,
                    y.len(),
                    x.len(),
                    z.len()
                )));
            }
        }
        let model = Self {
            x,
            y,
            z,
            resolution,
            crs,
            variables,
        };
        if !model.is_regular() {
            log::warn!(
                "voxel model spacing differs from resolution {:?}; resolution-based bounds are approximate",
                model.resolution
            );
        }
        Ok(model)
    }

    // ---- descriptors ----

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn z(&self) -> &[f64] {
        &self.z
    }

    pub fn crs(&self) -> HorizontalReference {
        self.crs
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Variable names.
    pub fn variables(&self) -> Vec<&str> {
        self.variables.keys().map(String::as_str).collect()
    }

    pub fn variable(&self, name: &str) -> Option<&[f64]> {
        self.variables.get(name).map(Vec::as_slice)
    }

    /// `(ny, nx, nz)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.y.len(), self.x.len(), self.z.len())
    }

    pub fn sizes(&self) -> BTreeMap<Axis, usize> {
        BTreeMap::from([
            (Axis::X, self.x.len()),
            (Axis::Y, self.y.len()),
            (Axis::Z, self.z.len()),
        ])
    }

    /// Whether every axis is evenly spaced at the model resolution.
    pub fn is_regular(&self) -> bool {
        is_uniform(&self.x, self.resolution.dx)
            && is_uniform(&self.y, self.resolution.dy)
            && is_uniform(&self.z, self.resolution.dz)
    }

    /// `(xmin, ymin, xmax, ymax)` of the cell edges; `None` when empty.
    pub fn horizontal_bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let (x0, x1) = (self.x.first()?, self.x.last()?);
        let (y0, y1) = (self.y.first()?, self.y.last()?);
        let (hx, hy) = (self.resolution.dx / 2.0, self.resolution.dy / 2.0);
        Some((x0 - hx, y0 - hy, x1 + hx, y1 + hy))
    }

    /// `(zmin, zmax)` of the cell edges; `None` when empty.
    pub fn vertical_bounds(&self) -> Option<(f64, f64)> {
        let hz = self.resolution.dz / 2.0;
        Some((self.z.first()? - hz, self.z.last()? + hz))
    }

    #[inline]
    fn index(&self, iy: usize, ix: usize, iz: usize) -> usize {
        (iy * self.x.len() + ix) * self.z.len() + iz
    }

    /// Value of `variable` in one cell.
    pub fn get(&self, variable: &str, iy: usize, ix: usize, iz: usize) -> Option<f64> {
        let (ny, nx, nz) = self.shape();
        if iy >= ny || ix >= nx || iz >= nz {
            return None;
        }
        self.variables.get(variable).map(|v| v[self.index(iy, ix, iz)])
    }

    fn require(&self, variable: &str) -> Result<&[f64]> {
        self.variable(variable)
            .ok_or_else(|| StratumError::UnknownColumn(variable.to_string()))
    }

    /// Column `(iy, ix)` of a variable array.
    fn column<'v>(&self, values: &'v [f64], iy: usize, ix: usize) -> &'v [f64] {
        let start = self.index(iy, ix, 0);
        &values[start..start + self.z.len()]
    }

    /// Whether any variable holds data in cell `(iy, ix, iz)`.
    fn populated(&self, iy: usize, ix: usize, iz: usize) -> bool {
        let i = self.index(iy, ix, iz);
        self.variables.values().any(|v| !v[i].is_nan())
    }

    // ---- building blocks ----

    fn crop(&self, ys: Range<usize>, xs: Range<usize>, zs: Range<usize>) -> VoxelModel {
        let variables = self
            .variables
            .iter()
            .map(|(name, values)| {
                let mut out = Vec::with_capacity(ys.len() * xs.len() * zs.len());
                for iy in ys.clone() {
                    for ix in xs.clone() {
                        let start = self.index(iy, ix, 0);
                        out.extend_from_slice(&values[start + zs.start..start + zs.end]);
                    }
                }
                (name.clone(), out)
            })
            .collect();
        VoxelModel {
            x: self.x[xs].to_vec(),
            y: self.y[ys].to_vec(),
            z: self.z[zs].to_vec(),
            resolution: self.resolution,
            crs: self.crs,
            variables,
        }
    }

    /// Copy with every cell where `keep` is false set to NaN.
    fn mask<F>(&self, keep: F) -> VoxelModel
    where
        F: Fn(usize, usize, usize) -> bool,
    {
        let (ny, nx, nz) = self.shape();
        let mut model = self.clone();
        for iy in 0..ny {
            for ix in 0..nx {
                for iz in 0..nz {
                    if !keep(iy, ix, iz) {
                        let i = self.index(iy, ix, iz);
                        for values in model.variables.values_mut() {
                            values[i] = f64::NAN;
                        }
                    }
                }
            }
        }
        model
    }

    /// Column indices for a point, `None` outside the horizontal bounds.
    fn locate(&self, point: &Point<f64>) -> Option<(usize, usize)> {
        let (xmin, ymin, xmax, ymax) = self.horizontal_bounds()?;
        if point.x() < xmin || point.x() > xmax || point.y() < ymin || point.y() > ymax {
            return None;
        }
        Some((nearest_index(&self.y, point.y())?, nearest_index(&self.x, point.x())?))
    }

    /// Profiles at `points`, row-major `(idx, z)`, NaN outside the grid.
    fn profiles(&self, points: &[Point<f64>]) -> BTreeMap<String, Vec<f64>> {
        let nz = self.z.len();
        let cells: Vec<Option<(usize, usize)>> = points.iter().map(|p| self.locate(p)).collect();
        self.variables
            .iter()
            .map(|(name, values)| {
                let mut out = Vec::with_capacity(points.len() * nz);
                for cell in &cells {
                    match cell {
                        Some((iy, ix)) => out.extend_from_slice(self.column(values, *iy, *ix)),
                        None => out.extend(std::iter::repeat(f64::NAN).take(nz)),
                    }
                }
                (name.clone(), out)
            })
            .collect()
    }

    // ---- spatial selections ----

    /// Cells whose centre lies in the box, bounds inclusive. The axes are
    /// sliced, not resampled.
    pub fn select_within_bbox(&self, xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> VoxelModel {
        let xs = index_range(&self.x, xmin, xmax);
        let ys = index_range(&self.y, ymin, ymax);
        self.crop(ys, xs, 0..self.z.len())
    }

    /// Crop to the polygons' extent and set columns whose centre does not
    /// match any polygon to NaN. With `invert` matching columns are masked
    /// and the extent is kept.
    pub fn select_within_polygons<'a>(
        &self,
        polygons: impl Into<PolygonSource<'a>>,
        buffer: f64,
        predicate: PolygonPredicate,
        invert: bool,
    ) -> Result<VoxelModel> {
        let set = polygons.into().resolve(self.crs)?;
        let base = match (invert, set.bounding_rect()) {
            (false, Some(rect)) => self.select_within_bbox(
                rect.min().x - buffer,
                rect.max().x + buffer,
                rect.min().y - buffer,
                rect.max().y + buffer,
            ),
            (false, None) => self.crop(0..0, 0..0, 0..self.z.len()),
            (true, _) => self.clone(),
        };
        let (ny, nx, _) = base.shape();
        let mut keep = vec![false; ny * nx];
        for iy in 0..ny {
            for ix in 0..nx {
                let centre = Point::new(base.x[ix], base.y[iy]);
                keep[iy * nx + ix] = set.matches(&centre, buffer, predicate) != invert;
            }
        }
        Ok(base.mask(|iy, ix, _| keep[iy * nx + ix]))
    }

    /// Full z profile of the column nearest to each point, in input order.
    /// Points outside the grid get all-NaN profiles.
    pub fn select_with_points(&self, points: &[Point<f64>]) -> ProfileSamples {
        ProfileSamples {
            points: points.to_vec(),
            labels: Vec::new(),
            z: self.z.clone(),
            variables: self.profiles(points),
        }
    }

    /// Profiles sampled along `line`.
    pub fn select_with_line(&self, line: &LineString<f64>, sampling: LineSampling) -> Result<Section> {
        let length = line.euclidean_length();
        let dist: Vec<f64> = match sampling {
            LineSampling::Distance(d) if d > 0.0 => {
                let n = (length / d + 1e-9).floor() as usize;
                (0..=n).map(|i| i as f64 * d).collect()
            }
            LineSampling::Distance(d) => {
                return Err(StratumError::Schema(format!(
                    "line sample distance must be positive, got {d}"
                )))
            }
            LineSampling::Count(0) => {
                return Err(StratumError::Schema("line sample count must be at least 1".into()))
            }
            LineSampling::Count(1) => vec![0.0],
            LineSampling::Count(n) => (0..n).map(|i| i as f64 * length / (n - 1) as f64).collect(),
        };
        let points: Vec<Point<f64>> = dist
            .iter()
            .map(|d| {
                let fraction = if length > 0.0 { (d / length).min(1.0) } else { 0.0 };
                line.line_interpolate_point(fraction)
                    .unwrap_or_else(|| Point::new(f64::NAN, f64::NAN))
            })
            .collect();
        Ok(Section {
            x: points.iter().map(|p| p.x()).collect(),
            y: points.iter().map(|p| p.y()).collect(),
            z: self.z.clone(),
            variables: self.profiles(&points),
            dist,
        })
    }

    // ---- vertical reductions ----

    /// Elevation of the top of the highest populated cell per column, NaN
    /// where the column is empty.
    pub fn select_top(&self) -> LabeledArray2 {
        let hz = self.resolution.dz / 2.0;
        LabeledArray2::from_fn(&self.x, &self.y, |iy, ix| {
            (0..self.z.len())
                .rev()
                .find(|&iz| self.populated(iy, ix, iz))
                .map(|iz| self.z[iz] + hz)
                .unwrap_or(f64::NAN)
        })
    }

    /// Elevation of the bottom of the lowest populated cell per column, NaN
    /// where the column is empty.
    pub fn select_bottom(&self) -> LabeledArray2 {
        let hz = self.resolution.dz / 2.0;
        LabeledArray2::from_fn(&self.x, &self.y, |iy, ix| {
            (0..self.z.len())
                .find(|&iz| self.populated(iy, ix, iz))
                .map(|iz| self.z[iz] - hz)
                .unwrap_or(f64::NAN)
        })
    }

    /// Per variable, the value of the cell nearest to the `surface`
    /// elevation in every column. Columns with a NaN surface are NaN.
    pub fn select_surface_level(&self, surface: &LabeledArray2) -> Result<BTreeMap<String, LabeledArray2>> {
        self.check_raster(surface)?;
        let levels: Vec<Option<usize>> = surface
            .values
            .iter()
            .map(|s| nearest_index(&self.z, *s))
            .collect();
        let nx = self.x.len();
        Ok(self
            .variables
            .iter()
            .map(|(name, values)| {
                let raster = LabeledArray2::from_fn(&self.x, &self.y, |iy, ix| {
                    levels[iy * nx + ix]
                        .map(|iz| values[self.index(iy, ix, iz)])
                        .unwrap_or(f64::NAN)
                });
                (name.clone(), raster)
            })
            .collect())
    }

    fn check_raster(&self, raster: &LabeledArray2) -> Result<()> {
        if raster.shape() != (self.y.len(), self.x.len()) {
            return Err(StratumError::Shape(format!(
                "raster of shape {:?} does not match model (y={}, x={})",
                raster.shape(),
                self.y.len(),
                self.x.len()
            )));
        }
        if !raster.matches_axes(&self.x, &self.y) {
            return Err(StratumError::Shape(
                "raster coordinates differ from the model's x/y axes".to_string(),
            ));
        }
        Ok(())
    }

    // ---- value selections ----

    /// Set every cell whose `variable` is not one of `values` to NaN in all
    /// variables. The grid keeps its shape.
    pub fn select_by_values(&self, variable: &str, values: &[f64]) -> Result<VoxelModel> {
        let data = self.require(variable)?;
        let nx = self.x.len();
        let nz = self.z.len();
        Ok(self.mask(|iy, ix, iz| {
            let v = data[(iy * nx + ix) * nz + iz];
            values.iter().any(|s| *s == v)
        }))
    }

    /// Keep cells whose centre lies between `lower` and `upper` (datum
    /// elevations, inclusive). Open bounds are `None`.
    ///
    /// With [`VoxelSlicePolicy::TruncateScalar`] and only scalar bounds the
    /// z axis is cropped; otherwise outside cells (and columns whose surface
    /// bound is NaN) become NaN and the shape is kept.
    pub fn slice_depth_interval(
        &self,
        upper: Option<DepthBound<'_>>,
        lower: Option<DepthBound<'_>>,
        policy: VoxelSlicePolicy,
    ) -> Result<VoxelModel> {
        for bound in [upper, lower].into_iter().flatten() {
            if let DepthBound::Surface(raster) = bound {
                self.check_raster(raster)?;
            }
        }
        let scalar = upper.map_or(true, |b| b.is_scalar()) && lower.map_or(true, |b| b.is_scalar());
        if scalar && policy == VoxelSlicePolicy::TruncateScalar {
            let top = upper.map_or(f64::INFINITY, |b| b.at(0, 0));
            let bottom = lower.map_or(f64::NEG_INFINITY, |b| b.at(0, 0));
            let zs = index_range(&self.z, bottom, top);
            return Ok(self.crop(0..self.y.len(), 0..self.x.len(), zs));
        }
        Ok(self.mask(|iy, ix, iz| {
            let top = upper.map_or(f64::INFINITY, |b| b.at(iy, ix));
            let bottom = lower.map_or(f64::NEG_INFINITY, |b| b.at(iy, ix));
            let z = self.z[iz];
            z <= top && z >= bottom
        }))
    }

    // ---- aggregates ----

    /// Thickness of cells equal to `value` per column; `0.0` for empty
    /// columns.
    pub fn get_thickness(&self, variable: &str, value: f64) -> Result<LabeledArray2> {
        let data = self.require(variable)?;
        let dz = self.resolution.dz;
        Ok(LabeledArray2::from_fn(&self.x, &self.y, |iy, ix| {
            self.column(data, iy, ix).iter().filter(|v| **v == value).count() as f64 * dz
        }))
    }

    /// Most frequent value per column; ties go to the smallest value and
    /// empty columns are NaN.
    pub fn most_common(&self, variable: &str) -> Result<LabeledArray2> {
        let data = self.require(variable)?;
        Ok(LabeledArray2::from_fn(&self.x, &self.y, |iy, ix| {
            let mut cells: Vec<f64> = self
                .column(data, iy, ix)
                .iter()
                .copied()
                .filter(|v| !v.is_nan())
                .collect();
            cells.sort_by(f64::total_cmp);
            let mut best = (f64::NAN, 0usize);
            let mut start = 0;
            while start < cells.len() {
                let len = cells[start..].iter().take_while(|v| **v == cells[start]).count();
                if len > best.1 {
                    best = (cells[start], len);
                }
                start += len;
            }
            best.0
        }))
    }

    /// Occurrences of each distinct value of `variable`, as whole-model
    /// totals (`axis = None`) or per coordinate along `axis`.
    pub fn value_counts(&self, variable: &str, axis: Option<Axis>) -> Result<ValueCounts> {
        let data = self.require(variable)?;
        let mut distinct: Vec<f64> = data.iter().copied().filter(|v| !v.is_nan()).collect();
        distinct.sort_by(f64::total_cmp);
        distinct.dedup();

        let coords: Vec<f64> = match axis {
            Some(Axis::X) => self.x.clone(),
            Some(Axis::Y) => self.y.clone(),
            Some(Axis::Z) => self.z.clone(),
            None => Vec::new(),
        };
        let rows = if axis.is_some() { coords.len() } else { 1 };
        let mut counts = vec![vec![0usize; distinct.len()]; rows];

        let (ny, nx, nz) = self.shape();
        for iy in 0..ny {
            for ix in 0..nx {
                for iz in 0..nz {
                    let v = data[self.index(iy, ix, iz)];
                    if v.is_nan() {
                        continue;
                    }
                    let row = match axis {
                        Some(Axis::X) => ix,
                        Some(Axis::Y) => iy,
                        Some(Axis::Z) => iz,
                        None => 0,
                    };
                    if let Ok(j) = distinct.binary_search_by(|d| d.total_cmp(&v)) {
                        counts[row][j] += 1;
                    }
                }
            }
        }
        Ok(ValueCounts {
            values: distinct,
            axis,
            coords,
            counts,
        })
    }
}
