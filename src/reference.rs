//! Horizontal and vertical reference systems.
//!
//! Horizontal references are EPSG codes resolved against a small built-in
//! table of proj4 definitions and transformed with `proj4rs`. Vertical
//! references describe how depth values relate to an object's surface level:
//!
//! ```text
//!   datum value = surface + surface-relative value = surface - depth
//! ```
//!
//! The surface level itself is always stored as a datum elevation so every
//! conversion can be inverted exactly.

use std::fmt;
use std::str::FromStr;

use proj4rs::proj::Proj;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StratumError};

// ---------------------------------------------------------------------------
// Horizontal reference
// ---------------------------------------------------------------------------

/// Known EPSG codes: (code, proj4 definition, geographic).
const CRS_DEFINITIONS: &[(u32, &str, bool)] = &[
    (4326, "+proj=longlat +datum=WGS84 +no_defs", true),
    (4258, "+proj=longlat +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +no_defs", true),
    (
        3857,
        "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs",
        false,
    ),
    (
        28992,
        "+proj=sterea +lat_0=52.15616055555555 +lon_0=5.38763888888889 +k=0.9999079 +x_0=155000 +y_0=463000 +ellps=bessel +towgs84=565.417,50.3319,465.552,-0.398957,0.343988,-1.8774,4.0725 +units=m +no_defs",
        false,
    ),
    (
        31370,
        "+proj=lcc +lat_0=90 +lon_0=4.36748666666667 +lat_1=51.1666672333333 +lat_2=49.8333339 +x_0=150000.013 +y_0=5400088.438 +ellps=intl +towgs84=-106.8686,52.2978,-103.7239,0.3366,-0.457,1.8422,-1.2747 +units=m +no_defs",
        false,
    ),
    (32631, "+proj=utm +zone=31 +datum=WGS84 +units=m +no_defs", false),
    (32632, "+proj=utm +zone=32 +datum=WGS84 +units=m +no_defs", false),
    (
        25831,
        "+proj=utm +zone=31 +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs",
        false,
    ),
    (
        25832,
        "+proj=utm +zone=32 +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs",
        false,
    ),
];

/// A 2D coordinate reference system identified by its EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HorizontalReference(pub u32);

impl HorizontalReference {
    /// Amersfoort / RD New, the default for Dutch subsurface data.
    pub const RD_NEW: HorizontalReference = HorizontalReference(28992);
    pub const WGS84: HorizontalReference = HorizontalReference(4326);

    pub fn epsg(&self) -> u32 {
        self.0
    }

    /// Whether the transform backend knows this code.
    pub fn is_known(&self) -> bool {
        self.definition().is_some()
    }

    /// Whether coordinates are longitude/latitude in degrees.
    pub fn is_geographic(&self) -> bool {
        self.definition().map(|(_, geographic)| geographic).unwrap_or(false)
    }

    fn definition(&self) -> Option<(&'static str, bool)> {
        CRS_DEFINITIONS
            .iter()
            .find(|(code, _, _)| *code == self.0)
            .map(|(_, def, geographic)| (*def, *geographic))
    }

    fn proj(&self) -> Result<(Proj, bool)> {
        let (definition, geographic) = self
            .definition()
            .ok_or(StratumError::UnknownReference(self.0))?;
        let proj = Proj::from_proj_string(definition)
            .map_err(|e| StratumError::Projection(format!("EPSG:{}: {e:?}", self.0)))?;
        Ok((proj, geographic))
    }

    /// Build a transformer from this reference to `target`.
    ///
    /// Fails with [`StratumError::UnknownReference`] when either code is not
    /// recognized.
    pub fn transformer_to(&self, target: HorizontalReference) -> Result<Transformer> {
        let (source_proj, source_geographic) = self.proj()?;
        let (target_proj, target_geographic) = target.proj()?;
        Ok(Transformer {
            source: *self,
            target,
            source_proj,
            target_proj,
            source_geographic,
            target_geographic,
        })
    }
}

impl Default for HorizontalReference {
    fn default() -> Self {
        Self::RD_NEW
    }
}

impl fmt::Display for HorizontalReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

impl FromStr for HorizontalReference {
    type Err = StratumError;

    /// Accepts `28992`, `EPSG:28992` and `epsg:28992`.
    fn from_str(s: &str) -> Result<Self> {
        let code = s.trim();
        let code = code
            .strip_prefix("EPSG:")
            .or_else(|| code.strip_prefix("epsg:"))
            .unwrap_or(code);
        code.parse::<u32>()
            .map(HorizontalReference)
            .map_err(|_| StratumError::Schema(format!("not an EPSG code: '{s}'")))
    }
}

/// Forward coordinate transform between two horizontal references.
pub struct Transformer {
    source: HorizontalReference,
    target: HorizontalReference,
    source_proj: Proj,
    target_proj: Proj,
    source_geographic: bool,
    target_geographic: bool,
}

impl Transformer {
    /// Transform a single coordinate pair. Geographic coordinates are in
    /// degrees on both ends.
    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        if self.source == self.target {
            return Ok((x, y));
        }
        let mut point = if self.source_geographic {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };
        proj4rs::transform::transform(&self.source_proj, &self.target_proj, &mut point)
            .map_err(|e| {
                StratumError::Projection(format!(
                    "{} -> {} at ({x}, {y}): {e:?}",
                    self.source, self.target
                ))
            })?;
        if self.target_geographic {
            Ok((point.0.to_degrees(), point.1.to_degrees()))
        } else {
            Ok((point.0, point.1))
        }
    }
}

// ---------------------------------------------------------------------------
// Vertical reference
// ---------------------------------------------------------------------------

/// Convention used for depth values (layer boundaries, measurement depths and
/// the end of an object).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VerticalReference {
    /// Absolute elevation relative to a national datum (e.g. NAP), positive up.
    #[default]
    Datum,
    /// Elevation relative to the surface level, positive up (zero at surface).
    SurfaceLevel,
    /// Depth below the surface level, positive down.
    Depth,
}

impl VerticalReference {
    pub const ALL: [VerticalReference; 3] = [
        VerticalReference::Datum,
        VerticalReference::SurfaceLevel,
        VerticalReference::Depth,
    ];

    /// Whether larger values are deeper.
    pub fn increases_downward(&self) -> bool {
        matches!(self, VerticalReference::Depth)
    }
}

impl fmt::Display for VerticalReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerticalReference::Datum => write!(f, "datum"),
            VerticalReference::SurfaceLevel => write!(f, "surface-level"),
            VerticalReference::Depth => write!(f, "depth"),
        }
    }
}

impl FromStr for VerticalReference {
    type Err = StratumError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "datum" | "nap" | "absolute" => Ok(VerticalReference::Datum),
            "surface-level" | "surfacelevel" | "surface" => Ok(VerticalReference::SurfaceLevel),
            "depth" => Ok(VerticalReference::Depth),
            other => Err(StratumError::Schema(format!(
                "unknown vertical reference '{other}'"
            ))),
        }
    }
}

/// Re-express a vertical `value` given in `from` into `to`, for an object
/// whose surface sits at datum elevation `surface`.
#[inline]
pub fn convert_vertical(
    value: f64,
    surface: f64,
    from: VerticalReference,
    to: VerticalReference,
) -> f64 {
    if from == to {
        return value;
    }
    let datum = match from {
        VerticalReference::Datum => value,
        VerticalReference::SurfaceLevel => surface + value,
        VerticalReference::Depth => surface - value,
    };
    match to {
        VerticalReference::Datum => datum,
        VerticalReference::SurfaceLevel => datum - surface,
        VerticalReference::Depth => surface - datum,
    }
}
