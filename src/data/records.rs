use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::value::Value;
use crate::reference::{convert_vertical, VerticalReference};

/// Columns every data row carries besides its depth columns. The location
/// fields repeat the owning object's header values so a header can be rebuilt
/// from data alone.
pub const LOCATION_COLUMNS: &[&str] = &["id", "x", "y", "surface", "end"];

/// Which data variant a table holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataKind {
    /// Depth intervals with `top` and `bottom`.
    Layered,
    /// Point measurements at a `depth`.
    Discrete,
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataKind::Layered => write!(f, "layered data"),
            DataKind::Discrete => write!(f, "discrete data"),
        }
    }
}

// ---------------------------------------------------------------------------
// DataRecord – capability shared by every data row type
// ---------------------------------------------------------------------------

/// One row of a data table. Implemented by [`Layer`] and [`Measurement`];
/// generic table operations (value selections, id pruning, reference
/// changes) are written against this trait only.
pub trait DataRecord: Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned {
    const KIND: DataKind;

    /// Names of the vertical columns of this row type.
    const DEPTH_COLUMNS: &'static [&'static str];

    fn id(&self) -> &str;
    fn x(&self) -> f64;
    fn y(&self) -> f64;
    fn surface(&self) -> f64;
    fn end(&self) -> f64;
    fn set_xy(&mut self, x: f64, y: f64);
    fn attributes(&self) -> &BTreeMap<String, Value>;
    fn attributes_mut(&mut self) -> &mut BTreeMap<String, Value>;

    /// Value of one of [`Self::DEPTH_COLUMNS`].
    fn depth_value(&self, column: &str) -> Option<f64>;

    /// Upper vertical position of the row expressed as depth below surface,
    /// used to order rows within an object.
    fn sort_depth(&self, reference: VerticalReference) -> f64;

    /// Re-express every vertical value of the row (including `end`).
    fn convert_vertical(&mut self, from: VerticalReference, to: VerticalReference);

    /// Column lookup across built-in and attribute columns.
    fn get(&self, column: &str) -> Option<Value> {
        match column {
            "id" => Some(Value::String(self.id().to_string())),
            "x" => Some(Value::float(self.x())),
            "y" => Some(Value::float(self.y())),
            "surface" => Some(Value::float(self.surface())),
            "end" => Some(Value::float(self.end())),
            other => match self.depth_value(other) {
                Some(v) => Some(Value::float(v)),
                None => self.attributes().get(other).cloned(),
            },
        }
    }

    /// All built-in column names in table order.
    fn builtin_columns() -> Vec<&'static str> {
        LOCATION_COLUMNS
            .iter()
            .chain(Self::DEPTH_COLUMNS.iter())
            .copied()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Layer – an interval row (borehole descriptions)
// ---------------------------------------------------------------------------

/// A depth interval of one object. In [`VerticalReference::Depth`] `top` is
/// smaller than `bottom`; in the upward-positive references it is larger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub surface: f64,
    pub end: f64,
    pub top: f64,
    pub bottom: f64,
    pub attributes: BTreeMap<String, Value>,
}

impl Layer {
    pub fn new(id: impl Into<String>, top: f64, bottom: f64) -> Self {
        Self {
            id: id.into(),
            x: 0.0,
            y: 0.0,
            surface: 0.0,
            end: 0.0,
            top,
            bottom,
            attributes: BTreeMap::new(),
        }
    }

    /// Set location fields (builder style).
    pub fn at(mut self, x: f64, y: f64, surface: f64, end: f64) -> Self {
        self.x = x;
        self.y = y;
        self.surface = surface;
        self.end = end;
        self
    }

    /// Add an attribute (builder style).
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(column.to_string(), value.into());
        self
    }

    pub fn thickness(&self) -> f64 {
        (self.bottom - self.top).abs()
    }
}

impl DataRecord for Layer {
    const KIND: DataKind = DataKind::Layered;
    const DEPTH_COLUMNS: &'static [&'static str] = &["top", "bottom"];

    fn id(&self) -> &str {
        &self.id
    }
    fn x(&self) -> f64 {
        self.x
    }
    fn y(&self) -> f64 {
        self.y
    }
    fn surface(&self) -> f64 {
        self.surface
    }
    fn end(&self) -> f64 {
        self.end
    }
    fn set_xy(&mut self, x: f64, y: f64) {
        self.x = x;
        self.y = y;
    }
    fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }
    fn attributes_mut(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self.attributes
    }

    fn depth_value(&self, column: &str) -> Option<f64> {
        match column {
            "top" => Some(self.top),
            "bottom" => Some(self.bottom),
            _ => None,
        }
    }

    fn sort_depth(&self, reference: VerticalReference) -> f64 {
        convert_vertical(self.top, self.surface, reference, VerticalReference::Depth)
    }

    fn convert_vertical(&mut self, from: VerticalReference, to: VerticalReference) {
        self.top = convert_vertical(self.top, self.surface, from, to);
        self.bottom = convert_vertical(self.bottom, self.surface, from, to);
        self.end = convert_vertical(self.end, self.surface, from, to);
    }
}

// ---------------------------------------------------------------------------
// Measurement – a discrete row (CPT samples, logs)
// ---------------------------------------------------------------------------

/// A measurement of one object at a single vertical position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub surface: f64,
    pub end: f64,
    pub depth: f64,
    pub attributes: BTreeMap<String, Value>,
}

impl Measurement {
    pub fn new(id: impl Into<String>, depth: f64) -> Self {
        Self {
            id: id.into(),
            x: 0.0,
            y: 0.0,
            surface: 0.0,
            end: 0.0,
            depth,
            attributes: BTreeMap::new(),
        }
    }

    pub fn at(mut self, x: f64, y: f64, surface: f64, end: f64) -> Self {
        self.x = x;
        self.y = y;
        self.surface = surface;
        self.end = end;
        self
    }

    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(column.to_string(), value.into());
        self
    }
}

impl DataRecord for Measurement {
    const KIND: DataKind = DataKind::Discrete;
    const DEPTH_COLUMNS: &'static [&'static str] = &["depth"];

    fn id(&self) -> &str {
        &self.id
    }
    fn x(&self) -> f64 {
        self.x
    }
    fn y(&self) -> f64 {
        self.y
    }
    fn surface(&self) -> f64 {
        self.surface
    }
    fn end(&self) -> f64 {
        self.end
    }
    fn set_xy(&mut self, x: f64, y: f64) {
        self.x = x;
        self.y = y;
    }
    fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }
    fn attributes_mut(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self.attributes
    }

    fn depth_value(&self, column: &str) -> Option<f64> {
        (column == "depth").then_some(self.depth)
    }

    fn sort_depth(&self, reference: VerticalReference) -> f64 {
        convert_vertical(self.depth, self.surface, reference, VerticalReference::Depth)
    }

    fn convert_vertical(&mut self, from: VerticalReference, to: VerticalReference) {
        self.depth = convert_vertical(self.depth, self.surface, from, to);
        self.end = convert_vertical(self.end, self.surface, from, to);
    }
}
