//! Geo-referenced subsurface point data (boreholes, CPTs) and voxel models.
//!
//! A [`Collection`] pairs a [`PointHeader`] (one row per object) with a
//! [`DataTable`] (one or more rows per object) and keeps both covering the
//! same object ids through every selection, slice and reference change.

pub mod collection;
pub mod config;
pub mod data;
pub mod error;
pub mod io;
pub mod model;
pub mod reference;
pub mod spatial;

pub use collection::{BoreholeCollection, Collection, CptCollection};
pub use config::{Settings, ValidationSettings};
pub use data::filter::SelectionMode;
pub use data::header::{HeaderRecord, PointHeader};
pub use data::records::{DataKind, DataRecord, Layer, Measurement};
pub use data::table::{DataTable, DepthInterval, DepthSlice, DiscreteData, LayeredData};
pub use data::value::Value;
pub use error::{Result, StratumError};
pub use model::VoxelModel;
pub use reference::{HorizontalReference, VerticalReference};
pub use spatial::{PolygonPredicate, PolygonSet};
