//! File input and output.
//!
//! ```text
//!   .csv / .parquet / .json ──load_table──▶ RawTable ──convert──▶ PointHeader
//!                                                               DataTable<R>
//!                                                               VoxelModel
//!   Collection ──convert──▶ RawTable ──write_csv / write_parquet / write_json──▶ file
//! ```
//!
//! Parquet files written here carry the horizontal and vertical references in
//! their schema metadata. CSV and JSON carry none, so their readers take the
//! references as arguments.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::collection::Collection;
use crate::config::ValidationSettings;
use crate::data::records::{Layer, Measurement};
use crate::data::validate::{validate_data, validate_header};
use crate::data::value::Value;
use crate::error::Result;
use crate::model::VoxelModel;
use crate::reference::{HorizontalReference, VerticalReference};

pub mod convert;
pub mod loader;
pub mod writer;

pub use convert::TableRecord;
pub use loader::{load_table, load_table_with_text_columns};

// ---------------------------------------------------------------------------
// RawTable – column-major cells as read from disk
// ---------------------------------------------------------------------------

/// An untyped, column-major table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    pub names: Vec<String>,
    pub columns: Vec<Vec<Value>>,
    /// Key/value metadata (Parquet schema metadata).
    pub metadata: HashMap<String, String>,
}

impl RawTable {
    pub fn n_rows(&self) -> usize {
        self.columns.first().map(Vec::len).unwrap_or(0)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.index_of(name).map(|i| self.columns[i].as_slice())
    }

    /// Append a column; the caller keeps lengths consistent.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Value>) {
        self.names.push(name.into());
        self.columns.push(values);
    }
}

// ---------------------------------------------------------------------------
// Readers
// ---------------------------------------------------------------------------

/// Horizontal and vertical reference of a file pair.
pub type References = (HorizontalReference, VerticalReference);

/// The given references, else those stored in the table metadata, else the
/// defaults (RD New, depth).
fn resolve_references(table: &RawTable, given: Option<References>) -> Result<References> {
    if let Some(refs) = given {
        return Ok(refs);
    }
    match convert::references_from_metadata(&table.metadata)? {
        Some(refs) => Ok(refs),
        None => {
            log::warn!("no references given or stored, assuming EPSG:28992 and depth");
            Ok((HorizontalReference::RD_NEW, VerticalReference::Depth))
        }
    }
}

/// Read a header file and a data file into a validated collection.
///
/// Data rows without location columns take them from the header.
pub fn read_collection<R: TableRecord>(
    header_path: &Path,
    data_path: &Path,
    references: Option<References>,
    settings: &ValidationSettings,
) -> Result<Collection<R>> {
    read_collection_with_text_columns(header_path, data_path, references, settings, &[])
}

/// [`read_collection`], reading `text_columns` of both files as text.
pub fn read_collection_with_text_columns<R: TableRecord>(
    header_path: &Path,
    data_path: &Path,
    references: Option<References>,
    settings: &ValidationSettings,
    text_columns: &[&str],
) -> Result<Collection<R>> {
    let header_table = load_table_with_text_columns(header_path, text_columns)?;
    let data_table = load_table_with_text_columns(data_path, text_columns)?;
    let (hr, vr) = resolve_references(&header_table, references)?;

    let mut header = convert::header_from_table(&header_table, hr, vr)?;
    if let Some(xy) = convert::xy_reference_from_metadata(&header_table.metadata)? {
        header = header.with_xy_reference(xy);
    }
    let header = validate_header(header, settings)?;
    let data = convert::data_from_table::<R>(&data_table, vr, Some(&header))?;
    let data = validate_data(data, settings)?;
    Collection::from_parts_aligned(header, data, settings)
}

/// Read a single data file with location columns; the header is derived from
/// the data rows.
pub fn read_data_table<R: TableRecord>(
    path: &Path,
    references: Option<References>,
    settings: &ValidationSettings,
) -> Result<Collection<R>> {
    read_data_table_with_text_columns(path, references, settings, &[])
}

/// [`read_data_table`], reading `text_columns` as text.
pub fn read_data_table_with_text_columns<R: TableRecord>(
    path: &Path,
    references: Option<References>,
    settings: &ValidationSettings,
    text_columns: &[&str],
) -> Result<Collection<R>> {
    let table = load_table_with_text_columns(path, text_columns)?;
    let (hr, vr) = resolve_references(&table, references)?;
    let data = convert::data_from_table::<R>(&table, vr, None)?;
    let data = validate_data(data, settings)?;
    Ok(Collection::from_data(data, hr))
}

/// Layer table with `id, x, y, surface, end, top, bottom` columns.
pub fn read_borehole_table(
    path: &Path,
    references: Option<References>,
    settings: &ValidationSettings,
) -> Result<Collection<Layer>> {
    read_data_table(path, references, settings)
}

/// Measurement table with `id, x, y, surface, end, depth` columns.
pub fn read_cpt_table(
    path: &Path,
    references: Option<References>,
    settings: &ValidationSettings,
) -> Result<Collection<Measurement>> {
    read_data_table(path, references, settings)
}

/// Read a voxel model from a long-format table (`x, y, z` plus one column
/// per variable).
pub fn read_voxel_model(path: &Path, crs: HorizontalReference) -> Result<VoxelModel> {
    let table = load_table(path)?;
    convert::voxel_from_table(&table, crs)
}
