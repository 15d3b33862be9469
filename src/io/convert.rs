use std::collections::{BTreeMap, HashMap};

use geo::Point;

use super::{RawTable, References};
use crate::data::header::{HeaderRecord, PointHeader, HEADER_COLUMNS};
use crate::data::records::{DataRecord, Layer, Measurement, LOCATION_COLUMNS};
use crate::data::table::DataTable;
use crate::data::validate::RowRules;
use crate::data::value::Value;
use crate::error::{Result, StratumError};
use crate::model::VoxelModel;
use crate::reference::{HorizontalReference, VerticalReference};

/// Schema metadata keys used in Parquet exports.
pub const HORIZONTAL_REFERENCE_KEY: &str = "stratum.horizontal_reference";
pub const VERTICAL_REFERENCE_KEY: &str = "stratum.vertical_reference";
/// Reference of scalar `x`/`y`; written only when it differs from the
/// horizontal reference.
pub const XY_REFERENCE_KEY: &str = "stratum.xy_reference";

/// Legacy name of the id column.
const ID_ALIAS: &str = "nr";

// ---------------------------------------------------------------------------
// Row construction per record type
// ---------------------------------------------------------------------------

/// Data rows that can be built from table cells.
pub trait TableRecord: RowRules {
    /// `location` is `[x, y, surface, end]`; `depths` follows
    /// [`DataRecord::DEPTH_COLUMNS`].
    fn from_cells(id: String, location: [f64; 4], depths: &[f64], attributes: BTreeMap<String, Value>) -> Self;
}

impl TableRecord for Layer {
    fn from_cells(id: String, location: [f64; 4], depths: &[f64], attributes: BTreeMap<String, Value>) -> Self {
        let [x, y, surface, end] = location;
        Layer {
            id,
            x,
            y,
            surface,
            end,
            top: depths[0],
            bottom: depths[1],
            attributes,
        }
    }
}

impl TableRecord for Measurement {
    fn from_cells(id: String, location: [f64; 4], depths: &[f64], attributes: BTreeMap<String, Value>) -> Self {
        let [x, y, surface, end] = location;
        Measurement {
            id,
            x,
            y,
            surface,
            end,
            depth: depths[0],
            attributes,
        }
    }
}

// ---------------------------------------------------------------------------
// Cell helpers
// ---------------------------------------------------------------------------

fn required<'a>(table: &'a RawTable, name: &str, what: &str) -> Result<&'a [Value]> {
    table.column(name).ok_or_else(|| StratumError::MissingColumn {
        table: what.to_string(),
        column: name.to_string(),
    })
}

/// The id column, accepting the legacy `nr` name.
fn id_column<'a>(table: &'a RawTable, what: &str) -> Result<(&'static str, &'a [Value])> {
    if let Some(ids) = table.column("id") {
        return Ok(("id", ids));
    }
    match table.column(ID_ALIAS) {
        Some(ids) => Ok((ID_ALIAS, ids)),
        None => Err(StratumError::MissingColumn {
            table: what.to_string(),
            column: "id".to_string(),
        }),
    }
}

fn id_cell(value: &Value, what: &str, row: usize) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Integer(_) | Value::Float(_) => Ok(value.to_string()),
        _ => Err(StratumError::InvalidRecord {
            table: what.to_string(),
            row,
            reason: format!("invalid id {value:?}"),
        }),
    }
}

/// Numeric cell; `Null` reads as NaN and is left to validation.
fn number_cell(value: &Value, column: &str, what: &str, row: usize) -> Result<f64> {
    match value {
        Value::Null => Ok(f64::NAN),
        other => other.as_f64().ok_or_else(|| StratumError::InvalidRecord {
            table: what.to_string(),
            row,
            reason: format!("column '{column}' is not numeric: {other:?}"),
        }),
    }
}

/// Parse `POINT (x y)` text.
fn parse_point(text: &str) -> Option<Point<f64>> {
    let inner = text
        .trim()
        .strip_prefix("POINT")?
        .trim()
        .strip_prefix('(')?
        .strip_suffix(')')?;
    let mut parts = inner.split_whitespace().map(str::parse::<f64>);
    let x = parts.next()?.ok()?;
    let y = parts.next()?.ok()?;
    Some(Point::new(x, y))
}

fn format_point(point: &Point<f64>) -> String {
    format!("POINT ({} {})", point.x(), point.y())
}

/// Columns of `table` other than `builtin`, as `(name, column index)`.
/// Empty cells of these columns are left out of the row attributes.
fn attribute_indices(table: &RawTable, builtin: &[&str]) -> Vec<(String, usize)> {
    table
        .names
        .iter()
        .enumerate()
        .filter(|(_, name)| !builtin.contains(&name.as_str()))
        .map(|(i, name)| (name.clone(), i))
        .collect()
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Build a header from a raw table with `id` (or `nr`), `x`, `y`, `surface`
/// and `end` columns. An optional `geometry` column holds `POINT (x y)`
/// text; without it the geometry is `(x, y)`.
pub fn header_from_table(
    table: &RawTable,
    horizontal_reference: HorizontalReference,
    vertical_reference: VerticalReference,
) -> Result<PointHeader> {
    const WHAT: &str = "header";
    let (id_name, ids) = id_column(table, WHAT)?;
    let xs = required(table, "x", WHAT)?;
    let ys = required(table, "y", WHAT)?;
    let surfaces = required(table, "surface", WHAT)?;
    let ends = required(table, "end", WHAT)?;
    let geometries = table.column("geometry");

    let mut builtin: Vec<&str> = HEADER_COLUMNS.to_vec();
    builtin.push(id_name);
    let attributes = attribute_indices(table, &builtin);

    let mut records = Vec::with_capacity(table.n_rows());
    for row in 0..table.n_rows() {
        let x = number_cell(&xs[row], "x", WHAT, row)?;
        let y = number_cell(&ys[row], "y", WHAT, row)?;
        let mut record = HeaderRecord::new(
            id_cell(&ids[row], WHAT, row)?,
            x,
            y,
            number_cell(&surfaces[row], "surface", WHAT, row)?,
            number_cell(&ends[row], "end", WHAT, row)?,
        );
        if let Some(geometry) = geometries.and_then(|g| g[row].as_str()).and_then(parse_point) {
            record.geometry = geometry;
        }
        for (name, col) in &attributes {
            let value = &table.columns[*col][row];
            if !value.is_null() {
                record.attributes.insert(name.clone(), value.clone());
            }
        }
        records.push(record);
    }
    PointHeader::new(records, horizontal_reference, vertical_reference)
}

/// Header as a raw table: built-in columns, then attributes.
pub fn header_to_table(header: &PointHeader) -> RawTable {
    let mut table = RawTable::default();
    for &name in HEADER_COLUMNS {
        let values = if name == "geometry" {
            header
                .records()
                .iter()
                .map(|r| Value::String(format_point(&r.geometry)))
                .collect()
        } else {
            header
                .records()
                .iter()
                .map(|r| r.get(name).unwrap_or(Value::Null))
                .collect()
        };
        table.push_column(name, values);
    }
    for name in header.attribute_columns() {
        let values = header
            .records()
            .iter()
            .map(|r| r.attributes.get(name).cloned().unwrap_or(Value::Null))
            .collect();
        table.push_column(name.clone(), values);
    }
    table
}

// ---------------------------------------------------------------------------
// Data
// ---------------------------------------------------------------------------

/// Build a data table from raw rows.
///
/// Location columns (`x, y, surface, end`) are read from the table when
/// present, otherwise from `header` by id. Rows whose id the header lacks get
/// NaN locations; collection alignment then drops or reports them.
pub fn data_from_table<R: TableRecord>(
    table: &RawTable,
    vertical_reference: VerticalReference,
    header: Option<&PointHeader>,
) -> Result<DataTable<R>> {
    let what = R::KIND.to_string();
    let (id_name, ids) = id_column(table, &what)?;
    let depth_columns = R::DEPTH_COLUMNS
        .iter()
        .map(|name| required(table, name, &what))
        .collect::<Result<Vec<_>>>()?;

    let location_names = &LOCATION_COLUMNS[1..];
    let location_columns: Option<Vec<&[Value]>> = location_names.iter().map(|name| table.column(name)).collect();
    let header_locations: Option<HashMap<&str, [f64; 4]>> = match (&location_columns, header) {
        (Some(_), _) => None,
        (None, Some(header)) => Some(
            header
                .records()
                .iter()
                .map(|r| (r.id.as_str(), [r.x, r.y, r.surface, r.end]))
                .collect(),
        ),
        (None, None) => {
            let missing = location_names
                .iter()
                .find(|name| table.column(name).is_none())
                .copied()
                .unwrap_or("x");
            return Err(StratumError::MissingColumn {
                table: what,
                column: missing.to_string(),
            });
        }
    };

    let mut builtin: Vec<&str> = R::builtin_columns();
    builtin.push(id_name);
    builtin.push("geometry");
    let attributes = attribute_indices(table, &builtin);

    let mut records = Vec::with_capacity(table.n_rows());
    let mut depths = vec![0.0; depth_columns.len()];
    for row in 0..table.n_rows() {
        let id = id_cell(&ids[row], &what, row)?;
        let location = match (&location_columns, &header_locations) {
            (Some(columns), _) => {
                let mut location = [0.0; 4];
                for ((slot, column), name) in location.iter_mut().zip(columns).zip(location_names) {
                    *slot = number_cell(&column[row], name, &what, row)?;
                }
                location
            }
            (None, Some(lookup)) => lookup.get(id.as_str()).copied().unwrap_or([f64::NAN; 4]),
            (None, None) => [f64::NAN; 4],
        };
        for ((slot, column), name) in depths.iter_mut().zip(&depth_columns).zip(R::DEPTH_COLUMNS) {
            *slot = number_cell(&column[row], name, &what, row)?;
        }
        let attrs = attributes
            .iter()
            .filter(|(_, col)| !table.columns[*col][row].is_null())
            .map(|(name, col)| (name.clone(), table.columns[*col][row].clone()))
            .collect();
        records.push(R::from_cells(id, location, &depths, attrs));
    }
    Ok(DataTable::new(records, vertical_reference))
}

/// Data as a raw table: built-in columns, then attributes.
pub fn data_to_table<R: DataRecord>(data: &DataTable<R>) -> RawTable {
    let mut table = RawTable::default();
    let names = R::builtin_columns()
        .into_iter()
        .map(str::to_string)
        .chain(data.attribute_columns().iter().cloned());
    for name in names {
        let values = data
            .records()
            .iter()
            .map(|r| r.get(&name).unwrap_or(Value::Null))
            .collect();
        table.push_column(name, values);
    }
    table
}

// ---------------------------------------------------------------------------
// References in metadata
// ---------------------------------------------------------------------------

pub fn reference_metadata(
    horizontal_reference: HorizontalReference,
    vertical_reference: VerticalReference,
) -> HashMap<String, String> {
    HashMap::from([
        (HORIZONTAL_REFERENCE_KEY.to_string(), horizontal_reference.to_string()),
        (VERTICAL_REFERENCE_KEY.to_string(), vertical_reference.to_string()),
    ])
}

/// Scalar `x`/`y` reference stored under [`XY_REFERENCE_KEY`], if present.
pub fn xy_reference_from_metadata(metadata: &HashMap<String, String>) -> Result<Option<HorizontalReference>> {
    metadata.get(XY_REFERENCE_KEY).map(|s| s.parse()).transpose()
}

/// References stored by [`reference_metadata`], if both are present.
pub fn references_from_metadata(metadata: &HashMap<String, String>) -> Result<Option<References>> {
    match (metadata.get(HORIZONTAL_REFERENCE_KEY), metadata.get(VERTICAL_REFERENCE_KEY)) {
        (Some(h), Some(v)) => Ok(Some((h.parse()?, v.parse()?))),
        _ => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Voxel models
// ---------------------------------------------------------------------------

fn unique_sorted(values: &[f64]) -> Vec<f64> {
    let mut axis: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    axis.sort_by(f64::total_cmp);
    axis.dedup();
    axis
}

fn axis_position(axis: &[f64], value: f64) -> Option<usize> {
    let i = axis.partition_point(|c| *c < value);
    (i < axis.len() && axis[i] == value).then_some(i)
}

/// Build a voxel model from a long-format table: one row per cell with
/// `x`, `y`, `z` centre coordinates and one numeric column per variable.
/// Cells absent from the table are NaN. Non-numeric columns are skipped.
pub fn voxel_from_table(table: &RawTable, crs: HorizontalReference) -> Result<VoxelModel> {
    const WHAT: &str = "voxel table";
    let mut coords: [Vec<f64>; 3] = Default::default();
    for (slot, name) in coords.iter_mut().zip(["x", "y", "z"]) {
        let column = required(table, name, WHAT)?;
        *slot = column
            .iter()
            .enumerate()
            .map(|(row, v)| number_cell(v, name, WHAT, row))
            .collect::<Result<_>>()?;
    }
    let [xs, ys, zs] = coords;
    let (x, y, z) = (unique_sorted(&xs), unique_sorted(&ys), unique_sorted(&zs));
    let n_cells = x.len() * y.len() * z.len();

    let mut variables = BTreeMap::new();
    for (name, col) in attribute_indices(table, &["x", "y", "z"]) {
        let column = &table.columns[col];
        if column.iter().any(|v| !v.is_null() && v.as_f64().is_none()) {
            log::warn!("skipping non-numeric voxel column '{name}'");
            continue;
        }
        let mut values = vec![f64::NAN; n_cells];
        for (row, value) in column.iter().enumerate() {
            let (Some(ix), Some(iy), Some(iz)) = (
                axis_position(&x, xs[row]),
                axis_position(&y, ys[row]),
                axis_position(&z, zs[row]),
            ) else {
                continue;
            };
            values[(iy * x.len() + ix) * z.len() + iz] = value.as_f64().unwrap_or(f64::NAN);
        }
        variables.insert(name, values);
    }
    VoxelModel::new(x, y, z, variables, crs)
}
