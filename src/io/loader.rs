use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, AsArray};
use arrow::datatypes::{DataType, Float32Type, Float64Type, Int32Type, Int64Type};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::RawTable;
use crate::data::value::Value;
use crate::error::{Result, StratumError};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Columns that always read as text: object ids.
pub const ID_COLUMNS: &[&str] = &["id", "nr"];

/// Load a flat table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – any flat schema; schema metadata is kept (recommended)
/// * `.json`    – `[{ "id": "B-01", "top": 0.0, ... }, ...]`
/// * `.csv`     – header row with column names, cell types inferred per column
///
/// Id columns are text in every format.
pub fn load_table(path: &Path) -> Result<RawTable> {
    load_table_with_text_columns(path, &[])
}

/// [`load_table`], with `text_columns` read as text as well.
pub fn load_table_with_text_columns(path: &Path, text_columns: &[&str]) -> Result<RawTable> {
    let is_text = |name: &str| ID_COLUMNS.contains(&name) || text_columns.contains(&name);
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let mut table = match ext.as_str() {
        "parquet" | "pq" => load_parquet(path),
        "json" => load_json(path),
        "csv" => load_csv(path, &is_text),
        other => Err(StratumError::Schema(format!(
            "unsupported file extension: .{other}"
        ))),
    }?;
    for (name, column) in table.names.iter().zip(table.columns.iter_mut()) {
        if is_text(name.as_str()) {
            column.iter_mut().for_each(as_text);
        }
    }
    log::info!(
        "loaded {} rows x {} columns from {}",
        table.n_rows(),
        table.names.len(),
        path.display()
    );
    Ok(table)
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented):
///
/// ```json
/// [
///   { "id": "B-01", "x": 139370.0, "y": 455540.0, "top": 0.0, "lith": "K" },
///   ...
/// ]
/// ```
///
/// Columns are the union of all keys in first-seen order; absent keys are
/// `Null`.
fn load_json(path: &Path) -> Result<RawTable> {
    let text = std::fs::read_to_string(path)?;
    let root: JsonValue = serde_json::from_str(&text)?;

    let records = root
        .as_array()
        .ok_or_else(|| StratumError::Schema("expected top-level JSON array".into()))?;

    let mut table = RawTable::default();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .ok_or_else(|| StratumError::Schema(format!("row {i} is not a JSON object")))?;
        for (key, val) in obj {
            let col = match index.get(key) {
                Some(col) => *col,
                None => {
                    index.insert(key.clone(), table.names.len());
                    table.names.push(key.clone());
                    table.columns.push(vec![Value::Null; i]);
                    table.names.len() - 1
                }
            };
            table.columns[col].push(Value::from(val));
        }
        for column in &mut table.columns {
            if column.len() == i {
                column.push(Value::Null);
            }
        }
    }
    Ok(table)
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names, one record per row. Text
/// columns keep their cells verbatim; the others are typed by
/// [`infer_column`]. Empty cells are `Null`.
fn load_csv(path: &Path, is_text: &dyn Fn(&str) -> bool) -> Result<RawTable> {
    let mut reader = csv::Reader::from_path(path)?;
    let names: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let mut cells: Vec<Vec<String>> = vec![Vec::new(); names.len()];

    for (row_no, result) in reader.records().enumerate() {
        let record = result?;
        if record.len() != names.len() {
            return Err(StratumError::InvalidRecord {
                table: path.display().to_string(),
                row: row_no,
                reason: format!("{} fields for {} columns", record.len(), names.len()),
            });
        }
        for (column, cell) in cells.iter_mut().zip(record.iter()) {
            column.push(cell.trim().to_string());
        }
    }

    let columns = names
        .iter()
        .zip(cells)
        .map(|(name, column)| {
            if is_text(name.as_str()) {
                column.into_iter().map(text_cell).collect()
            } else {
                infer_column(column)
            }
        })
        .collect();
    Ok(RawTable {
        names,
        columns,
        metadata: HashMap::new(),
    })
}

fn text_cell(cell: String) -> Value {
    if cell.is_empty() {
        Value::Null
    } else {
        Value::String(cell)
    }
}

/// Type a CSV column. Cells are inferred one by one, unless the column holds
/// any text, or both booleans and numbers: then every cell stays text.
fn infer_column(cells: Vec<String>) -> Vec<Value> {
    let values: Vec<Value> = cells.iter().map(|c| Value::infer(c)).collect();
    let has_text = values.iter().any(|v| matches!(v, Value::String(_)));
    let has_bool = values.iter().any(|v| matches!(v, Value::Bool(_)));
    let has_number = values.iter().any(|v| v.as_f64().is_some());
    if has_text || (has_bool && has_number) {
        cells.into_iter().map(text_cell).collect()
    } else {
        values
    }
}

/// Non-null cells of a text column as their string form.
fn as_text(value: &mut Value) {
    if !matches!(value, Value::String(_) | Value::Null) {
        *value = Value::String(value.to_string());
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a flat Parquet file. Works with files written by this crate as well
/// as by Pandas (`df.to_parquet()`) and Polars (`df.write_parquet()`).
/// Arrow schema metadata is kept on the table.
fn load_parquet(path: &Path) -> Result<RawTable> {
    let file = std::fs::File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = builder.schema().clone();
    let reader = builder.build()?;

    let names: Vec<String> = schema.fields().iter().map(|f| f.name().clone()).collect();
    let mut columns: Vec<Vec<Value>> = vec![Vec::new(); names.len()];

    for batch_result in reader {
        let batch = batch_result?;
        for (col_idx, column) in columns.iter_mut().enumerate() {
            let array = batch.column(col_idx);
            column.extend((0..batch.num_rows()).map(|row| extract_value(array, row)));
        }
    }

    Ok(RawTable {
        names,
        columns,
        metadata: schema.metadata().clone(),
    })
}

// -- Parquet / Arrow helpers --

/// Extract a single cell from an Arrow column at a given row.
fn extract_value(col: &Arc<dyn Array>, row: usize) -> Value {
    if col.is_null(row) {
        return Value::Null;
    }
    let value = match col.data_type() {
        DataType::Utf8 => col.as_string_opt::<i32>().map(|a| Value::String(a.value(row).to_string())),
        DataType::LargeUtf8 => col.as_string_opt::<i64>().map(|a| Value::String(a.value(row).to_string())),
        DataType::Int32 => col
            .as_primitive_opt::<Int32Type>()
            .map(|a| Value::Integer(a.value(row) as i64)),
        DataType::Int64 => col.as_primitive_opt::<Int64Type>().map(|a| Value::Integer(a.value(row))),
        DataType::Float32 => col
            .as_primitive_opt::<Float32Type>()
            .map(|a| Value::float(a.value(row) as f64)),
        DataType::Float64 => col.as_primitive_opt::<Float64Type>().map(|a| Value::float(a.value(row))),
        DataType::Boolean => col.as_boolean_opt().map(|a| Value::Bool(a.value(row))),
        other => Some(Value::String(format!("{other:?}"))),
    };
    value.unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn csv_types_are_inferred() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "id,top,lith").unwrap();
        writeln!(file, "B-01,0.5,K").unwrap();
        writeln!(file, "B-01,1,").unwrap();
        let table = load_table(file.path()).unwrap();
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.column("top").unwrap(), &[Value::Float(0.5), Value::Integer(1)]);
        assert_eq!(table.column("lith").unwrap()[1], Value::Null);
    }

    #[test]
    fn id_and_mixed_columns_stay_text() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "id,lith,code,flag").unwrap();
        writeln!(file, "007,1e3,12,true").unwrap();
        writeln!(file, "010,Z,0012,1").unwrap();
        let table = load_table(file.path()).unwrap();
        assert_eq!(table.column("id").unwrap(), &[Value::from("007"), Value::from("010")]);
        assert_eq!(table.column("lith").unwrap(), &[Value::from("1e3"), Value::from("Z")]);
        assert_eq!(table.column("code").unwrap(), &[Value::Integer(12), Value::Integer(12)]);
        assert_eq!(table.column("flag").unwrap(), &[Value::from("true"), Value::from("1")]);

        let table = load_table_with_text_columns(file.path(), &["code"]).unwrap();
        assert_eq!(table.column("code").unwrap(), &[Value::from("12"), Value::from("0012")]);
    }

    #[test]
    fn json_ids_are_text() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"[{{"nr": 7, "top": 0.5}}]"#).unwrap();
        let table = load_table(file.path()).unwrap();
        assert_eq!(table.column("nr").unwrap(), &[Value::from("7")]);
        assert_eq!(table.column("top").unwrap(), &[Value::Float(0.5)]);
    }

    #[test]
    fn json_columns_are_unioned() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"[{{"id": "A", "x": 1}}, {{"id": "B", "lith": "Z"}}]"#).unwrap();
        let table = load_table(file.path()).unwrap();
        assert_eq!(table.names, vec!["id", "x", "lith"]);
        assert_eq!(table.column("x").unwrap(), &[Value::Integer(1), Value::Null]);
        assert_eq!(table.column("lith").unwrap(), &[Value::Null, Value::from("Z")]);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let file = tempfile::Builder::new().suffix(".gef").tempfile().unwrap();
        assert!(matches!(load_table(file.path()), Err(StratumError::Schema(_))));
    }
}
