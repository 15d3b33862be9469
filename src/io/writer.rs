use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use serde_json::{Map, Number, Value as JsonValue};

use super::RawTable;
use crate::data::value::Value;
use crate::error::Result;

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// Write a table as CSV with a header row. `Null` cells are empty.
pub fn write_csv(path: &Path, table: &RawTable) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&table.names)?;
    for row in 0..table.n_rows() {
        writer.write_record(table.columns.iter().map(|c| csv_cell(&c[row])))?;
    }
    writer.flush()?;
    log::debug!("wrote {} rows to {}", table.n_rows(), path.display());
    Ok(())
}

/// Integral floats keep a decimal point so they read back as floats.
fn csv_cell(value: &Value) -> String {
    match value {
        Value::Float(v) if v.is_finite() && v.fract() == 0.0 => format!("{v:.1}"),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// JSON records
// ---------------------------------------------------------------------------

/// Write a table as a JSON array of row objects, the layout `load_table`
/// reads back.
pub fn write_json(path: &Path, table: &RawTable) -> Result<()> {
    let rows: Vec<JsonValue> = (0..table.n_rows())
        .map(|row| {
            let obj: Map<String, JsonValue> = table
                .names
                .iter()
                .zip(&table.columns)
                .map(|(name, column)| (name.clone(), value_to_json(&column[row])))
                .collect();
            JsonValue::Object(obj)
        })
        .collect();
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, &rows)?;
    log::debug!("wrote {} rows to {}", table.n_rows(), path.display());
    Ok(())
}

fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Integer(i) => JsonValue::Number((*i).into()),
        Value::Float(v) => Number::from_f64(*v).map(JsonValue::Number).unwrap_or(JsonValue::Null),
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Null => JsonValue::Null,
    }
}

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

/// Convert a table into one Arrow record batch. Column types are chosen from
/// the cells: all-integer columns become Int64, numeric columns Float64,
/// boolean columns Boolean, anything else Utf8. `metadata` is stored in the
/// schema.
pub fn to_record_batch(table: &RawTable, metadata: &HashMap<String, String>) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(table.names.len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(table.names.len());
    for (name, column) in table.names.iter().zip(&table.columns) {
        let (data_type, array) = column_to_array(column);
        fields.push(Field::new(name, data_type, true));
        arrays.push(array);
    }
    let schema = Arc::new(Schema::new(fields).with_metadata(metadata.clone()));
    Ok(RecordBatch::try_new(schema, arrays)?)
}

/// Write a table as a single-batch Parquet file.
pub fn write_parquet(path: &Path, table: &RawTable, metadata: &HashMap<String, String>) -> Result<()> {
    let batch = to_record_batch(table, metadata)?;
    let file = std::fs::File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(&batch)?;
    writer.close()?;
    log::debug!("wrote {} rows to {}", table.n_rows(), path.display());
    Ok(())
}

/// Cell type shared by a whole column.
#[derive(Clone, Copy, PartialEq)]
enum ColumnType {
    Integer,
    Float,
    Bool,
    Text,
}

fn column_type(column: &[Value]) -> ColumnType {
    let mut kind: Option<ColumnType> = None;
    for value in column {
        let cell = match value {
            Value::Null => continue,
            Value::Integer(_) => ColumnType::Integer,
            Value::Float(_) => ColumnType::Float,
            Value::Bool(_) => ColumnType::Bool,
            Value::String(_) => return ColumnType::Text,
        };
        kind = Some(match (kind, cell) {
            (None, c) => c,
            (Some(k), c) if k == c => k,
            (Some(ColumnType::Integer), ColumnType::Float) | (Some(ColumnType::Float), ColumnType::Integer) => {
                ColumnType::Float
            }
            _ => return ColumnType::Text,
        });
    }
    kind.unwrap_or(ColumnType::Text)
}

fn column_to_array(column: &[Value]) -> (DataType, ArrayRef) {
    match column_type(column) {
        ColumnType::Integer => {
            let array: Int64Array = column
                .iter()
                .map(|v| match v {
                    Value::Integer(i) => Some(*i),
                    _ => None,
                })
                .collect();
            (DataType::Int64, Arc::new(array))
        }
        ColumnType::Float => {
            let array: Float64Array = column.iter().map(Value::as_f64).collect();
            (DataType::Float64, Arc::new(array))
        }
        ColumnType::Bool => {
            let array: BooleanArray = column
                .iter()
                .map(|v| match v {
                    Value::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect();
            (DataType::Boolean, Arc::new(array))
        }
        ColumnType::Text => {
            let array: StringArray = column
                .iter()
                .map(|v| match v {
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect();
            (DataType::Utf8, Arc::new(array))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::load_table;

    fn sample() -> RawTable {
        let mut table = RawTable::default();
        table.push_column("id", vec![Value::from("A"), Value::from("B")]);
        table.push_column("top", vec![Value::Float(1.0), Value::Integer(2)]);
        table.push_column("n", vec![Value::Integer(3), Value::Null]);
        table.push_column("ok", vec![Value::Bool(true), Value::Bool(false)]);
        table
    }

    #[test]
    fn mixed_numeric_columns_become_float() {
        let table = sample();
        assert!(column_type(&table.columns[1]) == ColumnType::Float);
        assert!(column_type(&table.columns[2]) == ColumnType::Integer);
        assert!(column_type(&[Value::Bool(true), Value::Integer(1)]) == ColumnType::Text);
    }

    #[test]
    fn csv_keeps_float_cells_float() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        write_csv(&path, &sample()).unwrap();
        let back = load_table(&path).unwrap();
        assert_eq!(back.column("top").unwrap()[0], Value::Float(1.0));
        assert_eq!(back.column("n").unwrap()[1], Value::Null);
    }

    #[test]
    fn parquet_keeps_types_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.parquet");
        let metadata = HashMap::from([("k".to_string(), "v".to_string())]);
        write_parquet(&path, &sample(), &metadata).unwrap();
        let back = load_table(&path).unwrap();
        assert_eq!(back.names, sample().names);
        assert_eq!(back.column("top").unwrap(), &[Value::Float(1.0), Value::Float(2.0)]);
        assert_eq!(back.column("ok").unwrap()[1], Value::Bool(false));
        assert_eq!(back.metadata.get("k").map(String::as_str), Some("v"));
    }

    #[test]
    fn json_round_trips_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.json");
        write_json(&path, &sample()).unwrap();
        let back = load_table(&path).unwrap();
        assert_eq!(back.column("id").unwrap(), sample().column("id").unwrap());
        assert_eq!(back.column("n").unwrap(), &[Value::Integer(3), Value::Null]);
    }
}
