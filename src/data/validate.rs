//! Row validation for headers and data tables.
//!
//! Every rule produces a list of `(row, reason)` violations; what happens to
//! the offending rows is decided by [`ValidationSettings`].

use super::header::{HeaderRecord, PointHeader};
use super::records::{DataRecord, Layer, Measurement};
use super::table::DataTable;
use super::value::Value;
use crate::config::ValidationSettings;
use crate::error::{Result, StratumError};
use crate::reference::VerticalReference;

/// Column added when invalid rows are flagged instead of dropped.
pub const VALID_FLAG_COLUMN: &str = "is_valid";

const TOLERANCE: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Validation rules of a data row type.
pub trait RowRules: DataRecord {
    /// Reason the row is invalid on its own, if it is.
    fn row_violation(&self, reference: VerticalReference) -> Option<String>;

    /// Reason `next` is inconsistent with the preceding row of the same
    /// object, if it is.
    fn sequence_violation(_prev: &Self, _next: &Self, _reference: VerticalReference) -> Option<String> {
        None
    }
}

impl RowRules for Layer {
    fn row_violation(&self, reference: VerticalReference) -> Option<String> {
        if !self.top.is_finite() || !self.bottom.is_finite() {
            return Some("non-finite layer boundary".into());
        }
        let (top, bottom) = self.depth_range(reference);
        let ordered = if reference.increases_downward() {
            self.top < self.bottom
        } else {
            self.top > self.bottom
        };
        if !ordered || bottom - top <= 0.0 {
            return Some(format!(
                "top {} is not above bottom {} ({reference})",
                self.top, self.bottom
            ));
        }
        None
    }

    fn sequence_violation(prev: &Self, next: &Self, reference: VerticalReference) -> Option<String> {
        let (_, prev_bottom) = prev.depth_range(reference);
        let (next_top, _) = next.depth_range(reference);
        (next_top < prev_bottom - TOLERANCE).then(|| {
            format!(
                "layer at {} overlaps the layer above ending at {}",
                next.top, prev.bottom
            )
        })
    }
}

impl RowRules for Measurement {
    fn row_violation(&self, reference: VerticalReference) -> Option<String> {
        if !self.depth.is_finite() {
            return Some("non-finite depth".into());
        }
        let depth = self.sort_depth(reference);
        (depth < -TOLERANCE).then(|| format!("measurement at {} lies above the surface", self.depth))
    }
}

fn header_violation(record: &HeaderRecord, reference: VerticalReference) -> Option<String> {
    if !(record.x.is_finite() && record.y.is_finite()) {
        return Some("non-finite coordinates".into());
    }
    if !(record.surface.is_finite() && record.end.is_finite()) {
        return Some("non-finite surface or end".into());
    }
    let length = record.length(reference);
    (length < -TOLERANCE).then(|| format!("end {} lies above the surface {}", record.end, record.surface))
}

/// Violations of a data table, in row order.
pub fn data_violations<R: RowRules>(table: &DataTable<R>) -> Vec<(usize, String)> {
    let reference = table.vertical_reference();
    let records = table.records();
    let mut violations = Vec::new();
    for (i, r) in records.iter().enumerate() {
        if let Some(reason) = r.row_violation(reference) {
            violations.push((i, reason));
            continue;
        }
        if i > 0 && records[i - 1].id() == r.id() {
            if let Some(reason) = R::sequence_violation(&records[i - 1], r, reference) {
                violations.push((i, reason));
            }
        }
    }
    violations
}

/// Violations of a header, in row order. Duplicate ids are rejected when the
/// header is built.
pub fn header_violations(header: &PointHeader) -> Vec<(usize, String)> {
    header
        .records()
        .iter()
        .enumerate()
        .filter_map(|(i, r)| header_violation(r, header.vertical_reference()).map(|reason| (i, reason)))
        .collect()
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

fn report(table: &str, violations: &[(usize, String)], settings: &ValidationSettings, action: &str) {
    if settings.verbose {
        for (row, reason) in violations {
            log::warn!("{table} row {row}: {reason} ({action})");
        }
    }
    log::warn!("{} invalid row(s) in {table} {action}", violations.len());
}

fn first_error(table: &str, violations: &[(usize, String)]) -> StratumError {
    let (row, reason) = violations[0].clone();
    StratumError::InvalidRecord {
        table: table.to_string(),
        row,
        reason,
    }
}

/// Validate a data table under `settings`: drop, flag or fail on invalid
/// rows.
pub fn validate_data<R: RowRules>(table: DataTable<R>, settings: &ValidationSettings) -> Result<DataTable<R>> {
    if !settings.enabled {
        return Ok(table);
    }
    let name = R::KIND.to_string();
    let violations = data_violations(&table);
    if violations.is_empty() {
        return Ok(table);
    }
    let mut valid = vec![true; table.len()];
    for (row, _) in &violations {
        valid[*row] = false;
    }
    if settings.drop_invalid {
        report(&name, &violations, settings, "dropped");
        table.select_by_mask(&valid, false)
    } else if settings.flag_invalid {
        report(&name, &violations, settings, "flagged");
        table.with_row_column(VALID_FLAG_COLUMN, valid.into_iter().map(Value::Bool).collect())
    } else {
        Err(first_error(&name, &violations))
    }
}

/// Validate a header under `settings`: drop, flag or fail on invalid rows.
pub fn validate_header(header: PointHeader, settings: &ValidationSettings) -> Result<PointHeader> {
    if !settings.enabled {
        return Ok(header);
    }
    let violations = header_violations(&header);
    if violations.is_empty() {
        return Ok(header);
    }
    let invalid: std::collections::HashSet<&str> = violations
        .iter()
        .map(|(row, _)| header.records()[*row].id.as_str())
        .collect();
    if settings.drop_invalid {
        report("header", &violations, settings, "dropped");
        let keep = header.ids().filter(|id| !invalid.contains(id)).collect();
        Ok(header.retain_ids(&keep))
    } else if settings.flag_invalid {
        report("header", &violations, settings, "flagged");
        let flags = header
            .ids()
            .map(|id| (id.to_string(), Value::Bool(!invalid.contains(id))))
            .collect();
        header.add_column(VALID_FLAG_COLUMN, &flags, Value::Bool(true))
    } else {
        Err(first_error("header", &violations))
    }
}
