use thiserror::Error;

/// Errors raised by the collection, reference and voxel layers.
///
/// Empty selections are not errors: every selection returns a (possibly
/// zero-row) value. Out-of-grid voxel queries resolve to NaN.
#[derive(Debug, Error)]
pub enum StratumError {
    // ---- schema / validation ----
    #[error("missing required column '{column}' in {table}")]
    MissingColumn { table: String, column: String },

    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),

    #[error("duplicate object id '{0}' in header")]
    DuplicateId(String),

    #[error("invalid record in {table} at row {row}: {reason}")]
    InvalidRecord {
        table: String,
        row: usize,
        reason: String,
    },

    #[error("the column '{0}' does not exist and cannot be used for selection")]
    UnknownColumn(String),

    #[error("schema error: {0}")]
    Schema(String),

    // ---- references ----
    #[error("unrecognized coordinate reference: EPSG:{0}")]
    UnknownReference(u32),

    #[error("projection failed: {0}")]
    Projection(String),

    #[error("reference mismatch: {0}")]
    ReferenceMismatch(String),

    // ---- header/data alignment ----
    /// Header and data no longer cover the same object ids. This signals a
    /// bug in a transformation, not bad user input.
    #[error(
        "header/data misalignment: {} id(s) only in header {:?}, {} id(s) only in data {:?}",
        header_only.len(),
        header_only,
        data_only.len(),
        data_only
    )]
    Alignment {
        header_only: Vec<String>,
        data_only: Vec<String>,
    },

    // ---- lookups ----
    #[error("object id '{0}' not found")]
    KeyNotFound(String),

    // ---- voxel models ----
    #[error("shape error: {0}")]
    Shape(String),

    // ---- I/O ----
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StratumError {
    /// True for errors that indicate a broken internal invariant rather than
    /// a problem with the caller's input.
    pub fn is_internal(&self) -> bool {
        matches!(self, StratumError::Alignment { .. })
    }
}

pub type Result<T> = std::result::Result<T, StratumError>;
