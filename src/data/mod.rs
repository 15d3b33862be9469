/// Data layer: tables, selection and validation.
///
/// Architecture:
/// ```text
///   raw table (io)
///        │
///        ▼
///   ┌──────────────┐      ┌──────────────────────┐
///   │ PointHeader   │      │ DataTable<R>          │  R = Layer | Measurement
///   │ one row / obj │      │ rows grouped by id    │
///   └──────────────┘      └──────────────────────┘
///        │                        │
///        │  spatial / attribute   │  filter, slice (DepthSlice), analysis
///        ▼                        ▼
///   ┌──────────┐
///   │ validate  │  drop / flag / fail per ValidationSettings
///   └──────────┘
/// ```

pub mod analysis;
pub mod discrete;
pub mod filter;
pub mod header;
pub mod layered;
pub mod records;
pub mod table;
pub mod validate;
pub mod value;
