/// Gridded subsurface models.
///
/// ```text
///   VoxelModel (y, x, z)
///        │
///        ├── select_within_bbox / polygons / by_values / slice ──▶ VoxelModel
///        ├── select_top / bottom / surface_level / aggregates ──▶ LabeledArray2
///        ├── select_with_points ──▶ ProfileSamples (idx, z)
///        └── select_with_line   ──▶ Section (dist, z)
/// ```
pub mod grid;
pub mod voxel;

pub use grid::{Axis, LabeledArray2, ProfileSamples, Section, ValueCounts};
pub use voxel::{DepthBound, LineSampling, Resolution, VoxelModel, VoxelSlicePolicy};
