//! Three-file on-disk format for bricked volumes
//!
//! A bricked dataset is stored as three co-located files sharing a base
//! name:
//!
//! - `.bvi` - text header: volume dimensions (rounded up to a brick-size
//!   multiple), spacing, voxel format, brick size, world bounds and the
//!   count of uniform ("all voxels equal") bricks.
//! - `.bpi` - binary index: per-brick 64-bit payload offsets, per-brick
//!   uniform flags, and per-LOD error values for every non-uniform brick.
//! - `.bv` - binary payload: per brick, the finest-LOD voxels followed by
//!   each successively downsampled LOD. A uniform brick stores a single
//!   voxel instead.
//!
//! All binary fields are little-endian. Offsets are 64-bit because payload
//! files routinely exceed 2GB.

pub mod header;
pub mod writer;
pub mod reader;

pub use header::BviHeader;
pub use writer::BrickedVolumeWriter;
pub use reader::{BrickIndexEntry, BrickedVolumeReader};

/// Number of resolution levels a brick of the given edge length has
///
/// A brick is downsampled by halving until a single voxel remains, so a
/// brick size of 32 yields 6 levels (32 16 8 4 2 1).
pub fn total_resolutions(brick_size: u32) -> u32 {
    debug_assert!(brick_size.is_power_of_two());
    brick_size.ilog2() + 1
}

/// Edge length of a brick at a given level of detail
pub fn brick_dimension_at_lod(brick_size: u32, lod: u32) -> u32 {
    (brick_size >> lod).max(1)
}

/// Voxel count of a brick at a given level of detail
pub fn voxels_at_lod(brick_size: u32, lod: u32) -> usize {
    let dim = brick_dimension_at_lod(brick_size, lod) as usize;
    dim * dim * dim
}
