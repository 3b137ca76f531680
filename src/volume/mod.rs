//! Volume data container used at the boundary of the bricking core
//!
//! The bricking subsystem never needs typed voxel access of its own: it
//! treats a voxel as an opaque run of bytes whose width is fixed per
//! session. Typed interpretation happens only here, when downsampling a
//! volume or computing the error between two resolutions of the same data.

pub mod voxel_format;
pub mod data;

pub use voxel_format::VoxelFormat;
pub use data::VolumeData;
