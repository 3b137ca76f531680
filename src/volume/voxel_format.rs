//! Voxel format descriptor
//!
//! One closed enum covers every voxel layout the crate supports. The format
//! is decided once when a bricking session opens and never changes, so all
//! downstream code can size buffers from `bytes_per_voxel` without caring
//! what the bytes mean.

use crate::core::{Error, Result};

/// Supported voxel layouts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoxelFormat {
    /// Single 8-bit scalar channel
    UInt8,
    /// Single 16-bit scalar channel
    UInt16,
    /// Single 32-bit float channel
    Float32,
    /// Three 8-bit color channels
    Rgb8,
    /// Four 8-bit color channels
    Rgba8,
}

impl VoxelFormat {
    /// Number of channels per voxel
    pub fn channels(&self) -> usize {
        match self {
            VoxelFormat::UInt8 | VoxelFormat::UInt16 | VoxelFormat::Float32 => 1,
            VoxelFormat::Rgb8 => 3,
            VoxelFormat::Rgba8 => 4,
        }
    }

    /// Bytes of storage per channel
    pub fn bytes_per_channel(&self) -> usize {
        match self {
            VoxelFormat::UInt8 | VoxelFormat::Rgb8 | VoxelFormat::Rgba8 => 1,
            VoxelFormat::UInt16 => 2,
            VoxelFormat::Float32 => 4,
        }
    }

    /// Bytes of storage per voxel
    pub fn bytes_per_voxel(&self) -> usize {
        self.channels() * self.bytes_per_channel()
    }

    /// Bits allocated per voxel
    pub fn bits_allocated(&self) -> usize {
        self.bytes_per_voxel() * 8
    }

    /// Header name of the sample type ("UCHAR", "USHORT" or "FLOAT")
    pub fn sample_name(&self) -> &'static str {
        match self {
            VoxelFormat::UInt8 | VoxelFormat::Rgb8 | VoxelFormat::Rgba8 => "UCHAR",
            VoxelFormat::UInt16 => "USHORT",
            VoxelFormat::Float32 => "FLOAT",
        }
    }

    /// Header name of the object model ("I", "RGB" or "RGBA")
    pub fn object_model(&self) -> &'static str {
        match self {
            VoxelFormat::UInt8 | VoxelFormat::UInt16 | VoxelFormat::Float32 => "I",
            VoxelFormat::Rgb8 => "RGB",
            VoxelFormat::Rgba8 => "RGBA",
        }
    }

    /// Reconstruct a format from header fields
    pub fn from_header(sample: &str, object_model: &str) -> Result<Self> {
        match (sample, object_model) {
            ("UCHAR", "I") => Ok(VoxelFormat::UInt8),
            ("USHORT", "I") => Ok(VoxelFormat::UInt16),
            ("FLOAT", "I") => Ok(VoxelFormat::Float32),
            ("UCHAR", "RGB") => Ok(VoxelFormat::Rgb8),
            ("UCHAR", "RGBA") => Ok(VoxelFormat::Rgba8),
            _ => Err(Error::Format(format!(
                "unsupported voxel format: {} {}",
                sample, object_model
            ))),
        }
    }
}
