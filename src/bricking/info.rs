//! Session configuration and shared bricking context
//!
//! `BrickingInformation` is the coordination record of a bricking session.
//! It owns the brick arena and the collections every pipeline stage works
//! on; the manager passes it by mutable reference to the calculator, the
//! selector and the assigner.

use glam::{UVec3, Vec3};

use super::brick::{BrickArena, BrickId};
use crate::core::{Error, Result};
use crate::format::{self, BviHeader};
use crate::volume::VoxelFormat;

/// Fallback GPU budget when none is configured, in megabytes
pub const DEFAULT_GPU_BUDGET_MB: u64 = 128;

/// Camera position used when the host never sets one
pub const DEFAULT_CAMERA_POSITION: Vec3 = Vec3::new(0.0, 0.0, 3.75);

/// Resolution budget partitioning policy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalculatorPolicy {
    /// Maximize the brick count at a single finest affordable tier
    Maximum,
    /// Spread bricks over two adjacent tiers
    Balanced,
    /// Fixed coarse tier with a simulated fine-tier search
    Standard,
}

/// Level-of-detail assignment policy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectorPolicy {
    /// Nearest bricks to the camera get the finest budgeted tiers
    CameraBased,
    /// Greedy error-reduction-per-byte knapsack against the byte budget
    ErrorBased,
}

/// Explicit per-session configuration
#[derive(Clone, Debug)]
pub struct BrickingConfig {
    /// Brick edge length in voxels, power of two and at least 2
    pub brick_size: u32,
    /// Host RAM ceiling for cached brick payloads, in megabytes
    pub ram_budget_mb: u64,
    /// GPU memory ceiling for the packed volume, in megabytes; 0 picks
    /// [`DEFAULT_GPU_BUDGET_MB`]
    pub gpu_budget_mb: u64,
    /// Largest edge length the packed 3D texture may have
    pub max_texture_dimension: u32,
    pub calculator: CalculatorPolicy,
    pub selector: SelectorPolicy,
    /// Repack automatically when the camera moves
    pub update_on_camera_move: bool,
}

impl Default for BrickingConfig {
    fn default() -> Self {
        Self {
            brick_size: 32,
            ram_budget_mb: 512,
            gpu_budget_mb: 0,
            max_texture_dimension: 2048,
            calculator: CalculatorPolicy::Maximum,
            selector: SelectorPolicy::ErrorBased,
            update_on_camera_move: false,
        }
    }
}

impl BrickingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.brick_size < 2 || !self.brick_size.is_power_of_two() {
            return Err(Error::Bricking(format!(
                "brick size must be a power of two >= 2, got {}",
                self.brick_size
            )));
        }
        if self.max_texture_dimension < self.brick_size {
            return Err(Error::Bricking(format!(
                "max texture dimension {} is smaller than the brick size {}",
                self.max_texture_dimension, self.brick_size
            )));
        }
        Ok(())
    }

    /// Effective GPU budget in bytes, applying the auto-estimate fallback
    pub fn gpu_budget_bytes(&self) -> u64 {
        let mb = if self.gpu_budget_mb == 0 {
            DEFAULT_GPU_BUDGET_MB
        } else {
            self.gpu_budget_mb
        };
        mb * 1024 * 1024
    }

    pub fn ram_budget_bytes(&self) -> u64 {
        self.ram_budget_mb * 1024 * 1024
    }
}

/// Shared state of one bricking session
#[derive(Debug)]
pub struct BrickingInformation {
    /// Brick edge length in voxels
    pub brick_size: u32,
    /// Number of level-of-detail tiers, `log2(brick_size) + 1`
    pub total_resolutions: u32,
    /// Volume dimensions rounded up to a brick-size multiple
    pub dimensions: UVec3,
    pub spacing: Vec3,
    pub format: VoxelFormat,
    /// World bounds of the volume
    pub llf: Vec3,
    pub urb: Vec3,
    /// Brick grid dimensions
    pub num_bricks: UVec3,
    pub total_bricks: u64,
    pub num_uniform_bricks: u64,
    /// Dimensions of the packed output volume
    pub packed_dimensions: UVec3,
    /// Byte budget for non-uniform brick payloads in the packed volume
    pub available_memory: u64,
    /// Brick count permitted at each level of detail, index 0 finest
    pub brick_resolutions: Vec<u64>,
    pub camera_position: Vec3,
    /// Arena of all bricks, uniform ones included
    pub bricks: BrickArena,
    /// Non-uniform bricks, in creation order
    pub volume_bricks: Vec<BrickId>,
}

impl BrickingInformation {
    /// Derive the session context from a parsed `.bvi` header
    pub fn from_header(header: &BviHeader) -> Self {
        let num_bricks = header.num_bricks();
        Self {
            brick_size: header.brick_size,
            total_resolutions: format::total_resolutions(header.brick_size),
            dimensions: header.dimensions,
            spacing: header.spacing,
            format: header.format,
            llf: header.llf,
            urb: header.urb,
            num_bricks,
            total_bricks: header.total_bricks() as u64,
            num_uniform_bricks: header.num_uniform_bricks,
            packed_dimensions: UVec3::ZERO,
            available_memory: 0,
            brick_resolutions: Vec::new(),
            camera_position: DEFAULT_CAMERA_POSITION,
            bricks: BrickArena::new(),
            volume_bricks: Vec::new(),
        }
    }

    pub fn bytes_per_voxel(&self) -> u64 {
        self.format.bytes_per_voxel() as u64
    }

    pub fn voxels_in_brick(&self) -> u64 {
        let s = self.brick_size as u64;
        s * s * s
    }

    /// Payload size of one brick at a level of detail, in bytes
    pub fn bytes_at_lod(&self, lod: u32) -> u64 {
        format::voxels_at_lod(self.brick_size, lod) as u64 * self.bytes_per_voxel()
    }

    pub fn num_nonuniform_bricks(&self) -> u64 {
        self.total_bricks - self.num_uniform_bricks
    }

    pub fn coarsest_lod(&self) -> u32 {
        self.total_resolutions - 1
    }

    /// Byte budget for non-uniform payloads given the packed capacity
    ///
    /// Uniform bricks occupy one voxel each in the packed volume and are
    /// subtracted up front.
    pub fn compute_available_memory(&mut self) {
        let capacity = self.packed_dimensions.x as u64
            * self.packed_dimensions.y as u64
            * self.packed_dimensions.z as u64;
        let total = capacity * self.bytes_per_voxel();
        let uniform = self.num_uniform_bricks * self.bytes_per_voxel();
        self.available_memory = total.saturating_sub(uniform);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_header() -> BviHeader {
        BviHeader {
            object_file_name: "test.bv".to_string(),
            dimensions: UVec3::splat(64),
            spacing: Vec3::ONE,
            format: VoxelFormat::UInt8,
            brick_size: 32,
            llf: Vec3::splat(-1.0),
            urb: Vec3::splat(1.0),
            num_uniform_bricks: 3,
        }
    }

    #[test]
    fn test_config_validation() {
        let mut config = BrickingConfig::default();
        assert!(config.validate().is_ok());

        config.brick_size = 24;
        assert!(config.validate().is_err());
        config.brick_size = 1;
        assert!(config.validate().is_err());
        config.brick_size = 4096;
        // Larger than the texture ceiling
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_gpu_budget_fallback() {
        let mut config = BrickingConfig::default();
        assert_eq!(
            config.gpu_budget_bytes(),
            DEFAULT_GPU_BUDGET_MB * 1024 * 1024
        );
        config.gpu_budget_mb = 256;
        assert_eq!(config.gpu_budget_bytes(), 256 * 1024 * 1024);
    }

    #[test]
    fn test_from_header_geometry() {
        let info = BrickingInformation::from_header(&make_header());
        assert_eq!(info.num_bricks, UVec3::splat(2));
        assert_eq!(info.total_bricks, 8);
        assert_eq!(info.total_resolutions, 6);
        assert_eq!(info.num_nonuniform_bricks(), 5);
        assert_eq!(info.coarsest_lod(), 5);
        assert_eq!(info.bytes_at_lod(0), 32 * 32 * 32);
        assert_eq!(info.bytes_at_lod(5), 1);
    }

    #[test]
    fn test_available_memory_subtracts_uniform() {
        let mut info = BrickingInformation::from_header(&make_header());
        info.packed_dimensions = UVec3::splat(64);
        info.compute_available_memory();
        assert_eq!(info.available_memory, 64 * 64 * 64 - 3);
    }
}
