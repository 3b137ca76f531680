//! Bricking session orchestration
//!
//! The `BrickingManager` owns the whole pipeline: it sizes the packed
//! volume against the GPU budget, streams bricks in from disk, runs the
//! configured resolution calculator and level-of-detail selector, packs
//! the chosen payloads and hands the result to the rendering layer as a
//! packed volume, an index volume and an entry-exit-point descriptor.
//! Later triggers (camera movement, policy or region changes) repack
//! incrementally and report which bricks changed.

use std::path::Path;

use glam::{UVec3, Vec3};
use log::{info, warn};

use super::assigner::PackingBrickAssigner;
use super::brick::BrickId;
use super::creator::VolumeBrickCreator;
use super::info::{BrickingConfig, BrickingInformation, CalculatorPolicy, SelectorPolicy};
use super::lod_selector::{BrickLodSelector, CameraLodSelector, ErrorLodSelector};
use super::packing::PackingSlots;
use super::ram::RamManager;
use super::region::{BrickingRegion, BrickingRegionManager};
use super::resolution::{
    BalancedBrickResolutionCalculator, BrickResolutionCalculator,
    MaximumBrickResolutionCalculator, StandardBrickResolutionCalculator,
};
use crate::core::{Error, Result};
use crate::format::BrickedVolumeReader;
use crate::volume::VolumeData;

/// Per-brick lookup from brick grid coordinates into the packed volume
///
/// Each entry has four 16-bit channels: the slot position xyz in packed
/// voxel coordinates and the scale factor `2^lod`.
#[derive(Debug)]
pub struct IndexVolume {
    dimensions: UVec3,
    data: Vec<u16>,
}

impl IndexVolume {
    pub fn new(dimensions: UVec3) -> Self {
        let entries = (dimensions.x * dimensions.y * dimensions.z) as usize;
        Self {
            dimensions,
            data: vec![0u16; entries * 4],
        }
    }

    pub fn dimensions(&self) -> UVec3 {
        self.dimensions
    }

    pub fn data(&self) -> &[u16] {
        &self.data
    }

    /// Raw bytes of the index data, the layout texture upload expects
    pub fn data_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    pub fn set(&mut self, grid: UVec3, slot_position: UVec3, scale: u16) {
        debug_assert!(slot_position.max_element() <= u16::MAX as u32);
        let offset = self.offset(grid);
        self.data[offset] = slot_position.x as u16;
        self.data[offset + 1] = slot_position.y as u16;
        self.data[offset + 2] = slot_position.z as u16;
        self.data[offset + 3] = scale;
    }

    pub fn entry(&self, grid: UVec3) -> [u16; 4] {
        let offset = self.offset(grid);
        [
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ]
    }

    fn offset(&self, grid: UVec3) -> usize {
        (((grid.z * self.dimensions.y + grid.y) * self.dimensions.x) + grid.x) as usize * 4
    }
}

/// Placeholder the renderer uses to compute entry and exit points
///
/// Carries only the logical volume dimensions, never voxel data.
#[derive(Clone, Copy, Debug)]
pub struct EepDescriptor {
    dimensions: UVec3,
}

impl EepDescriptor {
    pub fn dimensions(&self) -> UVec3 {
        self.dimensions
    }
}

/// The output handed to the rendering layer
#[derive(Debug)]
pub struct BrickedVolume {
    packed: VolumeData,
    index: IndexVolume,
    eep: EepDescriptor,
}

impl BrickedVolume {
    pub fn packed_volume(&self) -> &VolumeData {
        &self.packed
    }

    pub fn index_volume(&self) -> &IndexVolume {
        &self.index
    }

    pub fn eep_descriptor(&self) -> &EepDescriptor {
        &self.eep
    }
}

/// Orchestrator of one bricking session
pub struct BrickingManager {
    config: BrickingConfig,
    info: BrickingInformation,
    ram: RamManager,
    regions: BrickingRegionManager,
    slots: PackingSlots,
    output: BrickedVolume,
    built: bool,
}

impl BrickingManager {
    /// Open a bricked dataset and prepare a session
    ///
    /// `base` is the dataset path without extension. Sizes the packed
    /// volume against the GPU budget but reads no brick payloads yet.
    pub fn new(base: &Path, config: BrickingConfig) -> Result<Self> {
        config.validate()?;
        let reader = BrickedVolumeReader::open(base)?;
        let mut info = BrickingInformation::from_header(reader.header());

        info.packed_dimensions = compute_packed_dimensions(&info, &config);
        info.compute_available_memory();
        info!(
            "bricking session: volume {}x{}x{}, {} bricks of {}, packed volume {}x{}x{}",
            info.dimensions.x,
            info.dimensions.y,
            info.dimensions.z,
            info.total_bricks,
            info.brick_size,
            info.packed_dimensions.x,
            info.packed_dimensions.y,
            info.packed_dimensions.z
        );

        let capacity = info.packed_dimensions.x as u64
            * info.packed_dimensions.y as u64
            * info.packed_dimensions.z as u64;
        if capacity < info.total_bricks {
            warn!(
                "packed volume holds {} voxels but {} bricks exist, coarsest tier cannot fit",
                capacity, info.total_bricks
            );
        }

        let slots = PackingSlots::new(info.packed_dimensions, info.brick_size);
        let packed = VolumeData::new(info.packed_dimensions, info.spacing, info.format);
        let index = IndexVolume::new(info.num_bricks);
        let eep = EepDescriptor {
            dimensions: info.dimensions,
        };
        let ram = RamManager::new(reader, config.ram_budget_bytes());

        Ok(Self {
            config,
            info,
            ram,
            regions: BrickingRegionManager::new(),
            slots,
            output: BrickedVolume { packed, index, eep },
            built: false,
        })
    }

    pub fn bricked_volume(&self) -> &BrickedVolume {
        &self.output
    }

    pub fn information(&self) -> &BrickingInformation {
        &self.info
    }

    /// Build the initial packed and index volume pair
    ///
    /// Streams every brick from disk, retires uniform bricks immediately,
    /// selects levels of detail for the rest and packs them. Cached brick
    /// payloads are released at the end; the data lives in the packed
    /// volume from here on.
    pub fn create_bricked_volume(&mut self) -> Result<()> {
        if self.built {
            return Err(Error::Bricking(
                "bricked volume already created for this session".to_string(),
            ));
        }

        self.run_calculator();

        let mut creator = VolumeBrickCreator::new(&self.info);
        while let Some(id) = creator.create_next_brick(&mut self.info, &mut self.ram)? {
            if self.info.bricks.get(id).all_voxels_equal() {
                PackingBrickAssigner::fill_uniform_brick(
                    &mut self.info,
                    &mut self.slots,
                    &mut self.ram,
                    &mut self.output.packed,
                    &mut self.output.index,
                    id,
                )?;
            } else {
                self.info.volume_bricks.push(id);
            }
        }
        info!(
            "created {} bricks, {} uniform",
            self.info.total_bricks, self.info.num_uniform_bricks
        );

        // Selection restarts from this slot layout on every repack.
        self.slots.backup();

        self.run_selector();
        self.fill_volume_bricks()?;
        self.ram.free_all(&mut self.info.bricks);
        self.built = true;
        Ok(())
    }

    /// Recompute the selection and repack
    ///
    /// Restores the slot layout snapshot taken after uniform placement,
    /// packs every non-uniform brick at its newly selected level and
    /// returns the bricks whose level actually changed, the set the
    /// renderer needs for a partial texture update.
    pub fn update_bricking(&mut self) -> Result<Vec<BrickId>> {
        if !self.built {
            return Err(Error::Bricking(
                "update_bricking called before create_bricked_volume".to_string(),
            ));
        }

        self.run_calculator();
        self.run_selector();
        self.slots.restore()?;
        for id in self.info.volume_bricks.clone() {
            self.info.bricks.get_mut(id).set_packing_slot(None);
        }
        self.fill_volume_bricks()?;
        self.ram.free_all(&mut self.info.bricks);

        let changed: Vec<BrickId> = self
            .info
            .volume_bricks
            .iter()
            .copied()
            .filter(|id| self.info.bricks.get(*id).lod_changed())
            .collect();
        info!(
            "repacked {} bricks, {} changed level",
            self.info.volume_bricks.len(),
            changed.len()
        );
        Ok(changed)
    }

    /// Switch the resolution budget policy and repack
    pub fn change_resolution_calculator(
        &mut self,
        policy: CalculatorPolicy,
    ) -> Result<Vec<BrickId>> {
        self.config.calculator = policy;
        self.update_bricking()
    }

    /// Switch the level-of-detail selection policy and repack
    pub fn change_lod_selector(&mut self, policy: SelectorPolicy) -> Result<Vec<BrickId>> {
        self.config.selector = policy;
        self.update_bricking()
    }

    /// Toggle automatic repacking on camera movement
    pub fn set_update_bricks(&mut self, update: bool) {
        self.config.update_on_camera_move = update;
    }

    /// Register a world-space priority box
    ///
    /// Takes effect on the next repack. Regions registered before
    /// [`create_bricked_volume`](Self::create_bricked_volume) see no
    /// bricks and collect nothing, so register them afterwards.
    pub fn add_box_region(&mut self, llf: Vec3, urb: Vec3, priority: i32) {
        self.regions
            .add_region(BrickingRegion::from_box(&self.info, llf, urb, priority));
    }

    /// Move the camera, repacking if configured to
    pub fn camera_moved(&mut self, position: Vec3) -> Result<Option<Vec<BrickId>>> {
        self.info.camera_position = position;
        if self.config.update_on_camera_move && self.built {
            return self.update_bricking().map(Some);
        }
        Ok(None)
    }

    fn run_calculator(&mut self) {
        match self.config.calculator {
            CalculatorPolicy::Maximum => {
                MaximumBrickResolutionCalculator.calculate_brick_resolutions(&mut self.info)
            }
            CalculatorPolicy::Balanced => {
                BalancedBrickResolutionCalculator.calculate_brick_resolutions(&mut self.info)
            }
            CalculatorPolicy::Standard => {
                StandardBrickResolutionCalculator.calculate_brick_resolutions(&mut self.info)
            }
        }
    }

    fn run_selector(&mut self) {
        match self.config.selector {
            SelectorPolicy::CameraBased => {
                CameraLodSelector.select_lods(&mut self.info, &self.regions)
            }
            SelectorPolicy::ErrorBased => {
                ErrorLodSelector.select_lods(&mut self.info, &self.regions)
            }
        }
    }

    fn fill_volume_bricks(&mut self) -> Result<()> {
        for id in self.info.volume_bricks.clone() {
            PackingBrickAssigner::fill_volume_brick(
                &mut self.info,
                &mut self.slots,
                &mut self.ram,
                &mut self.output.packed,
                &mut self.output.index,
                id,
            )?;
        }
        Ok(())
    }
}

/// Size the packed volume against the GPU byte budget
///
/// Grows one axis at a time in brick-size steps, bounded by the texture
/// dimension ceiling and the (rounded) volume size, and stops before the
/// first step that would exceed the budget.
fn compute_packed_dimensions(info: &BrickingInformation, config: &BrickingConfig) -> UVec3 {
    let brick_size = info.brick_size;
    let budget = config.gpu_budget_bytes();
    let bpv = info.bytes_per_voxel();
    let bytes = |p: UVec3| p.x as u64 * p.y as u64 * p.z as u64 * bpv;

    let limit = UVec3::new(
        info.dimensions.x.min(config.max_texture_dimension).max(brick_size),
        info.dimensions.y.min(config.max_texture_dimension).max(brick_size),
        info.dimensions.z.min(config.max_texture_dimension).max(brick_size),
    );

    let mut packed = UVec3::splat(brick_size);
    if bytes(packed) > budget {
        warn!(
            "GPU budget of {} bytes is below a single brick slot, using minimum packed volume",
            budget
        );
        return packed;
    }

    loop {
        let mut grew = false;
        for axis in 0..3 {
            let mut candidate = packed;
            candidate[axis] += brick_size;
            if candidate[axis] <= limit[axis] && bytes(candidate) <= budget {
                packed = candidate;
                grew = true;
            }
        }
        if !grew {
            break;
        }
    }
    packed
}
