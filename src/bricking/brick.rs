//! Volume bricks and the arena that owns them
//!
//! A `VolumeBrick` is one cubic region of the original volume. Its voxel
//! payloads at the various levels of detail are loaded on demand (and
//! evicted again) by the RAM manager, so a brick may hold zero, one or
//! several LOD buffers at any time.
//!
//! Bricks live in a `BrickArena` and are addressed by `BrickId` handles.
//! Every cross-reference in the subsystem (regions, packing slots, the
//! eviction FIFO) stores handles, never pointers into the arena.

use std::collections::BTreeMap;

use glam::{UVec3, Vec3};

use super::packing::SlotId;

/// Stable handle of a brick in its arena
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BrickId(pub u32);

/// One cubic region of the original volume
#[derive(Debug)]
pub struct VolumeBrick {
    /// Position in brick-grid coordinates (not voxel coordinates)
    position: UVec3,
    /// Edge length in voxels
    dimensions: u32,
    /// World-space lower-left-front corner
    llf: Vec3,
    /// Loaded voxel payloads by level of detail
    lod_volumes: BTreeMap<u32, Vec<u8>>,
    /// Level of detail this brick should currently be rendered at
    current_lod: u32,
    /// Previous level of detail, for incremental repacking
    old_lod: u32,
    lod_changed: bool,
    all_voxels_equal: bool,
    /// Byte offset of this brick's payload in the `.bv` file
    bv_file_position: u64,
    /// Error of each level of detail against the finest; index 0 is 0.0
    errors: Vec<f32>,
    /// Packing slot currently hosting this brick's payload
    packing_slot: Option<SlotId>,
}

impl VolumeBrick {
    pub fn new(position: UVec3, llf: Vec3, dimensions: u32) -> Self {
        Self {
            position,
            dimensions,
            llf,
            lod_volumes: BTreeMap::new(),
            current_lod: 0,
            old_lod: 0,
            lod_changed: false,
            all_voxels_equal: false,
            bv_file_position: 0,
            errors: Vec::new(),
            packing_slot: None,
        }
    }

    pub fn position(&self) -> UVec3 {
        self.position
    }

    pub fn dimensions(&self) -> u32 {
        self.dimensions
    }

    pub fn llf(&self) -> Vec3 {
        self.llf
    }

    /// Set the target level of detail, tracking whether it changed
    pub fn set_current_lod(&mut self, lod: u32) {
        self.old_lod = self.current_lod;
        self.current_lod = lod;
        self.lod_changed = self.current_lod != self.old_lod;
    }

    pub fn current_lod(&self) -> u32 {
        self.current_lod
    }

    pub fn old_lod(&self) -> u32 {
        self.old_lod
    }

    pub fn lod_changed(&self) -> bool {
        self.lod_changed
    }

    pub fn set_lod_changed(&mut self, changed: bool) {
        self.lod_changed = changed;
    }

    pub fn set_all_voxels_equal(&mut self, uniform: bool) {
        self.all_voxels_equal = uniform;
    }

    pub fn all_voxels_equal(&self) -> bool {
        self.all_voxels_equal
    }

    pub fn set_bv_file_position(&mut self, position: u64) {
        self.bv_file_position = position;
    }

    pub fn bv_file_position(&self) -> u64 {
        self.bv_file_position
    }

    pub fn set_errors(&mut self, errors: Vec<f32>) {
        self.errors = errors;
    }

    /// Error of a level of detail against the finest level
    ///
    /// Returns `None` for levels without a recorded error (uniform bricks
    /// record none).
    pub fn error(&self, lod: u32) -> Option<f32> {
        self.errors.get(lod as usize).copied()
    }

    pub fn set_packing_slot(&mut self, slot: Option<SlotId>) {
        self.packing_slot = slot;
    }

    pub fn packing_slot(&self) -> Option<SlotId> {
        self.packing_slot
    }

    /// Attach a loaded payload for a level of detail
    ///
    /// Returns false if that level is already loaded.
    pub fn add_lod_volume(&mut self, lod: u32, data: Vec<u8>) -> bool {
        if self.lod_volumes.contains_key(&lod) {
            return false;
        }
        self.lod_volumes.insert(lod, data);
        true
    }

    /// Drop a loaded payload, freeing its memory
    pub fn delete_lod_volume(&mut self, lod: u32) -> bool {
        self.lod_volumes.remove(&lod).is_some()
    }

    pub fn has_lod_volume(&self, lod: u32) -> bool {
        self.lod_volumes.contains_key(&lod)
    }

    pub fn lod_volume(&self, lod: u32) -> Option<&[u8]> {
        self.lod_volumes.get(&lod).map(|v| v.as_slice())
    }

    /// Number of loaded payload bytes across all levels
    pub fn loaded_bytes(&self) -> usize {
        self.lod_volumes.values().map(|v| v.len()).sum()
    }
}

/// Arena owning every volume brick of a session
#[derive(Debug, Default)]
pub struct BrickArena {
    bricks: Vec<VolumeBrick>,
}

impl BrickArena {
    pub fn new() -> Self {
        Self { bricks: Vec::new() }
    }

    pub fn insert(&mut self, brick: VolumeBrick) -> BrickId {
        let id = BrickId(self.bricks.len() as u32);
        self.bricks.push(brick);
        id
    }

    pub fn get(&self, id: BrickId) -> &VolumeBrick {
        &self.bricks[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: BrickId) -> &mut VolumeBrick {
        &mut self.bricks[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.bricks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bricks.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = BrickId> {
        (0..self.bricks.len() as u32).map(BrickId)
    }
}
