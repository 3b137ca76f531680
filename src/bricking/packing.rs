//! Slot allocation inside the packed texture volume
//!
//! The packed volume is carved into cubic slots. Initially every slot has
//! the full brick edge length; claiming a smaller payload splits a free
//! slot into its eight half-size children and recurses into the first of
//! them. Children are never merged back, instead a backup of the slot
//! state right after uniform-brick placement can be restored before the
//! non-uniform bricks are packed again.

use std::collections::VecDeque;

use glam::UVec3;
use log::trace;

use super::brick::BrickId;
use crate::core::{Error, Result};

/// Stable handle of a slot in its allocator
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotId(pub u32);

/// One cubic region of the packed texture volume
#[derive(Clone, Debug)]
pub struct PackingSlot {
    /// Voxel position of the lower corner inside the packed volume
    position: UVec3,
    /// Edge length in voxels
    dimensions: u32,
    /// Brick whose payload occupies this slot, if any
    brick: Option<BrickId>,
}

impl PackingSlot {
    pub fn position(&self) -> UVec3 {
        self.position
    }

    pub fn dimensions(&self) -> u32 {
        self.dimensions
    }

    pub fn brick(&self) -> Option<BrickId> {
        self.brick
    }
}

#[derive(Clone, Debug)]
struct SlotState {
    slots: Vec<PackingSlot>,
    free: VecDeque<SlotId>,
    occupied: Vec<SlotId>,
}

/// Allocator over the slots of the packed texture volume
#[derive(Debug)]
pub struct PackingSlots {
    state: SlotState,
    backup: Option<SlotState>,
    packed_dimensions: UVec3,
}

impl PackingSlots {
    /// Carve a packed volume into full-size slots of `brick_size` edge length
    ///
    /// The packed dimensions must be multiples of the brick size.
    pub fn new(packed_dimensions: UVec3, brick_size: u32) -> Self {
        debug_assert!(packed_dimensions.x % brick_size == 0);
        debug_assert!(packed_dimensions.y % brick_size == 0);
        debug_assert!(packed_dimensions.z % brick_size == 0);

        let mut slots = Vec::new();
        let mut free = VecDeque::new();
        let grid = packed_dimensions / brick_size;
        for z in 0..grid.z {
            for y in 0..grid.y {
                for x in 0..grid.x {
                    let id = SlotId(slots.len() as u32);
                    slots.push(PackingSlot {
                        position: UVec3::new(x, y, z) * brick_size,
                        dimensions: brick_size,
                        brick: None,
                    });
                    free.push_back(id);
                }
            }
        }
        trace!(
            "carved packed volume {}x{}x{} into {} slots of size {}",
            packed_dimensions.x,
            packed_dimensions.y,
            packed_dimensions.z,
            slots.len(),
            brick_size
        );
        Self {
            state: SlotState {
                slots,
                free,
                occupied: Vec::new(),
            },
            backup: None,
            packed_dimensions,
        }
    }

    pub fn packed_dimensions(&self) -> UVec3 {
        self.packed_dimensions
    }

    /// Total voxel capacity of the packed volume
    pub fn capacity_voxels(&self) -> u64 {
        self.packed_dimensions.x as u64
            * self.packed_dimensions.y as u64
            * self.packed_dimensions.z as u64
    }

    pub fn get(&self, id: SlotId) -> &PackingSlot {
        &self.state.slots[id.0 as usize]
    }

    pub fn num_free(&self) -> usize {
        self.state.free.len()
    }

    pub fn occupied(&self) -> &[SlotId] {
        &self.state.occupied
    }

    /// Claim a slot of exactly `dimensions` edge length for `brick`
    ///
    /// Scans the free list for the first slot at least that large and
    /// splits it down to the requested size. Fails when no free slot can
    /// host the payload.
    pub fn claim(&mut self, dimensions: u32, brick: BrickId) -> Result<SlotId> {
        let index = self
            .state
            .free
            .iter()
            .position(|id| self.state.slots[id.0 as usize].dimensions >= dimensions)
            .ok_or_else(|| {
                Error::Bricking(format!(
                    "no free packing slot of size {} available",
                    dimensions
                ))
            })?;

        let mut id = self
            .state
            .free
            .remove(index)
            .expect("free list index from position scan");
        while self.state.slots[id.0 as usize].dimensions > dimensions {
            id = self.split(id, index);
        }

        self.state.slots[id.0 as usize].brick = Some(brick);
        self.state.occupied.push(id);
        Ok(id)
    }

    /// Split a slot into its eight half-size children
    ///
    /// The children take the parent's place in the free list at `index`;
    /// the first child is returned for further splitting or claiming.
    fn split(&mut self, id: SlotId, index: usize) -> SlotId {
        let parent = self.state.slots[id.0 as usize].clone();
        let half = parent.dimensions / 2;
        let first = SlotId(self.state.slots.len() as u32);
        for z in 0..2u32 {
            for y in 0..2u32 {
                for x in 0..2u32 {
                    let child = SlotId(self.state.slots.len() as u32);
                    self.state.slots.push(PackingSlot {
                        position: parent.position + UVec3::new(x, y, z) * half,
                        dimensions: half,
                        brick: None,
                    });
                    self.state.free.insert(index + (child.0 - first.0) as usize, child);
                }
            }
        }
        // The first child leaves the free list again, whoever asked for
        // the split will either claim or split it further.
        self.state
            .free
            .remove(index)
            .expect("first child was just inserted")
    }

    /// Release a claimed slot back to the free list
    pub fn free(&mut self, id: SlotId) {
        if let Some(pos) = self.state.occupied.iter().position(|s| *s == id) {
            self.state.occupied.swap_remove(pos);
            self.state.slots[id.0 as usize].brick = None;
            self.state.free.push_back(id);
        }
    }

    /// Snapshot the current slot state for later restores
    ///
    /// Taken once after the uniform bricks have been placed, so every
    /// repack starts from the same layout.
    pub fn backup(&mut self) {
        self.backup = Some(self.state.clone());
    }

    /// Roll back to the snapshot taken by [`backup`](Self::backup)
    pub fn restore(&mut self) -> Result<()> {
        match &self.backup {
            Some(state) => {
                self.state = state.clone();
                Ok(())
            }
            None => Err(Error::Bricking(
                "no packing backup to restore".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_slots() -> PackingSlots {
        PackingSlots::new(UVec3::splat(64), 32)
    }

    #[test]
    fn test_initial_carving() {
        let slots = make_slots();
        assert_eq!(slots.num_free(), 8);
        assert!(slots.occupied().is_empty());
        assert_eq!(slots.capacity_voxels(), 64 * 64 * 64);
    }

    #[test]
    fn test_claim_full_size() {
        let mut slots = make_slots();
        let id = slots.claim(32, BrickId(0)).unwrap();
        assert_eq!(slots.get(id).dimensions(), 32);
        assert_eq!(slots.get(id).brick(), Some(BrickId(0)));
        assert_eq!(slots.num_free(), 7);
        assert_eq!(slots.occupied(), &[id]);
    }

    #[test]
    fn test_claim_splits_down() {
        let mut slots = make_slots();
        let id = slots.claim(8, BrickId(1)).unwrap();
        assert_eq!(slots.get(id).dimensions(), 8);
        // One 32-slot became 8x16 then 8x8 children, two of which were
        // consumed along the way and one claimed.
        assert_eq!(slots.num_free(), 7 + 7 + 7);
    }

    #[test]
    fn test_split_children_cover_parent() {
        let mut slots = make_slots();
        // The first free slot gets split, remember where it was.
        let parent_pos = slots.get(SlotId(0)).position();
        let id = slots.claim(16, BrickId(0)).unwrap();
        let pos = slots.get(id).position();
        assert_eq!(pos, parent_pos);
        // Claim the remaining 7 children, all inside the parent cube.
        for i in 1..8 {
            let id = slots.claim(16, BrickId(i)).unwrap();
            let p = slots.get(id).position();
            assert!(p.x < parent_pos.x + 32 && p.y < parent_pos.y + 32 && p.z < parent_pos.z + 32);
        }
    }

    #[test]
    fn test_exhaustion_fails() {
        let mut slots = PackingSlots::new(UVec3::splat(32), 32);
        slots.claim(32, BrickId(0)).unwrap();
        assert!(slots.claim(32, BrickId(1)).is_err());
        // Smaller requests fail too once everything is claimed.
        assert!(slots.claim(8, BrickId(1)).is_err());
    }

    #[test]
    fn test_free_returns_slot() {
        let mut slots = PackingSlots::new(UVec3::splat(32), 32);
        let id = slots.claim(32, BrickId(0)).unwrap();
        assert_eq!(slots.num_free(), 0);
        slots.free(id);
        assert_eq!(slots.num_free(), 1);
        assert!(slots.get(id).brick().is_none());
        assert!(slots.claim(32, BrickId(1)).is_ok());
    }

    #[test]
    fn test_backup_and_restore() {
        let mut slots = make_slots();
        let uniform = slots.claim(32, BrickId(0)).unwrap();
        slots.backup();

        slots.claim(8, BrickId(1)).unwrap();
        slots.claim(16, BrickId(2)).unwrap();
        assert!(slots.occupied().len() > 1);

        slots.restore().unwrap();
        assert_eq!(slots.occupied(), &[uniform]);
        assert_eq!(slots.num_free(), 7);
        assert_eq!(slots.get(uniform).brick(), Some(BrickId(0)));
    }

    #[test]
    fn test_restore_without_backup_fails() {
        let mut slots = make_slots();
        assert!(slots.restore().is_err());
    }
}
