//! Placement of brick payloads into packing slots
//!
//! The assigner claims a slot matching the payload's edge length, copies
//! the voxels into the packed volume and records the slot position and
//! scale factor in the index volume. Uniform bricks are written once as a
//! single voxel and never touched again.

use glam::UVec3;

use super::brick::BrickId;
use super::info::BrickingInformation;
use super::manager::IndexVolume;
use super::packing::PackingSlots;
use super::ram::RamManager;
use crate::core::{Error, Result};
use crate::format::brick_dimension_at_lod;
use crate::volume::VolumeData;

/// Writes brick payloads into the packed volume and index volume
pub struct PackingBrickAssigner;

impl PackingBrickAssigner {
    /// Place a non-uniform brick at its current level of detail
    ///
    /// Loads the payload through the RAM manager if it is not cached,
    /// claims a slot of the payload's size and records the assignment in
    /// the index volume with scale factor `2^lod`.
    pub fn fill_volume_brick(
        info: &mut BrickingInformation,
        slots: &mut PackingSlots,
        ram: &mut RamManager,
        packed: &mut VolumeData,
        index: &mut IndexVolume,
        id: BrickId,
    ) -> Result<()> {
        let lod = info.bricks.get(id).current_lod();
        ram.read_brick_from_disk(&mut info.bricks, id, lod)?;

        let dim = brick_dimension_at_lod(info.brick_size, lod);
        let slot = slots.claim(dim, id)?;
        let slot_position = slots.get(slot).position();

        {
            let brick = info.bricks.get(id);
            let payload = brick.lod_volume(lod).ok_or_else(|| {
                Error::Bricking(format!("brick {:?} payload missing at LOD {}", id, lod))
            })?;
            write_payload(packed, slot_position, dim, payload);
        }

        let brick = info.bricks.get_mut(id);
        brick.set_packing_slot(Some(slot));
        index.set(brick.position(), slot_position, 1u16 << lod);
        Ok(())
    }

    /// Place a uniform brick's single voxel and retire its payload
    ///
    /// The claimed one-voxel slot stays occupied for the whole session;
    /// uniform bricks never participate in repacking.
    pub fn fill_uniform_brick(
        info: &mut BrickingInformation,
        slots: &mut PackingSlots,
        ram: &mut RamManager,
        packed: &mut VolumeData,
        index: &mut IndexVolume,
        id: BrickId,
    ) -> Result<()> {
        let coarsest = info.coarsest_lod();
        info.bricks.get_mut(id).set_current_lod(coarsest);
        ram.read_brick_from_disk(&mut info.bricks, id, coarsest)?;

        let slot = slots.claim(1, id)?;
        let slot_position = slots.get(slot).position();

        {
            let brick = info.bricks.get(id);
            let payload = brick.lod_volume(coarsest).ok_or_else(|| {
                Error::Bricking(format!("uniform brick {:?} payload missing", id))
            })?;
            write_payload(packed, slot_position, 1, payload);
        }

        let brick = info.bricks.get_mut(id);
        index.set(brick.position(), slot_position, 1u16 << coarsest);
        brick.delete_lod_volume(coarsest);
        Ok(())
    }
}

/// Copy a cubic row-major payload into the packed volume
fn write_payload(packed: &mut VolumeData, position: UVec3, dim: u32, payload: &[u8]) {
    let bpv = packed.format().bytes_per_voxel();
    let packed_dims = packed.dimensions();
    let row = dim as usize * bpv;
    debug_assert_eq!(payload.len(), row * dim as usize * dim as usize);

    let bytes = packed.bytes_mut();
    for z in 0..dim {
        for y in 0..dim {
            let src = ((z * dim + y) * dim) as usize * bpv;
            let dst_voxel = ((position.z + z) * packed_dims.y + position.y + y) as usize
                * packed_dims.x as usize
                + position.x as usize;
            let dst = dst_voxel * bpv;
            bytes[dst..dst + row].copy_from_slice(&payload[src..src + row]);
        }
    }
}
