//! Host RAM budget for cached brick payloads
//!
//! The `RamManager` owns the disk reader and bounds how many decoded
//! brick LOD buffers may live in host memory at once. When a load would
//! exceed the ceiling it evicts in oldest-loaded-first order, which is a
//! plain FIFO rather than LRU: entries are never re-ordered on access.

use std::collections::VecDeque;

use log::trace;

use super::brick::{BrickArena, BrickId};
use crate::core::{Error, Result};
use crate::format::{voxels_at_lod, BrickedVolumeReader};

/// Budgeted cache of brick payloads loaded from disk
pub struct RamManager {
    reader: BrickedVolumeReader,
    /// Ceiling in bytes
    budget: u64,
    used: u64,
    /// Evictable loads in load order, oldest first
    volumes_in_ram: VecDeque<(BrickId, u32)>,
}

impl RamManager {
    pub fn new(reader: BrickedVolumeReader, budget_bytes: u64) -> Self {
        Self {
            reader,
            budget: budget_bytes,
            used: 0,
            volumes_in_ram: VecDeque::new(),
        }
    }

    pub fn reader(&self) -> &BrickedVolumeReader {
        &self.reader
    }

    pub fn reader_mut(&mut self) -> &mut BrickedVolumeReader {
        &mut self.reader
    }

    pub fn used_bytes(&self) -> u64 {
        self.used
    }

    pub fn budget_bytes(&self) -> u64 {
        self.budget
    }

    /// Load one brick's payload at a level of detail into the brick
    ///
    /// Evicts older loads first if the ceiling would be exceeded. A load
    /// that cannot be satisfied even with an empty cache fails with
    /// [`Error::Budget`]. Uniform bricks load their single stored voxel
    /// and are never eligible for eviction.
    pub fn read_brick_from_disk(
        &mut self,
        bricks: &mut BrickArena,
        id: BrickId,
        lod: u32,
    ) -> Result<()> {
        let (bv_position, uniform, brick_size) = {
            let brick = bricks.get(id);
            if brick.has_lod_volume(lod) {
                return Ok(());
            }
            (
                brick.bv_file_position(),
                brick.all_voxels_equal(),
                brick.dimensions(),
            )
        };

        let bytes_per_voxel = self.reader.header().format.bytes_per_voxel();
        let num_bytes = if uniform {
            bytes_per_voxel
        } else {
            voxels_at_lod(brick_size, lod) * bytes_per_voxel
        };

        self.increase_used_ram(bricks, num_bytes as u64)?;

        let data = match self.reader.read_brick(bv_position, uniform, lod, num_bytes) {
            Ok(data) => data,
            Err(err) => {
                // Nothing was loaded, give the accounted bytes back.
                self.used -= num_bytes as u64;
                return Err(err);
            }
        };
        bricks.get_mut(id).add_lod_volume(lod, data);

        if !uniform {
            self.volumes_in_ram.push_back((id, lod));
        }
        Ok(())
    }

    /// Account for a pending load, evicting as needed
    fn increase_used_ram(&mut self, bricks: &mut BrickArena, bytes: u64) -> Result<()> {
        if self.used + bytes > self.budget {
            let needed = self.used + bytes - self.budget;
            if !self.free_mem(bricks, needed) {
                return Err(Error::Budget(format!(
                    "cannot free {} bytes for a {} byte brick load (budget {} bytes)",
                    needed, bytes, self.budget
                )));
            }
        }
        self.used += bytes;
        Ok(())
    }

    /// Evict oldest loads until at least `bytes` are freed
    ///
    /// Returns false when the cache empties before the target is met.
    fn free_mem(&mut self, bricks: &mut BrickArena, bytes: u64) -> bool {
        let bytes_per_voxel = self.reader.header().format.bytes_per_voxel() as u64;
        let mut freed = 0u64;
        while freed < bytes {
            let Some((id, lod)) = self.volumes_in_ram.pop_front() else {
                self.used -= freed;
                return false;
            };
            let brick = bricks.get_mut(id);
            let size = voxels_at_lod(brick.dimensions(), lod) as u64 * bytes_per_voxel;
            brick.delete_lod_volume(lod);
            freed += size;
            trace!("evicted brick {:?} LOD {} ({} bytes)", id, lod, size);
        }
        self.used -= freed;
        true
    }

    /// Drop every evictable payload
    ///
    /// Called once the packed volume has been written, when the cached
    /// buffers are no longer needed.
    pub fn free_all(&mut self, bricks: &mut BrickArena) {
        let bytes_per_voxel = self.reader.header().format.bytes_per_voxel() as u64;
        while let Some((id, lod)) = self.volumes_in_ram.pop_front() {
            let brick = bricks.get_mut(id);
            let size = voxels_at_lod(brick.dimensions(), lod) as u64 * bytes_per_voxel;
            brick.delete_lod_volume(lod);
            self.used -= size.min(self.used);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bricking::brick::VolumeBrick;
    use crate::format::writer::write_bricked_volume;
    use crate::format::BrickedVolumeReader;
    use crate::volume::{VolumeData, VoxelFormat};
    use glam::{UVec3, Vec3};

    fn make_session(budget: u64) -> (tempfile::TempDir, RamManager, BrickArena) {
        let dims = UVec3::splat(16);
        let mut volume = VolumeData::new(dims, Vec3::ONE, VoxelFormat::UInt8);
        for z in 0..dims.z {
            for y in 0..dims.y {
                for x in 0..dims.x {
                    volume.set_channel_value(x, y, z, 0, ((x + y * 3 + z * 7) % 251) as f64);
                }
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("cache_test");
        write_bricked_volume(&base, &volume, 8).unwrap();
        let mut reader = BrickedVolumeReader::open(&base).unwrap();

        let mut arena = BrickArena::new();
        for z in 0..2u32 {
            for y in 0..2u32 {
                for x in 0..2u32 {
                    let entry = reader.read_brick_position().unwrap();
                    let mut brick = VolumeBrick::new(UVec3::new(x, y, z), Vec3::ZERO, 8);
                    brick.set_bv_file_position(entry.bv_position);
                    brick.set_all_voxels_equal(entry.all_voxels_equal);
                    arena.insert(brick);
                }
            }
        }

        (dir, RamManager::new(reader, budget), arena)
    }

    #[test]
    fn test_load_within_budget() {
        let (_dir, mut ram, mut arena) = make_session(10_000);
        let id = BrickId(0);
        ram.read_brick_from_disk(&mut arena, id, 0).unwrap();
        assert!(arena.get(id).has_lod_volume(0));
        assert_eq!(ram.used_bytes(), 512);
    }

    #[test]
    fn test_reload_is_noop() {
        let (_dir, mut ram, mut arena) = make_session(10_000);
        ram.read_brick_from_disk(&mut arena, BrickId(0), 0).unwrap();
        ram.read_brick_from_disk(&mut arena, BrickId(0), 0).unwrap();
        assert_eq!(ram.used_bytes(), 512);
    }

    #[test]
    fn test_fifo_eviction_order() {
        // Budget fits exactly two full-LOD bricks of 512 bytes each.
        let (_dir, mut ram, mut arena) = make_session(1024);
        ram.read_brick_from_disk(&mut arena, BrickId(0), 0).unwrap();
        ram.read_brick_from_disk(&mut arena, BrickId(1), 0).unwrap();
        assert_eq!(ram.used_bytes(), 1024);

        // Touching brick 0 again must not refresh its position, so the
        // third load still evicts brick 0 first.
        ram.read_brick_from_disk(&mut arena, BrickId(0), 0).unwrap();
        ram.read_brick_from_disk(&mut arena, BrickId(2), 0).unwrap();
        assert!(!arena.get(BrickId(0)).has_lod_volume(0));
        assert!(arena.get(BrickId(1)).has_lod_volume(0));
        assert!(arena.get(BrickId(2)).has_lod_volume(0));
        assert!(ram.used_bytes() <= 1024);
    }

    #[test]
    fn test_budget_too_small_is_distinguished() {
        let (_dir, mut ram, mut arena) = make_session(100);
        let err = ram
            .read_brick_from_disk(&mut arena, BrickId(0), 0)
            .unwrap_err();
        assert!(matches!(err, Error::Budget(_)));
        // A coarser level still fits.
        ram.read_brick_from_disk(&mut arena, BrickId(0), 2).unwrap();
        assert!(arena.get(BrickId(0)).has_lod_volume(2));
    }

    #[test]
    fn test_failed_read_leaves_accounting_untouched() {
        let (_dir, mut ram, mut arena) = make_session(10_000);
        // Level 4 does not exist for a size-8 brick; the reader rejects it
        // after the bytes were provisionally accounted.
        let err = ram
            .read_brick_from_disk(&mut arena, BrickId(0), 4)
            .unwrap_err();
        assert!(matches!(err, Error::Format(_)));
        assert_eq!(ram.used_bytes(), 0);
    }

    #[test]
    fn test_free_all_empties_cache() {
        let (_dir, mut ram, mut arena) = make_session(10_000);
        for i in 0..4 {
            ram.read_brick_from_disk(&mut arena, BrickId(i), 1).unwrap();
        }
        assert!(ram.used_bytes() > 0);
        ram.free_all(&mut arena);
        assert_eq!(ram.used_bytes(), 0);
        for i in 0..4 {
            assert!(!arena.get(BrickId(i)).has_lod_volume(1));
        }
    }
}
