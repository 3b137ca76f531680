//! Streaming creation of volume bricks from the on-disk index
//!
//! The creator walks the brick grid in the exact order bricks were
//! written (x fastest, then y, then z) and consumes one index entry per
//! brick from the reader's cursor. It is a single-pass iterator; there is
//! no way to rewind it, which is what keeps the reader's ordering
//! contract intact.

use glam::UVec3;

use super::brick::{BrickId, VolumeBrick};
use super::info::BrickingInformation;
use super::ram::RamManager;
use crate::core::Result;

/// Single-pass brick factory over the brick grid
pub struct VolumeBrickCreator {
    cursor: UVec3,
    num_bricks: UVec3,
    exhausted: bool,
}

impl VolumeBrickCreator {
    pub fn new(info: &BrickingInformation) -> Self {
        Self {
            cursor: UVec3::ZERO,
            num_bricks: info.num_bricks,
            exhausted: info.num_bricks.element_product() == 0,
        }
    }

    /// Create the brick at the cursor and advance
    ///
    /// Populates the world corner, the payload file offset, the uniform
    /// flag and the per-level errors from the next index entry. Returns
    /// `None` once every grid position has been visited.
    pub fn create_next_brick(
        &mut self,
        info: &mut BrickingInformation,
        ram: &mut RamManager,
    ) -> Result<Option<BrickId>> {
        if self.exhausted {
            return Ok(None);
        }

        let position = self.cursor;
        let t = position.as_vec3() / self.num_bricks.as_vec3();
        let llf = info.llf + (info.urb - info.llf) * t;

        let entry = ram.reader_mut().read_brick_position()?;
        let mut brick = VolumeBrick::new(position, llf, info.brick_size);
        brick.set_bv_file_position(entry.bv_position);
        brick.set_all_voxels_equal(entry.all_voxels_equal);
        brick.set_errors(entry.errors);

        self.advance();
        Ok(Some(info.bricks.insert(brick)))
    }

    fn advance(&mut self) {
        self.cursor.x += 1;
        if self.cursor.x == self.num_bricks.x {
            self.cursor.x = 0;
            self.cursor.y += 1;
            if self.cursor.y == self.num_bricks.y {
                self.cursor.y = 0;
                self.cursor.z += 1;
                if self.cursor.z == self.num_bricks.z {
                    self.exhausted = true;
                }
            }
        }
    }
}
