//! Bricked volume reader
//!
//! Opens the `.bvi`/`.bpi`/`.bv` triple and serves random seek+read access
//! to any brick at any level of detail. The whole `.bpi` index is loaded
//! eagerly at open time: it is tiny next to the payload and every brick
//! needs its entry anyway.
//!
//! Index entries are handed out by [`read_brick_position`]
//! (`BrickedVolumeReader::read_brick_position`) in strict creation order
//! through an internal cursor. There is no re-seek API: consuming entries
//! out of order would silently mismatch offsets and bricks, so the cursor
//! is the only way through.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use glam::UVec3;

use crate::core::{Error, Result};

use super::header::BviHeader;
use super::{total_resolutions, voxels_at_lod};

/// One brick's entry in the `.bpi` index
#[derive(Clone, Debug)]
pub struct BrickIndexEntry {
    /// Byte offset of the brick's payload in the `.bv` file
    pub bv_position: u64,
    /// True if the brick stores a single voxel
    pub all_voxels_equal: bool,
    /// Per-LOD error against the finest level; empty for uniform bricks
    pub errors: Vec<f32>,
}

/// Reader with random access to bricks of an on-disk bricked volume
pub struct BrickedVolumeReader {
    header: BviHeader,
    bv: File,
    positions: Vec<u64>,
    uniform_flags: Vec<bool>,
    /// Error tables of non-uniform bricks, in creation order
    errors: Vec<Vec<f32>>,
    total_resolutions: u32,
    current_brick: usize,
    current_nonuniform: usize,
}

impl BrickedVolumeReader {
    /// Open a bricked dataset
    ///
    /// `base` is the path without extension. Parses the header, validates
    /// it, and bulk-loads the entire index.
    pub fn open(base: &Path) -> Result<Self> {
        let header_text = std::fs::read_to_string(base.with_extension("bvi"))?;
        let header = BviHeader::parse(&header_text)?;

        let payload_path = sibling_path(base, &header.object_file_name);
        let bv = File::open(&payload_path)?;

        let total_bricks = header.total_bricks();
        let resolutions = total_resolutions(header.brick_size);

        let mut bpi = File::open(base.with_extension("bpi"))?;
        let mut positions = Vec::with_capacity(total_bricks);
        let mut buf8 = [0u8; 8];
        for _ in 0..total_bricks {
            bpi.read_exact(&mut buf8)?;
            positions.push(u64::from_le_bytes(buf8));
        }

        let mut flag_bytes = vec![0u8; total_bricks];
        bpi.read_exact(&mut flag_bytes)?;
        let uniform_flags: Vec<bool> = flag_bytes.iter().map(|&b| b == b'1').collect();

        let num_uniform = uniform_flags.iter().filter(|&&u| u).count() as u64;
        if num_uniform != header.num_uniform_bricks {
            return Err(Error::Format(format!(
                "index lists {} uniform bricks, header says {}",
                num_uniform, header.num_uniform_bricks
            )));
        }

        let num_nonuniform = total_bricks - num_uniform as usize;
        let mut errors = Vec::with_capacity(num_nonuniform);
        let mut buf4 = [0u8; 4];
        for _ in 0..num_nonuniform {
            let mut brick_errors = Vec::with_capacity(resolutions as usize);
            for _ in 0..resolutions {
                bpi.read_exact(&mut buf4)?;
                brick_errors.push(f32::from_le_bytes(buf4));
            }
            errors.push(brick_errors);
        }

        log::info!(
            "opened bricked volume {}: {} bricks ({} uniform), {} resolutions",
            base.display(),
            total_bricks,
            num_uniform,
            resolutions
        );

        Ok(Self {
            header,
            bv,
            positions,
            uniform_flags,
            errors,
            total_resolutions: resolutions,
            current_brick: 0,
            current_nonuniform: 0,
        })
    }

    pub fn header(&self) -> &BviHeader {
        &self.header
    }

    /// Bricks per axis
    pub fn num_bricks(&self) -> UVec3 {
        self.header.num_bricks()
    }

    /// Number of resolution levels per brick
    pub fn total_resolutions(&self) -> u32 {
        self.total_resolutions
    }

    /// Consume the next brick's index entry, in creation order
    ///
    /// Must be called exactly once per brick, in the order the bricks were
    /// written.
    pub fn read_brick_position(&mut self) -> Result<BrickIndexEntry> {
        if self.current_brick >= self.positions.len() {
            return Err(Error::Format(
                "brick index exhausted: more bricks requested than were written".into(),
            ));
        }

        let bv_position = self.positions[self.current_brick];
        let all_voxels_equal = self.uniform_flags[self.current_brick];
        self.current_brick += 1;

        let errors = if all_voxels_equal {
            Vec::new()
        } else {
            let e = self.errors[self.current_nonuniform].clone();
            self.current_nonuniform += 1;
            e
        };

        Ok(BrickIndexEntry {
            bv_position,
            all_voxels_equal,
            errors,
        })
    }

    /// Read one brick's payload at a given level of detail
    ///
    /// `num_bytes` is the payload size of the requested level. A uniform
    /// brick stores a single voxel whatever level is asked for, so no LOD
    /// skip is applied to its offset. Levels outside
    /// `[0, total_resolutions)` are rejected rather than clamped: a
    /// clamped request would read a silently wrong offset.
    pub fn read_brick(
        &mut self,
        bv_position: u64,
        all_voxels_equal: bool,
        lod: u32,
        num_bytes: usize,
    ) -> Result<Vec<u8>> {
        if lod >= self.total_resolutions {
            return Err(Error::Format(format!(
                "level of detail {} out of range (volume has {} levels)",
                lod, self.total_resolutions
            )));
        }

        let bytes_per_voxel = self.header.format.bytes_per_voxel() as u64;
        let mut offset = bv_position;
        if !all_voxels_equal {
            for level in 0..lod {
                offset += voxels_at_lod(self.header.brick_size, level) as u64 * bytes_per_voxel;
            }
        }

        self.bv.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; num_bytes];
        self.bv.read_exact(&mut buffer)?;
        Ok(buffer)
    }
}

fn sibling_path(base: &Path, file_name: &str) -> PathBuf {
    match base.parent() {
        Some(dir) => dir.join(file_name),
        None => PathBuf::from(file_name),
    }
}
