//! Bricked volume writer
//!
//! Serializes a volume into the `.bvi`/`.bv`/`.bpi` triple. Bricks are
//! written one at a time in creation order (x fastest, then y, then z over
//! the brick grid); the reader consumes its index with a cursor that
//! assumes exactly this order.
//!
//! Call sequence: `create`, then `write_brick` once per brick, then
//! `write_index` (the uniform-brick count in the header is only known once
//! every brick has been seen), then `close`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use glam::UVec3;

use crate::core::{Error, Result};
use crate::volume::{VolumeData, VoxelFormat};

use super::header::BviHeader;
use super::total_resolutions;

/// Streaming writer for the three-file bricked volume format
pub struct BrickedVolumeWriter {
    base: PathBuf,
    header: BviHeader,
    bv: BufWriter<File>,
    positions: Vec<u64>,
    uniform_flags: Vec<bool>,
    /// Per-LOD errors of every non-uniform brick, in creation order
    errors: Vec<Vec<f32>>,
    current_offset: u64,
    total_resolutions: u32,
    index_written: bool,
}

impl BrickedVolumeWriter {
    /// Create the output streams for a new bricked dataset
    ///
    /// `base` is the path without extension; the writer creates
    /// `<base>.bv` immediately and `<base>.bvi`/`<base>.bpi` in
    /// [`write_index`](Self::write_index). `dimensions` must already be
    /// rounded up to a multiple of `brick_size`.
    pub fn create(
        base: &Path,
        dimensions: UVec3,
        spacing: glam::Vec3,
        format: VoxelFormat,
        brick_size: u32,
        llf: glam::Vec3,
        urb: glam::Vec3,
    ) -> Result<Self> {
        if brick_size < 2 || !brick_size.is_power_of_two() {
            return Err(Error::Format(format!(
                "brick size must be a power of two >= 2, got {}",
                brick_size
            )));
        }
        if dimensions.min_element() == 0
            || dimensions.x % brick_size != 0
            || dimensions.y % brick_size != 0
            || dimensions.z % brick_size != 0
        {
            return Err(Error::Format(format!(
                "dimensions {} are not a positive multiple of brick size {}",
                dimensions, brick_size
            )));
        }

        let file_stem = base
            .file_name()
            .ok_or_else(|| Error::Format(format!("invalid output path: {}", base.display())))?
            .to_string_lossy()
            .into_owned();

        let header = BviHeader {
            object_file_name: format!("{}.bv", file_stem),
            dimensions,
            spacing,
            format,
            brick_size,
            llf,
            urb,
            num_uniform_bricks: 0,
        };

        let bv = BufWriter::new(File::create(base.with_extension("bv"))?);
        log::info!(
            "writing bricked volume {}: dimensions {}, brick size {}",
            base.display(),
            dimensions,
            brick_size
        );

        Ok(Self {
            base: base.to_path_buf(),
            header,
            bv,
            positions: Vec::new(),
            uniform_flags: Vec::new(),
            errors: Vec::new(),
            current_offset: 0,
            total_resolutions: total_resolutions(brick_size),
            index_written: false,
        })
    }

    /// Number of bricks written so far
    pub fn bricks_written(&self) -> usize {
        self.positions.len()
    }

    /// Append one brick's payload
    ///
    /// A uniform brick stores a single voxel. Any other brick stores its
    /// finest level followed by every successively downsampled level, and
    /// records the error of each level against the finest.
    pub fn write_brick(&mut self, brick: &VolumeData) -> Result<()> {
        debug_assert_eq!(brick.dimensions(), UVec3::splat(self.header.brick_size));
        debug_assert_eq!(brick.format(), self.header.format);

        self.positions.push(self.current_offset);

        if brick.all_voxels_equal() {
            let voxel = brick.voxel_bytes(0, 0, 0);
            self.bv.write_all(voxel)?;
            self.current_offset += voxel.len() as u64;
            self.uniform_flags.push(true);
            self.header.num_uniform_bricks += 1;
            return Ok(());
        }

        self.bv.write_all(brick.bytes())?;
        self.current_offset += brick.bytes().len() as u64;

        let mut errors = Vec::with_capacity(self.total_resolutions as usize);
        errors.push(0.0);

        let mut level = brick.clone();
        for _ in 1..self.total_resolutions {
            level = level.downsample();
            errors.push(level.calc_error(brick));
            self.bv.write_all(level.bytes())?;
            self.current_offset += level.bytes().len() as u64;
        }

        self.uniform_flags.push(false);
        self.errors.push(errors);
        Ok(())
    }

    /// Write the `.bpi` index and `.bvi` header
    ///
    /// Must be called after the last [`write_brick`](Self::write_brick):
    /// the index flushes the accumulated offsets, uniform flags and error
    /// tables, and the header's uniform-brick count depends on having seen
    /// every brick.
    pub fn write_index(&mut self) -> Result<()> {
        debug_assert!(!self.index_written, "index written twice");

        let mut bpi = BufWriter::new(File::create(self.base.with_extension("bpi"))?);
        for &position in &self.positions {
            bpi.write_all(&position.to_le_bytes())?;
        }
        for &uniform in &self.uniform_flags {
            bpi.write_all(if uniform { b"1" } else { b"0" })?;
        }
        for brick_errors in &self.errors {
            for &error in brick_errors {
                bpi.write_all(&error.to_le_bytes())?;
            }
        }
        bpi.flush()?;

        std::fs::write(self.base.with_extension("bvi"), self.header.serialize())?;

        log::info!(
            "wrote index for {} bricks ({} uniform)",
            self.positions.len(),
            self.header.num_uniform_bricks
        );
        self.index_written = true;
        Ok(())
    }

    /// Flush and close the payload stream
    pub fn close(mut self) -> Result<()> {
        self.bv.flush()?;
        Ok(())
    }
}

/// Brick a whole volume and write it out
///
/// Convenience over the streaming writer: pads the volume up to a
/// brick-size multiple, walks the brick grid in creation order and writes
/// every brick, index and header. Returns the written header.
pub fn write_bricked_volume(
    base: &Path,
    volume: &VolumeData,
    brick_size: u32,
) -> Result<BviHeader> {
    let dims = volume.dimensions();
    let rounded = UVec3::new(
        dims.x.div_ceil(brick_size) * brick_size,
        dims.y.div_ceil(brick_size) * brick_size,
        dims.z.div_ceil(brick_size) * brick_size,
    );

    let mut writer = BrickedVolumeWriter::create(
        base,
        rounded,
        volume.spacing(),
        volume.format(),
        brick_size,
        volume.world_llf(),
        volume.world_urb(),
    )?;

    let num_bricks = rounded / brick_size;
    for z in 0..num_bricks.z {
        for y in 0..num_bricks.y {
            for x in 0..num_bricks.x {
                let origin = UVec3::new(x, y, z) * brick_size;
                let brick = volume.extract_brick(origin, brick_size);
                writer.write_brick(&brick)?;
            }
        }
    }

    writer.write_index()?;
    let header = writer.header.clone();
    writer.close()?;
    Ok(header)
}
