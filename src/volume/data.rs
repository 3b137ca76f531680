//! Raw volume storage with downsampling and error computation
//!
//! `VolumeData` stores voxels row-major (x fastest, then y, then z) as an
//! opaque byte buffer. The only operations that interpret the bytes are
//! `downsample` and `calc_error`, which go through per-channel accessors
//! matched on the voxel format.

use glam::{UVec3, Vec3};

use super::voxel_format::VoxelFormat;

/// A dense 3D voxel volume
#[derive(Clone, Debug)]
pub struct VolumeData {
    dimensions: UVec3,
    spacing: Vec3,
    format: VoxelFormat,
    data: Vec<u8>,
}

impl VolumeData {
    /// Create a zero-filled volume
    pub fn new(dimensions: UVec3, spacing: Vec3, format: VoxelFormat) -> Self {
        let num_bytes =
            dimensions.x as usize * dimensions.y as usize * dimensions.z as usize
                * format.bytes_per_voxel();
        Self {
            dimensions,
            spacing,
            format,
            data: vec![0u8; num_bytes],
        }
    }

    /// Wrap an existing voxel buffer
    ///
    /// # Panics
    /// Panics if the buffer length does not match the dimensions and format.
    pub fn from_bytes(dimensions: UVec3, spacing: Vec3, format: VoxelFormat, data: Vec<u8>) -> Self {
        let expected = dimensions.x as usize * dimensions.y as usize * dimensions.z as usize
            * format.bytes_per_voxel();
        assert_eq!(data.len(), expected, "voxel buffer size mismatch");
        Self {
            dimensions,
            spacing,
            format,
            data,
        }
    }

    pub fn dimensions(&self) -> UVec3 {
        self.dimensions
    }

    pub fn spacing(&self) -> Vec3 {
        self.spacing
    }

    pub fn format(&self) -> VoxelFormat {
        self.format
    }

    pub fn num_voxels(&self) -> usize {
        self.dimensions.x as usize * self.dimensions.y as usize * self.dimensions.z as usize
    }

    /// Raw voxel bytes, row-major
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// World-space lower-left-front corner
    ///
    /// The volume is centered on the origin and scaled so its longest edge
    /// spans [-1, 1], matching the convention renderers expect for
    /// entry/exit point computation.
    pub fn world_llf(&self) -> Vec3 {
        -self.cube_size() * 0.5
    }

    /// World-space upper-right-back corner
    pub fn world_urb(&self) -> Vec3 {
        self.cube_size() * 0.5
    }

    fn cube_size(&self) -> Vec3 {
        let size = self.dimensions.as_vec3() * self.spacing;
        size * (2.0 / size.max_element())
    }

    fn voxel_index(&self, x: u32, y: u32, z: u32) -> usize {
        debug_assert!(x < self.dimensions.x && y < self.dimensions.y && z < self.dimensions.z);
        ((z as usize * self.dimensions.y as usize + y as usize) * self.dimensions.x as usize
            + x as usize)
            * self.format.bytes_per_voxel()
    }

    /// Raw bytes of a single voxel
    pub fn voxel_bytes(&self, x: u32, y: u32, z: u32) -> &[u8] {
        let idx = self.voxel_index(x, y, z);
        &self.data[idx..idx + self.format.bytes_per_voxel()]
    }

    /// Overwrite a single voxel
    pub fn set_voxel_bytes(&mut self, x: u32, y: u32, z: u32, bytes: &[u8]) {
        let idx = self.voxel_index(x, y, z);
        self.data[idx..idx + self.format.bytes_per_voxel()].copy_from_slice(bytes);
    }

    /// Value of one channel of one voxel, as f64
    pub fn channel_value(&self, x: u32, y: u32, z: u32, channel: usize) -> f64 {
        let idx = self.voxel_index(x, y, z) + channel * self.format.bytes_per_channel();
        match self.format {
            VoxelFormat::UInt8 | VoxelFormat::Rgb8 | VoxelFormat::Rgba8 => self.data[idx] as f64,
            VoxelFormat::UInt16 => {
                u16::from_le_bytes([self.data[idx], self.data[idx + 1]]) as f64
            }
            VoxelFormat::Float32 => f32::from_le_bytes([
                self.data[idx],
                self.data[idx + 1],
                self.data[idx + 2],
                self.data[idx + 3],
            ]) as f64,
        }
    }

    /// Store a channel value, rounding and clamping to the storage type
    pub fn set_channel_value(&mut self, x: u32, y: u32, z: u32, channel: usize, value: f64) {
        let idx = self.voxel_index(x, y, z) + channel * self.format.bytes_per_channel();
        match self.format {
            VoxelFormat::UInt8 | VoxelFormat::Rgb8 | VoxelFormat::Rgba8 => {
                self.data[idx] = value.round().clamp(0.0, u8::MAX as f64) as u8;
            }
            VoxelFormat::UInt16 => {
                let v = value.round().clamp(0.0, u16::MAX as f64) as u16;
                self.data[idx..idx + 2].copy_from_slice(&v.to_le_bytes());
            }
            VoxelFormat::Float32 => {
                self.data[idx..idx + 4].copy_from_slice(&(value as f32).to_le_bytes());
            }
        }
    }

    /// Maximum representable channel value, used to normalize errors
    fn normalization(&self) -> f64 {
        match self.format {
            VoxelFormat::UInt8 | VoxelFormat::Rgb8 | VoxelFormat::Rgba8 => u8::MAX as f64,
            VoxelFormat::UInt16 => u16::MAX as f64,
            VoxelFormat::Float32 => 1.0,
        }
    }

    /// True if every voxel carries the same byte pattern
    pub fn all_voxels_equal(&self) -> bool {
        let bpv = self.format.bytes_per_voxel();
        if self.data.len() <= bpv {
            return true;
        }
        let first = &self.data[..bpv];
        self.data.chunks_exact(bpv).all(|v| v == first)
    }

    /// Box-filter downsample, halving each dimension (minimum 1)
    pub fn downsample(&self) -> VolumeData {
        let out_dims = UVec3::new(
            (self.dimensions.x / 2).max(1),
            (self.dimensions.y / 2).max(1),
            (self.dimensions.z / 2).max(1),
        );
        let mut out = VolumeData::new(out_dims, self.spacing * 2.0, self.format);
        let channels = self.format.channels();

        for z in 0..out_dims.z {
            for y in 0..out_dims.y {
                for x in 0..out_dims.x {
                    for c in 0..channels {
                        let mut sum = 0.0;
                        let mut count = 0u32;
                        for dz in 0..2 {
                            for dy in 0..2 {
                                for dx in 0..2 {
                                    let sx = x * 2 + dx;
                                    let sy = y * 2 + dy;
                                    let sz = z * 2 + dz;
                                    if sx < self.dimensions.x
                                        && sy < self.dimensions.y
                                        && sz < self.dimensions.z
                                    {
                                        sum += self.channel_value(sx, sy, sz, c);
                                        count += 1;
                                    }
                                }
                            }
                        }
                        out.set_channel_value(x, y, z, c, sum / count as f64);
                    }
                }
            }
        }
        out
    }

    /// RMS error of this (coarser) volume against a finer reference
    ///
    /// Every reference voxel is compared with the nearest voxel of this
    /// volume; the result is normalized to the storage range so errors of
    /// different formats are comparable.
    pub fn calc_error(&self, reference: &VolumeData) -> f32 {
        debug_assert_eq!(self.format, reference.format);
        let channels = self.format.channels();
        let norm = self.normalization();
        let rd = reference.dimensions;
        let mut sum_sq = 0.0f64;
        let mut samples = 0u64;

        for z in 0..rd.z {
            for y in 0..rd.y {
                for x in 0..rd.x {
                    let cx = (x * self.dimensions.x / rd.x).min(self.dimensions.x - 1);
                    let cy = (y * self.dimensions.y / rd.y).min(self.dimensions.y - 1);
                    let cz = (z * self.dimensions.z / rd.z).min(self.dimensions.z - 1);
                    for c in 0..channels {
                        let diff = (reference.channel_value(x, y, z, c)
                            - self.channel_value(cx, cy, cz, c))
                            / norm;
                        sum_sq += diff * diff;
                        samples += 1;
                    }
                }
            }
        }

        (sum_sq / samples as f64).sqrt() as f32
    }

    /// Copy out a cubic brick starting at the given voxel origin
    ///
    /// Regions outside the volume (bricks at a rounded-up border) are
    /// zero-filled.
    pub fn extract_brick(&self, origin: UVec3, size: u32) -> VolumeData {
        let mut brick = VolumeData::new(UVec3::splat(size), self.spacing, self.format);
        for z in 0..size {
            for y in 0..size {
                for x in 0..size {
                    let sx = origin.x + x;
                    let sy = origin.y + y;
                    let sz = origin.z + z;
                    if sx < self.dimensions.x && sy < self.dimensions.y && sz < self.dimensions.z {
                        let src = self.voxel_bytes(sx, sy, sz).to_vec();
                        brick.set_voxel_bytes(x, y, z, &src);
                    }
                }
            }
        }
        brick
    }
}
