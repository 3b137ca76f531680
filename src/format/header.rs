//! `.bvi` text header

use glam::{UVec3, Vec3};

use crate::core::{Error, Result};
use crate::volume::VoxelFormat;

/// Parsed contents of a `.bvi` header file
#[derive(Clone, Debug)]
pub struct BviHeader {
    /// File name of the `.bv` payload, relative to the header
    pub object_file_name: String,
    /// Volume dimensions, rounded up to a brick-size multiple
    pub dimensions: UVec3,
    /// Voxel spacing
    pub spacing: Vec3,
    /// Voxel format (sample type + object model)
    pub format: VoxelFormat,
    /// Cubic brick edge length
    pub brick_size: u32,
    /// World-space lower-left-front corner
    pub llf: Vec3,
    /// World-space upper-right-back corner
    pub urb: Vec3,
    /// Count of bricks whose voxels are all equal
    pub num_uniform_bricks: u64,
}

impl BviHeader {
    /// Bricks per axis (ceiling division of dimensions by brick size)
    pub fn num_bricks(&self) -> UVec3 {
        UVec3::new(
            self.dimensions.x.div_ceil(self.brick_size),
            self.dimensions.y.div_ceil(self.brick_size),
            self.dimensions.z.div_ceil(self.brick_size),
        )
    }

    /// Total brick count over all three axes
    pub fn total_bricks(&self) -> usize {
        let n = self.num_bricks();
        n.x as usize * n.y as usize * n.z as usize
    }

    /// Serialize to the text form stored on disk
    pub fn serialize(&self) -> String {
        format!(
            "ObjectFileName: {}\n\
             Resolution: {} {} {}\n\
             SliceThickness: {} {} {}\n\
             Format: {}\n\
             ObjectModel: {}\n\
             BitsStored: {}\n\
             BrickSize: {}\n\
             LLF: {} {} {}\n\
             URB: {} {} {}\n\
             EmptyBricks: {}\n",
            self.object_file_name,
            self.dimensions.x,
            self.dimensions.y,
            self.dimensions.z,
            self.spacing.x,
            self.spacing.y,
            self.spacing.z,
            self.format.sample_name(),
            self.format.object_model(),
            self.format.bits_allocated(),
            self.brick_size,
            self.llf.x,
            self.llf.y,
            self.llf.z,
            self.urb.x,
            self.urb.y,
            self.urb.z,
            self.num_uniform_bricks,
        )
    }

    /// Parse the text form, validating every required field
    pub fn parse(text: &str) -> Result<BviHeader> {
        let mut object_file_name = None;
        let mut dimensions = None;
        let mut spacing = Vec3::ONE;
        let mut sample = None;
        let mut object_model = "I".to_string();
        let mut brick_size = None;
        let mut llf = Vec3::splat(-1.0);
        let mut urb = Vec3::ONE;
        let mut num_uniform_bricks = 0u64;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| Error::Format(format!("malformed header line: {}", line)))?;
            let value = value.trim();
            match key.trim() {
                "ObjectFileName" => object_file_name = Some(value.to_string()),
                "Resolution" => dimensions = Some(parse_uvec3(value)?),
                "SliceThickness" => spacing = parse_vec3(value)?,
                "Format" => sample = Some(value.to_string()),
                "ObjectModel" => object_model = value.to_string(),
                "BitsStored" => {} // implied by Format/ObjectModel
                "BrickSize" => {
                    brick_size = Some(value.parse::<u32>().map_err(|_| {
                        Error::Format(format!("invalid brick size: {}", value))
                    })?)
                }
                "LLF" => llf = parse_vec3(value)?,
                "URB" => urb = parse_vec3(value)?,
                "EmptyBricks" => {
                    num_uniform_bricks = value.parse::<u64>().map_err(|_| {
                        Error::Format(format!("invalid uniform brick count: {}", value))
                    })?
                }
                other => {
                    return Err(Error::Format(format!("unknown header field: {}", other)));
                }
            }
        }

        let object_file_name = object_file_name
            .ok_or_else(|| Error::Format("header is missing ObjectFileName".into()))?;
        let dimensions =
            dimensions.ok_or_else(|| Error::Format("header is missing Resolution".into()))?;
        if dimensions.min_element() == 0 {
            return Err(Error::Format(format!(
                "invalid volume dimensions: {}",
                dimensions
            )));
        }
        let sample = sample.ok_or_else(|| Error::Format("header is missing Format".into()))?;
        let format = VoxelFormat::from_header(&sample, &object_model)?;
        let brick_size =
            brick_size.ok_or_else(|| Error::Format("header is missing BrickSize".into()))?;
        if brick_size < 2 || !brick_size.is_power_of_two() {
            return Err(Error::Format(format!(
                "brick size must be a power of two >= 2, got {}",
                brick_size
            )));
        }

        Ok(BviHeader {
            object_file_name,
            dimensions,
            spacing,
            format,
            brick_size,
            llf,
            urb,
            num_uniform_bricks,
        })
    }
}

fn parse_components(value: &str, expected: usize) -> Result<Vec<f32>> {
    let parts: Vec<f32> = value
        .split_whitespace()
        .map(|p| p.parse::<f32>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| Error::Format(format!("invalid vector: {}", value)))?;
    if parts.len() != expected {
        return Err(Error::Format(format!(
            "expected {} components, got {}: {}",
            expected,
            parts.len(),
            value
        )));
    }
    Ok(parts)
}

fn parse_vec3(value: &str) -> Result<Vec3> {
    let p = parse_components(value, 3)?;
    Ok(Vec3::new(p[0], p[1], p[2]))
}

fn parse_uvec3(value: &str) -> Result<UVec3> {
    let p = parse_components(value, 3)?;
    if p.iter().any(|&v| v < 0.0 || v.fract() != 0.0) {
        return Err(Error::Format(format!("invalid dimensions: {}", value)));
    }
    Ok(UVec3::new(p[0] as u32, p[1] as u32, p[2] as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_header() -> BviHeader {
        BviHeader {
            object_file_name: "test.bv".to_string(),
            dimensions: UVec3::splat(256),
            spacing: Vec3::ONE,
            format: VoxelFormat::UInt8,
            brick_size: 32,
            llf: Vec3::splat(-1.0),
            urb: Vec3::ONE,
            num_uniform_bricks: 12,
        }
    }

    #[test]
    fn test_header_roundtrip() {
        let header = make_header();
        let parsed = BviHeader::parse(&header.serialize()).unwrap();
        assert_eq!(parsed.object_file_name, header.object_file_name);
        assert_eq!(parsed.dimensions, header.dimensions);
        assert_eq!(parsed.format, header.format);
        assert_eq!(parsed.brick_size, header.brick_size);
        assert_eq!(parsed.num_uniform_bricks, header.num_uniform_bricks);
    }

    #[test]
    fn test_num_bricks_ceiling_division() {
        let mut header = make_header();
        header.dimensions = UVec3::new(256, 250, 33);
        assert_eq!(header.num_bricks(), UVec3::new(8, 8, 2));
        assert_eq!(header.total_bricks(), 8 * 8 * 2);
    }

    #[test]
    fn test_missing_fields_rejected() {
        assert!(BviHeader::parse("Resolution: 8 8 8\n").is_err());
        assert!(BviHeader::parse("ObjectFileName: a.bv\nFormat: UCHAR\n").is_err());
        let no_brick_size = "ObjectFileName: a.bv\nResolution: 8 8 8\nFormat: UCHAR\n";
        assert!(BviHeader::parse(no_brick_size).is_err());
    }

    #[test]
    fn test_invalid_dimensions_rejected() {
        let text = "ObjectFileName: a.bv\nResolution: 0 8 8\nFormat: UCHAR\nBrickSize: 4\n";
        assert!(BviHeader::parse(text).is_err());
    }

    #[test]
    fn test_invalid_brick_size_rejected() {
        let text = "ObjectFileName: a.bv\nResolution: 8 8 8\nFormat: UCHAR\nBrickSize: 3\n";
        assert!(BviHeader::parse(text).is_err());
        let text = "ObjectFileName: a.bv\nResolution: 8 8 8\nFormat: UCHAR\nBrickSize: 1\n";
        assert!(BviHeader::parse(text).is_err());
    }
}
