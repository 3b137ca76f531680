//! Inspect a bricked volume dataset on disk.
//!
//! Usage: cargo run --release --bin bvinfo -- path/to/dataset
//!
//! Takes the base path without extension and prints the header, the
//! uniform/non-uniform split, and the error range at the coarsest level.

use std::path::PathBuf;

use brickvol::format::{total_resolutions, BrickedVolumeReader};

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    let base: PathBuf = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .expect("Usage: bvinfo <base path without extension>");

    let mut reader = BrickedVolumeReader::open(&base).expect("Failed to open bricked volume");
    let header = reader.header().clone();
    let num_bricks = header.num_bricks();

    log::info!(
        "{}: {}x{}x{} voxels, {} ({} bytes/voxel)",
        base.display(),
        header.dimensions.x,
        header.dimensions.y,
        header.dimensions.z,
        header.format.sample_name(),
        header.format.bytes_per_voxel()
    );
    log::info!(
        "brick size {} ({} resolution levels), grid {}x{}x{}",
        header.brick_size,
        total_resolutions(header.brick_size),
        num_bricks.x,
        num_bricks.y,
        num_bricks.z
    );
    log::info!(
        "spacing {:?}, bounds {:?} .. {:?}",
        header.spacing,
        header.llf,
        header.urb
    );

    let total = header.total_bricks();
    let mut uniform = 0u64;
    let mut coarse_error_min = f32::INFINITY;
    let mut coarse_error_max = f32::NEG_INFINITY;
    for _ in 0..total {
        let entry = reader
            .read_brick_position()
            .expect("Failed to read brick index entry");
        if entry.all_voxels_equal {
            uniform += 1;
        } else if let Some(&err) = entry.errors.last() {
            // The finest level's error is zero by definition, so the
            // coarsest level is the informative end of the table.
            coarse_error_min = coarse_error_min.min(err);
            coarse_error_max = coarse_error_max.max(err);
        }
    }

    if uniform != header.num_uniform_bricks {
        log::warn!(
            "index lists {} uniform bricks, header says {}",
            uniform,
            header.num_uniform_bricks
        );
    }

    log::info!(
        "{} bricks total, {} uniform ({:.1}%)",
        total,
        uniform,
        100.0 * uniform as f64 / total.max(1) as f64
    );
    if uniform as usize != total {
        log::info!(
            "coarsest-level error range {:.4} .. {:.4}",
            coarse_error_min,
            coarse_error_max
        );
    }
}
