//! End-to-end tests of the bricking pipeline against on-disk datasets

use glam::{UVec3, Vec3};

use brickvol::bricking::{
    BrickLodSelector, BrickingConfig, BrickingInformation, BrickingManager,
    BrickingRegionManager, CalculatorPolicy, CameraLodSelector, SelectorPolicy, VolumeBrick,
};
use brickvol::format::writer::write_bricked_volume;
use brickvol::format::BviHeader;
use brickvol::volume::{VolumeData, VoxelFormat};

/// Deterministic volume where no brick-sized region is uniform
fn make_gradient_volume(dimensions: u32) -> VolumeData {
    let dims = UVec3::splat(dimensions);
    let mut volume = VolumeData::new(dims, Vec3::ONE, VoxelFormat::UInt8);
    for z in 0..dims.z {
        for y in 0..dims.y {
            for x in 0..dims.x {
                volume.set_channel_value(x, y, z, 0, ((x * 5 + y * 11 + z * 23) % 251) as f64);
            }
        }
    }
    volume
}

fn write_dataset(
    volume: &VolumeData,
    brick_size: u32,
) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("pipeline");
    write_bricked_volume(&base, volume, brick_size).unwrap();
    (dir, base)
}

#[test]
fn full_pipeline_reconstructs_volume_at_finest_level() {
    // 64 bricks of size 8; a 1MB GPU budget clamps the packed volume to
    // the full 32^3, so the error selector can afford every brick at the
    // finest level and the packed volume becomes a permutation of the
    // original bricks.
    let volume = make_gradient_volume(32);
    let (_dir, base) = write_dataset(&volume, 8);

    let config = BrickingConfig {
        brick_size: 8,
        gpu_budget_mb: 1,
        ..Default::default()
    };
    let mut manager = BrickingManager::new(&base, config).unwrap();
    manager.create_bricked_volume().unwrap();

    let info = manager.information();
    assert_eq!(info.num_uniform_bricks, 0);
    assert_eq!(info.volume_bricks.len(), 64);

    let output = manager.bricked_volume();
    assert_eq!(output.packed_volume().dimensions(), UVec3::splat(32));
    assert_eq!(output.eep_descriptor().dimensions(), UVec3::splat(32));

    for bz in 0..4u32 {
        for by in 0..4u32 {
            for bx in 0..4u32 {
                let entry = output.index_volume().entry(UVec3::new(bx, by, bz));
                assert_eq!(entry[3], 1, "brick ({bx},{by},{bz}) not at finest level");
                let slot = UVec3::new(entry[0] as u32, entry[1] as u32, entry[2] as u32);
                for z in 0..8 {
                    for y in 0..8 {
                        for x in 0..8 {
                            let got = output.packed_volume().voxel_bytes(
                                slot.x + x,
                                slot.y + y,
                                slot.z + z,
                            );
                            let want =
                                volume.voxel_bytes(bx * 8 + x, by * 8 + y, bz * 8 + z);
                            assert_eq!(got, want);
                        }
                    }
                }
            }
        }
    }
}

#[test]
fn wholly_uniform_volume_retires_every_brick() {
    let dims = UVec3::splat(32);
    let mut volume = VolumeData::new(dims, Vec3::ONE, VoxelFormat::UInt8);
    for z in 0..dims.z {
        for y in 0..dims.y {
            for x in 0..dims.x {
                volume.set_channel_value(x, y, z, 0, 77.0);
            }
        }
    }
    let (_dir, base) = write_dataset(&volume, 16);

    let config = BrickingConfig {
        brick_size: 16,
        gpu_budget_mb: 1,
        ..Default::default()
    };
    let mut manager = BrickingManager::new(&base, config).unwrap();
    manager.create_bricked_volume().unwrap();

    let info = manager.information();
    assert_eq!(info.num_uniform_bricks, info.total_bricks);
    assert!(info.volume_bricks.is_empty());
    // One voxel per uniform brick is subtracted from the byte budget.
    let capacity = info.packed_dimensions.x as u64
        * info.packed_dimensions.y as u64
        * info.packed_dimensions.z as u64;
    assert_eq!(info.available_memory, capacity - info.total_bricks);

    let output = manager.bricked_volume();
    for bz in 0..2u32 {
        for by in 0..2u32 {
            for bx in 0..2u32 {
                let entry = output.index_volume().entry(UVec3::new(bx, by, bz));
                // Scale factor 2^4 for a size-16 brick shrunk to one voxel.
                assert_eq!(entry[3], 16);
                let value = output.packed_volume().voxel_bytes(
                    entry[0] as u32,
                    entry[1] as u32,
                    entry[2] as u32,
                );
                assert_eq!(value, &[77]);
            }
        }
    }
}

#[test]
fn camera_move_reports_changed_bricks() {
    let volume = make_gradient_volume(32);
    let (_dir, base) = write_dataset(&volume, 8);

    // One 8^3 packing slot holds 512 bytes: the Maximum calculator can
    // afford 7 bricks at level 1 (64 bytes each) with the other 57 at the
    // 1-byte coarsest level. The fine set tracks the camera, so moving it
    // to the opposite side must flip some assignments.
    let config = BrickingConfig {
        brick_size: 8,
        gpu_budget_mb: 1,
        max_texture_dimension: 8,
        calculator: CalculatorPolicy::Maximum,
        selector: SelectorPolicy::CameraBased,
        ..Default::default()
    };
    let mut manager = BrickingManager::new(&base, config).unwrap();
    manager.create_bricked_volume().unwrap();
    manager.set_update_bricks(true);

    let near_counts = lod_histogram(manager.information());
    assert_eq!(near_counts, vec![0, 7, 0, 57]);
    let changed = manager
        .camera_moved(Vec3::new(0.0, 0.0, -3.75))
        .unwrap()
        .expect("repack should run when updates are enabled");
    assert!(!changed.is_empty());
    for id in &changed {
        let brick = manager.information().bricks.get(*id);
        assert_ne!(brick.current_lod(), brick.old_lod());
    }

    // The budget distribution itself is camera independent.
    assert_eq!(lod_histogram(manager.information()), near_counts);
}

#[test]
fn repack_with_region_promotes_its_bricks() {
    let volume = make_gradient_volume(32);
    let (_dir, base) = write_dataset(&volume, 8);

    let config = BrickingConfig {
        brick_size: 8,
        gpu_budget_mb: 1,
        selector: SelectorPolicy::CameraBased,
        ..Default::default()
    };
    let mut manager = BrickingManager::new(&base, config).unwrap();
    manager.create_bricked_volume().unwrap();

    // A small box in the far corner outranks every near brick.
    manager.add_box_region(Vec3::splat(-1.0), Vec3::splat(-0.9), 100);
    manager.update_bricking().unwrap();

    let info = manager.information();
    let far_corner = info
        .volume_bricks
        .iter()
        .find(|id| info.bricks.get(**id).position() == UVec3::ZERO)
        .copied()
        .unwrap();
    assert_eq!(info.bricks.get(far_corner).current_lod(), 0);
}

#[test]
fn update_before_create_is_rejected() {
    let volume = make_gradient_volume(16);
    let (_dir, base) = write_dataset(&volume, 8);
    let mut manager = BrickingManager::new(
        &base,
        BrickingConfig {
            brick_size: 8,
            ..Default::default()
        },
    )
    .unwrap();
    assert!(manager.update_bricking().is_err());
}

/// The 256^3 / brick-32 camera scenario, driven at the component level:
/// with a budget of two finest-tier slots, exactly the two bricks nearest
/// the default camera end up at level 0 and the other 510 at the coarsest.
#[test]
fn camera_selector_two_finest_bricks_at_256() {
    let header = BviHeader {
        object_file_name: "scenario.bv".to_string(),
        dimensions: UVec3::splat(256),
        spacing: Vec3::ONE,
        format: VoxelFormat::UInt8,
        brick_size: 32,
        llf: Vec3::splat(-1.0),
        urb: Vec3::splat(1.0),
        num_uniform_bricks: 0,
    };
    let mut info = BrickingInformation::from_header(&header);
    let grid = info.num_bricks;
    for z in 0..grid.z {
        for y in 0..grid.y {
            for x in 0..grid.x {
                let t = UVec3::new(x, y, z).as_vec3() / grid.as_vec3();
                let llf = info.llf + (info.urb - info.llf) * t;
                let id = info
                    .bricks
                    .insert(VolumeBrick::new(UVec3::new(x, y, z), llf, 32));
                info.volume_bricks.push(id);
            }
        }
    }
    assert_eq!(info.volume_bricks.len(), 512);

    let mut resolutions = vec![0u64; info.total_resolutions as usize];
    resolutions[0] = 2;
    resolutions[info.coarsest_lod() as usize] = 510;
    info.brick_resolutions = resolutions;

    CameraLodSelector.select_lods(&mut info, &BrickingRegionManager::new());

    let mut finest: Vec<UVec3> = info
        .volume_bricks
        .iter()
        .filter(|id| info.bricks.get(**id).current_lod() == 0)
        .map(|id| info.bricks.get(*id).position())
        .collect();
    finest.sort_by_key(|p| (p.z, p.y, p.x));
    assert_eq!(finest.len(), 2);

    let coarse = info
        .volume_bricks
        .iter()
        .filter(|id| info.bricks.get(**id).current_lod() == info.coarsest_lod())
        .count();
    assert_eq!(coarse, 510);

    // The camera sits at +z in front of the volume; the two finest bricks
    // are the two distinct nearest corners on the front face closest to
    // the axis.
    let camera = info.camera_position;
    let max_finest_dist = finest
        .iter()
        .map(|p| {
            let brick = info
                .volume_bricks
                .iter()
                .find(|id| info.bricks.get(**id).position() == *p)
                .unwrap();
            info.bricks.get(*brick).llf().distance_squared(camera)
        })
        .fold(0.0f32, f32::max);
    for id in &info.volume_bricks {
        let brick = info.bricks.get(*id);
        if brick.current_lod() != 0 {
            assert!(brick.llf().distance_squared(camera) >= max_finest_dist);
        }
    }
}

fn lod_histogram(info: &BrickingInformation) -> Vec<u64> {
    let mut counts = vec![0u64; info.total_resolutions as usize];
    for id in &info.volume_bricks {
        counts[info.bricks.get(*id).current_lod() as usize] += 1;
    }
    counts
}
