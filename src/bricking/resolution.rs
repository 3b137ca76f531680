//! Resolution budget partitioning policies
//!
//! A calculator decides how many bricks may occupy each level-of-detail
//! tier so that the packed volume's byte budget is never exceeded. The
//! result is written into `BrickingInformation::brick_resolutions`,
//! indexed by level of detail with 0 the finest.

use log::info;

use super::info::BrickingInformation;

/// Strategy that writes the per-tier brick counts
pub trait BrickResolutionCalculator {
    fn calculate_brick_resolutions(&self, info: &mut BrickingInformation);
}

/// Largest brick count `k` such that `k` bricks at the fine tier plus the
/// rest at the coarse tier stay within the budget
fn max_affordable(n: u64, fine_bytes: u64, coarse_bytes: u64, budget: u64) -> u64 {
    debug_assert!(fine_bytes > coarse_bytes);
    if budget < n * coarse_bytes {
        return 0;
    }
    ((budget - n * coarse_bytes) / (fine_bytes - coarse_bytes)).min(n)
}

/// Every brick at the coarsest tier, the fallback when nothing finer fits
fn all_coarsest(info: &mut BrickingInformation) {
    let mut resolutions = vec![0u64; info.total_resolutions as usize];
    resolutions[info.coarsest_lod() as usize] = info.num_nonuniform_bricks();
    info.brick_resolutions = resolutions;
}

/// Maximize the brick count at the single finest affordable tier
///
/// Produces a bimodal distribution: as many bricks as the budget allows
/// at one fine tier, the remainder at the coarsest.
pub struct MaximumBrickResolutionCalculator;

impl BrickResolutionCalculator for MaximumBrickResolutionCalculator {
    fn calculate_brick_resolutions(&self, info: &mut BrickingInformation) {
        let n = info.num_nonuniform_bricks();
        let coarsest = info.coarsest_lod();
        let budget = info.available_memory;
        if n == 0 {
            info.brick_resolutions = vec![0u64; info.total_resolutions as usize];
            return;
        }

        let coarse_bytes = info.bytes_at_lod(coarsest);
        for fine in 0..coarsest {
            let fine_bytes = info.bytes_at_lod(fine);
            if fine_bytes + (n - 1) * coarse_bytes > budget {
                continue;
            }
            let count = max_affordable(n, fine_bytes, coarse_bytes, budget);
            let mut resolutions = vec![0u64; info.total_resolutions as usize];
            resolutions[fine as usize] = count;
            resolutions[coarsest as usize] = n - count;
            info.brick_resolutions = resolutions;
            info!(
                "resolution budget: {} bricks at LOD {}, {} at LOD {}",
                count,
                fine,
                n - count,
                coarsest
            );
            return;
        }
        all_coarsest(info);
    }
}

/// Spread bricks over two adjacent tiers
///
/// Trades peak quality for a flatter profile: the fine and coarse tier
/// are always one halving step apart.
pub struct BalancedBrickResolutionCalculator;

impl BrickResolutionCalculator for BalancedBrickResolutionCalculator {
    fn calculate_brick_resolutions(&self, info: &mut BrickingInformation) {
        let n = info.num_nonuniform_bricks();
        let budget = info.available_memory;
        if n == 0 {
            info.brick_resolutions = vec![0u64; info.total_resolutions as usize];
            return;
        }

        for fine in 0..info.coarsest_lod() {
            let fine_bytes = info.bytes_at_lod(fine);
            let coarse_bytes = info.bytes_at_lod(fine + 1);
            if fine_bytes + (n - 1) * coarse_bytes > budget {
                continue;
            }
            let count = max_affordable(n, fine_bytes, coarse_bytes, budget);
            let mut resolutions = vec![0u64; info.total_resolutions as usize];
            resolutions[fine as usize] = count;
            resolutions[(fine + 1) as usize] = n - count;
            info.brick_resolutions = resolutions;
            info!(
                "resolution budget: {} bricks at LOD {}, {} at LOD {}",
                count,
                fine,
                n - count,
                fine + 1
            );
            return;
        }
        all_coarsest(info);
    }
}

/// Fixed coarse tier with an incrementally simulated fine tier
///
/// The coarse tier is pinned at the level where a brick shrinks to 64
/// voxels. The finest affordable tier above it is found by simulating the
/// brick population moving over in sixteenth increments.
pub struct StandardBrickResolutionCalculator;

impl BrickResolutionCalculator for StandardBrickResolutionCalculator {
    fn calculate_brick_resolutions(&self, info: &mut BrickingInformation) {
        let n = info.num_nonuniform_bricks();
        let budget = info.available_memory;
        if n == 0 {
            info.brick_resolutions = vec![0u64; info.total_resolutions as usize];
            return;
        }

        // The level where one brick holds 4x4x4 voxels.
        let coarse = info.brick_size.ilog2().saturating_sub(2).min(info.coarsest_lod());
        let coarse_bytes = info.bytes_at_lod(coarse);
        if n * coarse_bytes > budget {
            all_coarsest(info);
            return;
        }

        let step = (n / 16).max(1);
        for fine in 0..coarse {
            let fine_bytes = info.bytes_at_lod(fine);
            if step * fine_bytes + (n - step) * coarse_bytes > budget {
                continue;
            }
            // Move whole increments over while they stay affordable.
            let mut count = step;
            while count + step <= n
                && (count + step) * fine_bytes + (n - count - step) * coarse_bytes <= budget
            {
                count += step;
            }
            let mut resolutions = vec![0u64; info.total_resolutions as usize];
            resolutions[fine as usize] = count;
            resolutions[coarse as usize] = n - count;
            info.brick_resolutions = resolutions;
            info!(
                "resolution budget: {} bricks at LOD {}, {} at LOD {}",
                count,
                fine,
                n - count,
                coarse
            );
            return;
        }

        let mut resolutions = vec![0u64; info.total_resolutions as usize];
        resolutions[coarse as usize] = n;
        info.brick_resolutions = resolutions;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::BviHeader;
    use crate::volume::VoxelFormat;
    use glam::{UVec3, Vec3};

    fn make_info(dimensions: u32, brick_size: u32, packed: u32) -> BrickingInformation {
        let header = BviHeader {
            object_file_name: "budget_test.bv".to_string(),
            dimensions: UVec3::splat(dimensions),
            spacing: Vec3::ONE,
            format: VoxelFormat::UInt8,
            brick_size,
            llf: Vec3::splat(-1.0),
            urb: Vec3::splat(1.0),
            num_uniform_bricks: 0,
        };
        let mut info = BrickingInformation::from_header(&header);
        info.packed_dimensions = UVec3::splat(packed);
        info.compute_available_memory();
        info
    }

    fn assert_budget_held(info: &BrickingInformation) {
        let total: u64 = info
            .brick_resolutions
            .iter()
            .enumerate()
            .map(|(lod, count)| count * info.bytes_at_lod(lod as u32))
            .sum();
        assert!(total <= info.available_memory);
        let bricks: u64 = info.brick_resolutions.iter().sum();
        assert_eq!(bricks, info.num_nonuniform_bricks());
    }

    #[test]
    fn test_maximum_is_bimodal_finest_and_coarsest() {
        // 512 bricks of 32, packed capacity 128^3 bytes.
        let mut info = make_info(256, 32, 128);
        MaximumBrickResolutionCalculator.calculate_brick_resolutions(&mut info);
        assert_budget_held(&info);

        let nonzero: Vec<usize> = info
            .brick_resolutions
            .iter()
            .enumerate()
            .filter(|(_, c)| **c > 0)
            .map(|(lod, _)| lod)
            .collect();
        assert!(nonzero.len() <= 2);
        if nonzero.len() == 2 {
            assert_eq!(nonzero[1], info.coarsest_lod() as usize);
        }
        // The capacity fits 64 full-resolution bricks, so the finest tier
        // must have landed at LOD 0 with close to that count.
        assert!(info.brick_resolutions[0] > 0);
    }

    #[test]
    fn test_balanced_uses_adjacent_tiers() {
        let mut info = make_info(256, 32, 128);
        BalancedBrickResolutionCalculator.calculate_brick_resolutions(&mut info);
        assert_budget_held(&info);

        let nonzero: Vec<usize> = info
            .brick_resolutions
            .iter()
            .enumerate()
            .filter(|(_, c)| **c > 0)
            .map(|(lod, _)| lod)
            .collect();
        assert!(nonzero.len() <= 2);
        if nonzero.len() == 2 {
            assert_eq!(nonzero[1] - nonzero[0], 1);
        }
    }

    #[test]
    fn test_standard_pins_coarse_tier() {
        let mut info = make_info(256, 32, 128);
        StandardBrickResolutionCalculator.calculate_brick_resolutions(&mut info);
        assert_budget_held(&info);

        // Coarse tier is the 4-voxel-edge level for a 32 brick.
        let coarse = 3usize;
        for (lod, count) in info.brick_resolutions.iter().enumerate() {
            if *count > 0 {
                assert!(lod <= coarse);
            }
        }
    }

    #[test]
    fn test_tight_budget_falls_back_to_coarsest() {
        // Packed capacity of 8^3 = 512 bytes for 512 bricks: exactly one
        // voxel per brick, every policy must retreat to the coarsest tier.
        let mut info = make_info(256, 32, 8);
        for calculator in [
            &MaximumBrickResolutionCalculator as &dyn BrickResolutionCalculator,
            &BalancedBrickResolutionCalculator,
            &StandardBrickResolutionCalculator,
        ] {
            calculator.calculate_brick_resolutions(&mut info);
            assert_budget_held(&info);
            assert_eq!(
                info.brick_resolutions[info.coarsest_lod() as usize],
                info.num_nonuniform_bricks()
            );
        }
    }

    #[test]
    fn test_uniform_bricks_shrink_the_budget() {
        let mut info = make_info(256, 32, 128);
        let full = info.available_memory;
        info.num_uniform_bricks = 100;
        info.compute_available_memory();
        assert_eq!(info.available_memory, full - 100);

        MaximumBrickResolutionCalculator.calculate_brick_resolutions(&mut info);
        assert_budget_held(&info);
    }

    #[test]
    fn test_no_nonuniform_bricks() {
        let mut info = make_info(256, 32, 128);
        info.num_uniform_bricks = info.total_bricks;
        info.compute_available_memory();
        MaximumBrickResolutionCalculator.calculate_brick_resolutions(&mut info);
        assert!(info.brick_resolutions.iter().all(|c| *c == 0));
    }
}
