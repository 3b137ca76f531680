//! Level-of-detail assignment strategies
//!
//! A selector mutates the target level of detail of every non-uniform
//! brick. The camera selector spends the per-tier counts computed by a
//! resolution calculator on the bricks nearest the camera; the error
//! selector ignores the tier counts and greedily spends the raw byte
//! budget on the upgrades with the best error reduction per byte.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};

use log::{info, warn};

use super::brick::BrickId;
use super::info::BrickingInformation;
use super::region::BrickingRegionManager;

/// Strategy that assigns a level of detail to every non-uniform brick
pub trait BrickLodSelector {
    fn select_lods(&self, info: &mut BrickingInformation, regions: &BrickingRegionManager);
}

/// Nearest bricks to the camera get the finest budgeted tiers
///
/// Regions are serviced highest priority first; within a region bricks
/// are ordered by squared distance from their world corner to the camera,
/// equidistant bricks grouped together. Tier counts are hard caps, so a
/// distance group may straddle two tiers when a count runs out inside it.
/// A brick claimed by a higher-priority region is never assigned again.
pub struct CameraLodSelector;

impl BrickLodSelector for CameraLodSelector {
    fn select_lods(&self, info: &mut BrickingInformation, regions: &BrickingRegionManager) {
        let mut remaining = info.brick_resolutions.clone();
        let coarsest = info.coarsest_lod();
        let camera = info.camera_position;

        let mut unassigned: HashSet<BrickId> = info.volume_bricks.iter().copied().collect();
        let mut passes: Vec<Vec<BrickId>> = regions
            .regions()
            .iter()
            .map(|r| r.bricks().to_vec())
            .collect();
        passes.push(regions.bricks_without_region(info));

        let mut tier = 0u32;
        for pass in passes {
            // Group by squared distance; the bit pattern of a non-negative
            // float orders the same way the float does.
            let mut by_distance: BTreeMap<u32, Vec<BrickId>> = BTreeMap::new();
            for id in pass {
                if !unassigned.contains(&id) {
                    continue;
                }
                let dist = info.bricks.get(id).llf().distance_squared(camera);
                by_distance.entry(dist.to_bits()).or_default().push(id);
            }

            for group in by_distance.values() {
                for id in group {
                    if !unassigned.remove(id) {
                        continue;
                    }
                    while tier < coarsest && remaining[tier as usize] == 0 {
                        tier += 1;
                    }
                    if remaining[tier as usize] == 0 {
                        warn!("resolution budget exhausted, brick forced to coarsest tier");
                        info.bricks.get_mut(*id).set_current_lod(coarsest);
                        continue;
                    }
                    remaining[tier as usize] -= 1;
                    info.bricks.get_mut(*id).set_current_lod(tier);
                }
            }
        }
    }
}

/// One pending upgrade of a brick to a finer level
struct Improvement {
    /// Error reduction per extra byte, the heap key
    ratio: f32,
    id: BrickId,
    lod: u32,
    extra_bytes: u64,
}

impl PartialEq for Improvement {
    fn eq(&self, other: &Self) -> bool {
        self.ratio == other.ratio
    }
}

impl Eq for Improvement {}

impl PartialOrd for Improvement {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Improvement {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ratio.total_cmp(&other.ratio)
    }
}

/// Greedy error-reduction knapsack against the byte budget
///
/// Starts every brick at the coarsest level and repeatedly applies the
/// pending upgrade with the best error reduction per byte, skipping
/// upgrades the remaining budget cannot pay for. Tier counts from the
/// resolution calculator are ignored; the per-level errors recorded at
/// write time drive the choice directly.
pub struct ErrorLodSelector;

impl ErrorLodSelector {
    /// Best single upgrade from `from_lod`, if any improves the error
    fn best_improvement(
        info: &BrickingInformation,
        id: BrickId,
        from_lod: u32,
    ) -> Option<Improvement> {
        let brick = info.bricks.get(id);
        let current_error = brick.error(from_lod)?;
        let current_bytes = info.bytes_at_lod(from_lod);

        let mut best: Option<Improvement> = None;
        for lod in 0..from_lod {
            let Some(error) = brick.error(lod) else {
                continue;
            };
            let reduction = current_error - error;
            if reduction <= 0.0 {
                continue;
            }
            let extra_bytes = info.bytes_at_lod(lod) - current_bytes;
            let ratio = reduction / extra_bytes as f32;
            if best.as_ref().map_or(true, |b| ratio > b.ratio) {
                best = Some(Improvement {
                    ratio,
                    id,
                    lod,
                    extra_bytes,
                });
            }
        }
        best
    }
}

impl BrickLodSelector for ErrorLodSelector {
    fn select_lods(&self, info: &mut BrickingInformation, _regions: &BrickingRegionManager) {
        let coarsest = info.coarsest_lod();
        let mut used = info.num_nonuniform_bricks() * info.bytes_at_lod(coarsest);
        let budget = info.available_memory;

        // Work on local levels so dirty tracking sees one old-vs-new
        // transition per selection, not the intermediate coarsest start.
        let ids: Vec<BrickId> = info.volume_bricks.clone();
        let mut chosen: HashMap<BrickId, u32> =
            ids.iter().map(|id| (*id, coarsest)).collect();

        let mut heap = BinaryHeap::new();
        for id in &ids {
            if let Some(improvement) = Self::best_improvement(info, *id, coarsest) {
                heap.push(improvement);
            }
        }

        let mut upgrades = 0u64;
        while let Some(improvement) = heap.pop() {
            if used + improvement.extra_bytes > budget {
                // Unaffordable, drop it for good.
                continue;
            }
            used += improvement.extra_bytes;
            upgrades += 1;
            chosen.insert(improvement.id, improvement.lod);
            if let Some(next) = Self::best_improvement(info, improvement.id, improvement.lod) {
                heap.push(next);
            }
        }

        for id in &ids {
            let lod = chosen[id];
            info.bricks.get_mut(*id).set_current_lod(lod);
        }
        info!(
            "error selector applied {} upgrades, {} of {} budget bytes used",
            upgrades, used, budget
        );
    }
}
