//! Priority regions steering the level-of-detail selection
//!
//! A region is a set of bricks with an integer priority. The camera-based
//! selector services regions from highest to lowest priority; bricks
//! belonging to no region form a synthetic lowest-priority remainder.

use std::collections::HashSet;

use glam::Vec3;

use super::brick::BrickId;
use super::info::BrickingInformation;

/// Set of bricks sharing a selection priority
#[derive(Clone, Debug)]
pub struct BrickingRegion {
    bricks: Vec<BrickId>,
    priority: i32,
}

impl BrickingRegion {
    pub fn new(bricks: Vec<BrickId>, priority: i32) -> Self {
        Self { bricks, priority }
    }

    /// Collect the non-uniform bricks whose world extent overlaps an
    /// axis-aligned box
    pub fn from_box(
        info: &BrickingInformation,
        box_llf: Vec3,
        box_urb: Vec3,
        priority: i32,
    ) -> Self {
        let grid = info.num_bricks.as_vec3();
        let brick_extent = (info.urb - info.llf) / grid;
        let bricks = info
            .volume_bricks
            .iter()
            .copied()
            .filter(|id| {
                let llf = info.bricks.get(*id).llf();
                let urb = llf + brick_extent;
                llf.x < box_urb.x
                    && urb.x > box_llf.x
                    && llf.y < box_urb.y
                    && urb.y > box_llf.y
                    && llf.z < box_urb.z
                    && urb.z > box_llf.z
            })
            .collect();
        Self { bricks, priority }
    }

    pub fn bricks(&self) -> &[BrickId] {
        &self.bricks
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }
}

/// Ordered collection of regions, highest priority first
#[derive(Debug, Default)]
pub struct BrickingRegionManager {
    regions: Vec<BrickingRegion>,
}

impl BrickingRegionManager {
    pub fn new() -> Self {
        Self {
            regions: Vec::new(),
        }
    }

    /// Insert a region, keeping descending priority order
    ///
    /// Regions of equal priority stay in registration order, so the first
    /// registered one is serviced first.
    pub fn add_region(&mut self, region: BrickingRegion) {
        let index = self
            .regions
            .iter()
            .position(|r| r.priority() < region.priority())
            .unwrap_or(self.regions.len());
        self.regions.insert(index, region);
    }

    pub fn regions(&self) -> &[BrickingRegion] {
        &self.regions
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Bricks not claimed by any region, in session creation order
    pub fn bricks_without_region(&self, info: &BrickingInformation) -> Vec<BrickId> {
        let claimed: HashSet<BrickId> = self
            .regions
            .iter()
            .flat_map(|r| r.bricks().iter().copied())
            .collect();
        info.volume_bricks
            .iter()
            .copied()
            .filter(|id| !claimed.contains(id))
            .collect()
    }
}
