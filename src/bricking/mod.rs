//! Out-of-core bricking of large volumes
//!
//! Partitions a volume into fixed-size cubic bricks stored at several
//! resolutions on disk, assigns each brick a runtime level of detail under
//! a hard memory budget, and packs the chosen payloads into a single
//! packed volume plus an index volume mapping brick coordinates to packed
//! positions.

pub mod info;
pub mod brick;
pub mod packing;
pub mod ram;
pub mod region;
pub mod resolution;
pub mod lod_selector;
pub mod creator;
pub mod assigner;
pub mod manager;

pub use info::{BrickingConfig, BrickingInformation, CalculatorPolicy, SelectorPolicy};
pub use brick::{BrickArena, BrickId, VolumeBrick};
pub use packing::{PackingSlot, PackingSlots, SlotId};
pub use ram::RamManager;
pub use region::{BrickingRegion, BrickingRegionManager};
pub use resolution::{
    BalancedBrickResolutionCalculator, BrickResolutionCalculator,
    MaximumBrickResolutionCalculator, StandardBrickResolutionCalculator,
};
pub use lod_selector::{BrickLodSelector, CameraLodSelector, ErrorLodSelector};
pub use creator::VolumeBrickCreator;
pub use assigner::PackingBrickAssigner;
pub use manager::{BrickedVolume, BrickingManager, EepDescriptor, IndexVolume};
