//! Brickvol - out-of-core management of bricked volumetric datasets

pub mod core;
pub mod volume;
pub mod format;
pub mod bricking;
