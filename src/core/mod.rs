//! Core error, logging and type infrastructure

pub mod error;
pub mod logging;
pub mod types;

pub use error::Error;
pub use types::Result;
