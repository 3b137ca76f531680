//! Error types for bricked volume management

use thiserror::Error;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error("format error: {0}")]
    Format(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("memory budget exhausted: {0}")]
    Budget(String),

    #[error("bricking error: {0}")]
    Bricking(String),
}
