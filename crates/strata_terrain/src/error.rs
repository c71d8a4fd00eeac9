//! # Terrain Error Types
//!
//! All errors that can occur in the terrain store.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the terrain store.
#[derive(Error, Debug)]
pub enum TerrainError {
    /// A numeric field was outside its documented domain.
    #[error("{what} out of range: {value} (max {max})")]
    OutOfRange {
        /// Which field was out of range.
        what: &'static str,
        /// The offending value.
        value: u64,
        /// The largest accepted value.
        max: u64,
    },

    /// An input buffer or slice did not have the expected shape.
    #[error("malformed input: {0}")]
    Malformed(String),

    /// Terrain creation collided with an existing file.
    #[error("terrain file already exists: {0}")]
    AlreadyExists(PathBuf),

    /// Terrain open found no file at the given path.
    #[error("terrain file not found: {0}")]
    Missing(PathBuf),

    /// An underlying file operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for terrain operations.
pub type TerrainResult<T> = Result<T, TerrainError>;
