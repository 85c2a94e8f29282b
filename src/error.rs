//! Error types. Degenerate numeric states (e.g. near-zero density) are handled in the
//! solver passes themselves, and never surface here.

use std::collections::TryReserveError;

use thiserror::Error;

/// The compute backend (our thread pool) could not be brought up.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Failed to build the compute thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("A compute context needs at least one worker thread")]
    NoThreads,
}

/// Rejected before any buffer is touched.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Grid resolution must be at least 1")]
    ZeroGridRes,
    #[error("Box size must be positive and finite; got {0}")]
    InvalidBoxSize(f32),
    #[error("Particle capacity must be at least 1")]
    ZeroCapacity,
    #[error("Scene needs {requested} particles, but capacity is {capacity}")]
    CapacityExceeded { requested: usize, capacity: usize },
    #[error("At least one Jacobi iteration is required")]
    ZeroJacobiIters,
    #[error("`{name}` must be positive and finite; got {value}")]
    NonPositive { name: &'static str, value: f32 },
    #[error("`{name}` must be non-negative and finite; got {value}")]
    Negative { name: &'static str, value: f32 },
    #[error("`{name}` must be finite; got {value}")]
    NonFinite { name: &'static str, value: f32 },
    #[error("Artificial pressure exponent is {exp}; at most {max} is supported")]
    ArtPressureExpTooLarge { exp: u32, max: u32 },
    #[error("A cell must hold at least one particle when the cell cap is active")]
    ZeroCellCap,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SortError {
    #[error("Sorter capacity is {capacity}, but {len} keys were passed")]
    CapacityTooSmall { capacity: usize, len: usize },
    #[error("Attribute array {index} holds {len} elements; at least {required} are required")]
    AttributeTooShort {
        index: usize,
        len: usize,
        required: usize,
    },
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model is not initialized")]
    Uninitialized,
    #[error("Compute backend unavailable: {0}")]
    Backend(#[from] ComputeError),
    #[error("Buffer allocation failed: {0}")]
    Allocation(#[from] TryReserveError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sort(#[from] SortError),
    #[error("Interop buffer `{name}` holds {len} elements; expected at least {expected}")]
    InteropTooSmall {
        name: &'static str,
        len: usize,
        expected: usize,
    },
}
