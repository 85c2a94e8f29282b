#![allow(non_ascii_idents)]

//! Real-time position-based fluids on a uniform grid.
//!
//! Each step predicts particle positions under gravity, sorts particles by grid cell so
//! neighbors sit in contiguous ranges, projects positions toward rest density over a few
//! Jacobi iterations, then derives velocities and applies vorticity confinement and XSPH
//! viscosity. Positions, colours and cell occupancy are written to buffers shared with a
//! renderer; particles are finally re-sorted back to front for compositing.
//!
//! All passes run on the thread pool of an explicit `ComputeContext`.

pub mod config;
pub mod context;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod interop;
pub mod model;
pub mod particles;
pub mod pbf;
pub mod render_support;
pub mod scene;
pub mod solver;
pub mod sort;
pub mod sph;
pub mod surface;
pub mod util;

pub use config::{Config, FluidParams, KernelCoeffs, ModelParams};
pub use context::ComputeContext;
pub use error::{ComputeError, ConfigError, ModelError, SortError};
pub use grid::{CellRange, SpatialGrid};
pub use interop::{InteropBuffer, InteropBuffers};
pub use model::{Boundary, ModelState, SimType, SimulationBackend};
pub use pbf::PositionBasedFluids;
pub use scene::Scene;
pub use sort::{Permute, RadixSort};
pub use surface::{SurfaceConsumer, SurfaceView};
