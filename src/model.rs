//! The lifecycle every simulation backend shares: `Uninitialized → Ready ⇄ Paused`, with
//! reset always returning to `Ready`. A backend that failed to build stays `Uninitialized`,
//! and every mutating call on it is refused with `ModelError::Uninitialized`.

use std::sync::Arc;

use bincode::{Decode, Encode};
use log::{info, warn};

use crate::{
    config::Config,
    context::ComputeContext,
    error::{ComputeError, ModelError},
    interop::InteropBuffers,
    pbf::PositionBasedFluids,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode)]
pub enum Boundary {
    /// Positions past a wall are mirrored back inside.
    BouncingWall,
    /// Positions past a wall re-enter from the opposite one.
    CyclicWall,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelState {
    Uninitialized,
    Ready,
    Paused,
}

/// State shared by all backends.
pub struct ModelCore {
    state: ModelState,
    boundary: Boundary,
    nb_particles: usize,
    max_nb_particles: usize,
    ctx: Option<Arc<ComputeContext>>,
}

impl ModelCore {
    pub fn new(ctx: Arc<ComputeContext>, max_nb_particles: usize, boundary: Boundary) -> Self {
        Self {
            state: ModelState::Ready,
            boundary,
            nb_particles: 0,
            max_nb_particles,
            ctx: Some(ctx),
        }
    }

    pub fn uninitialized(boundary: Boundary) -> Self {
        Self {
            state: ModelState::Uninitialized,
            boundary,
            nb_particles: 0,
            max_nb_particles: 0,
            ctx: None,
        }
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    pub fn is_init(&self) -> bool {
        self.state != ModelState::Uninitialized
    }

    /// Refuse (and log) an operation on an uninitialized model.
    pub fn require_init(&self, op: &str) -> Result<(), ModelError> {
        if self.is_init() {
            Ok(())
        } else {
            warn!("Ignoring `{op}`: model is not initialized");
            Err(ModelError::Uninitialized)
        }
    }

    pub fn ctx(&self) -> Option<&Arc<ComputeContext>> {
        self.ctx.as_ref()
    }

    /// Back to `Ready` after a reset; unpauses.
    pub fn mark_ready(&mut self) {
        if self.is_init() {
            self.state = ModelState::Ready;
        }
    }

    pub fn set_pause(&mut self, pause: bool) -> Result<(), ModelError> {
        self.require_init("set_pause")?;
        self.state = if pause {
            ModelState::Paused
        } else {
            ModelState::Ready
        };
        Ok(())
    }

    pub fn is_pause(&self) -> bool {
        self.state == ModelState::Paused
    }

    pub fn set_boundary(&mut self, boundary: Boundary) -> Result<(), ModelError> {
        self.require_init("set_boundary")?;
        self.boundary = boundary;
        Ok(())
    }

    pub fn boundary(&self) -> Boundary {
        self.boundary
    }

    pub fn nb_particles(&self) -> usize {
        self.nb_particles
    }

    pub fn set_nb_particles(&mut self, n: usize) {
        self.nb_particles = n.min(self.max_nb_particles);
    }

    pub fn max_nb_particles(&self) -> usize {
        self.max_nb_particles
    }
}

/// A physical model driven by the host once per frame.
pub trait SimulationBackend: Send {
    fn core(&self) -> &ModelCore;
    fn core_mut(&mut self) -> &mut ModelCore;

    fn sim_type(&self) -> SimType;

    /// Advance one step. While paused, only the render-support passes run.
    fn update(&mut self) -> Result<(), ModelError>;

    /// Re-initialize the scene and all derived parameters. Always ends in `Ready`.
    fn reset(&mut self) -> Result<(), ModelError>;

    fn set_pause(&mut self, pause: bool) -> Result<(), ModelError> {
        self.core_mut().set_pause(pause)
    }

    fn is_pause(&self) -> bool {
        self.core().is_pause()
    }

    fn set_boundary(&mut self, boundary: Boundary) -> Result<(), ModelError> {
        self.core_mut().set_boundary(boundary)
    }

    fn boundary(&self) -> Boundary {
        self.core().boundary()
    }

    fn nb_particles(&self) -> usize {
        self.core().nb_particles()
    }

    fn max_nb_particles(&self) -> usize {
        self.core().max_nb_particles()
    }

    fn is_init(&self) -> bool {
        self.core().is_init()
    }

    fn state(&self) -> ModelState {
        self.core().state()
    }

    /// Log per-pass timings at `debug` level.
    fn enable_profiling(&mut self, enable: bool) -> Result<(), ModelError> {
        let core = self.core();
        core.require_init("enable_profiling")?;
        if let Some(ctx) = core.ctx() {
            ctx.enable_profiling(enable);
        }
        Ok(())
    }

    fn is_profiling_enabled(&self) -> bool {
        self.core().ctx().is_some_and(|c| c.is_profiling())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode)]
pub enum SimType {
    PositionBasedFluids,
}

impl SimType {
    pub fn name(self) -> &'static str {
        match self {
            Self::PositionBasedFluids => "Position based fluids",
        }
    }

    /// Build a backend of this type. A context that failed to come up yields a backend that
    /// stays `Uninitialized`.
    pub fn create(
        self,
        ctx: Result<Arc<ComputeContext>, ComputeError>,
        config: Config,
        interop: InteropBuffers,
    ) -> Box<dyn SimulationBackend> {
        info!("Creating a `{}` model", self.name());

        match self {
            Self::PositionBasedFluids => match ctx {
                Ok(ctx) => Box::new(PositionBasedFluids::new(ctx, config, interop)),
                Err(e) => Box::new(PositionBasedFluids::uninitialized(config, e.into())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_cycle() {
        let ctx = Arc::new(ComputeContext::new(Some(1)).unwrap());
        let mut core = ModelCore::new(ctx, 16, Boundary::BouncingWall);

        assert_eq!(core.state(), ModelState::Ready);
        core.set_pause(true).unwrap();
        assert!(core.is_pause());
        core.mark_ready();
        assert_eq!(core.state(), ModelState::Ready);

        core.set_nb_particles(100);
        assert_eq!(core.nb_particles(), 16);
    }

    #[test]
    fn uninitialized_refuses_mutation() {
        let mut core = ModelCore::uninitialized(Boundary::BouncingWall);

        assert!(matches!(core.set_pause(true), Err(ModelError::Uninitialized)));
        assert!(matches!(
            core.set_boundary(Boundary::CyclicWall),
            Err(ModelError::Uninitialized)
        ));
        assert_eq!(core.boundary(), Boundary::BouncingWall);

        core.mark_ready();
        assert_eq!(core.state(), ModelState::Uninitialized);
    }
}
