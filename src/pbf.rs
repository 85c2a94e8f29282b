//! Position-based fluids (Macklin & Müller, 2013): the model that ties the grid, the sorter and
//! the solver passes into a per-step pipeline.
//!
//! Step: predict → grid refresh (assign cells, sort, build ranges) → boundary → Jacobi
//! iterations → velocity → vorticity confinement / XSPH viscosity → commit. Then the render
//! passes (colour, occupancy, camera sort), which also run while paused.

use std::sync::Arc;

use lin_alg::f32::Vec3;
use log::{error, info};

use crate::{
    config::{Config, FluidParams, KernelCoeffs},
    context::ComputeContext,
    error::{ConfigError, ModelError},
    grid::SpatialGrid,
    interop::InteropBuffers,
    model::{ModelCore, SimType, SimulationBackend},
    particles::{ParticleBuffers, SortKey},
    render_support, scene,
    scene::Scene,
    solver,
    sort::RadixSort,
    surface::{SurfaceConsumer, SurfaceView},
};

/// Everything that only exists once construction succeeded.
struct Simulation {
    ctx: Arc<ComputeContext>,
    grid: SpatialGrid,
    sorter: RadixSort,
    particles: ParticleBuffers,
    interop: InteropBuffers,
    coeffs: KernelCoeffs,
}

impl Simulation {
    fn new(ctx: Arc<ComputeContext>, config: &Config, interop: InteropBuffers) -> Result<Self, ModelError> {
        let capacity = config.model.max_nb_particles;

        let grid = SpatialGrid::new(&config.model)?;
        interop.validate(capacity, grid.nb_cells())?;

        Ok(Self {
            sorter: RadixSort::new(Arc::clone(&ctx), capacity)?,
            particles: ParticleBuffers::new(capacity)?,
            grid,
            interop,
            coeffs: config.fluid.kernel_coeffs(),
            ctx,
        })
    }
}

pub struct PositionBasedFluids {
    core: ModelCore,
    config: Config,
    sim: Option<Simulation>,
    construction_error: Option<ModelError>,
    surface: Option<Box<dyn SurfaceConsumer>>,
}

impl PositionBasedFluids {
    /// Build and reset the model. On failure, the model stays uninitialized; the cause is
    /// available from `construction_error`.
    pub fn new(ctx: Arc<ComputeContext>, config: Config, interop: InteropBuffers) -> Self {
        match Self::try_new(ctx, config.clone(), interop) {
            Ok(model) => model,
            Err(e) => Self::uninitialized(config, e),
        }
    }

    pub fn try_new(
        ctx: Arc<ComputeContext>,
        mut config: Config,
        interop: InteropBuffers,
    ) -> Result<Self, ModelError> {
        // Configuration errors are caught before any buffer is allocated.
        config.validate()?;
        let capacity = config.model.max_nb_particles;
        let requested = config.scene.nb_particles();
        if requested > capacity {
            return Err(ConfigError::CapacityExceeded {
                requested,
                capacity,
            }
            .into());
        }
        config.fluid.effect_radius = config.model.cell_size();

        let sim = Simulation::new(Arc::clone(&ctx), &config, interop)?;

        let mut result = Self {
            core: ModelCore::new(ctx, capacity, config.boundary),
            config,
            sim: Some(sim),
            construction_error: None,
            surface: None,
        };
        result.reset()?;

        info!(
            "Position based fluids ready: {} / {} particles, {}³ grid",
            result.core.nb_particles(),
            capacity,
            result.config.model.grid_res
        );

        Ok(result)
    }

    pub fn uninitialized(config: Config, cause: ModelError) -> Self {
        error!("Position based fluids failed to initialize: {cause}");

        Self {
            core: ModelCore::uninitialized(config.boundary),
            config,
            sim: None,
            construction_error: Some(cause),
            surface: None,
        }
    }

    pub fn construction_error(&self) -> Option<&ModelError> {
        self.construction_error.as_ref()
    }

    fn sim_mut(&mut self, op: &str) -> Result<&mut Simulation, ModelError> {
        self.core.require_init(op)?;
        self.sim.as_mut().ok_or(ModelError::Uninitialized)
    }

    /// Re-derive the kernel coefficients after a parameter change.
    fn refresh_coeffs(&mut self) {
        self.config.fluid.effect_radius = self.config.model.cell_size();
        let coeffs = self.config.fluid.kernel_coeffs();
        if let Some(sim) = self.sim.as_mut() {
            sim.coeffs = coeffs;
        }
    }

    fn set_fluid_with(
        &mut self,
        op: &str,
        f: impl FnOnce(&mut FluidParams),
    ) -> Result<(), ModelError> {
        self.core.require_init(op)?;
        let mut fluid = self.config.fluid;
        f(&mut fluid);
        fluid.validate()?;
        self.config.fluid = fluid;
        self.refresh_coeffs();
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn fluid_params(&self) -> &FluidParams {
        &self.config.fluid
    }

    /// Replace every fluid parameter at once. The effective radius stays tied to the grid's
    /// cell size.
    pub fn set_fluid_params(&mut self, fluid: FluidParams) -> Result<(), ModelError> {
        self.core.require_init("set_fluid_params")?;
        fluid.validate()?;
        self.config.fluid = fluid;
        self.refresh_coeffs();
        Ok(())
    }

    pub fn kernel_coeffs(&self) -> Option<KernelCoeffs> {
        self.sim.as_ref().map(|s| s.coeffs)
    }

    pub fn scene(&self) -> Scene {
        self.config.scene
    }

    /// Switch preset and reset. A preset that doesn't fit the capacity is refused, and the
    /// current scene is kept.
    pub fn set_initial_scene(&mut self, scene: Scene) -> Result<(), ModelError> {
        self.core.require_init("set_initial_scene")?;

        let requested = scene.nb_particles();
        let capacity = self.core.max_nb_particles();
        if requested > capacity {
            return Err(ConfigError::CapacityExceeded {
                requested,
                capacity,
            }
            .into());
        }

        info!("Switching scene to `{}`", scene.name());
        self.config.scene = scene;
        self.reset()
    }

    /// Unknown indices fall back to the first preset.
    pub fn set_initial_scene_by_index(&mut self, i: usize) -> Result<(), ModelError> {
        self.set_initial_scene(Scene::from_index(i))
    }

    pub fn nb_jacobi_iters(&self) -> usize {
        self.config.nb_jacobi_iters
    }

    pub fn set_nb_jacobi_iters(&mut self, n: usize) -> Result<(), ModelError> {
        self.core.require_init("set_nb_jacobi_iters")?;
        if n == 0 {
            return Err(ConfigError::ZeroJacobiIters.into());
        }
        self.config.nb_jacobi_iters = n;
        Ok(())
    }

    pub fn is_art_pressure_enabled(&self) -> bool {
        self.config.fluid.art_pressure_enabled
    }

    pub fn enable_art_pressure(&mut self, enable: bool) -> Result<(), ModelError> {
        self.set_fluid_with("enable_art_pressure", |f| f.art_pressure_enabled = enable)
    }

    pub fn art_pressure_radius(&self) -> f32 {
        self.config.fluid.art_pressure_radius
    }

    pub fn set_art_pressure_radius(&mut self, radius: f32) -> Result<(), ModelError> {
        self.set_fluid_with("set_art_pressure_radius", |f| f.art_pressure_radius = radius)
    }

    pub fn art_pressure_coeff(&self) -> f32 {
        self.config.fluid.art_pressure_coeff
    }

    pub fn set_art_pressure_coeff(&mut self, coeff: f32) -> Result<(), ModelError> {
        self.set_fluid_with("set_art_pressure_coeff", |f| f.art_pressure_coeff = coeff)
    }

    pub fn art_pressure_exp(&self) -> u32 {
        self.config.fluid.art_pressure_exp
    }

    pub fn set_art_pressure_exp(&mut self, exp: u32) -> Result<(), ModelError> {
        self.set_fluid_with("set_art_pressure_exp", |f| f.art_pressure_exp = exp)
    }

    pub fn is_vorticity_enabled(&self) -> bool {
        self.config.fluid.vorticity_enabled
    }

    pub fn enable_vorticity(&mut self, enable: bool) -> Result<(), ModelError> {
        self.set_fluid_with("enable_vorticity", |f| f.vorticity_enabled = enable)
    }

    pub fn vorticity_coeff(&self) -> f32 {
        self.config.fluid.vorticity_coeff
    }

    pub fn set_vorticity_coeff(&mut self, coeff: f32) -> Result<(), ModelError> {
        self.set_fluid_with("set_vorticity_coeff", |f| f.vorticity_coeff = coeff)
    }

    pub fn is_viscosity_enabled(&self) -> bool {
        self.config.fluid.viscosity_enabled
    }

    pub fn enable_viscosity(&mut self, enable: bool) -> Result<(), ModelError> {
        self.set_fluid_with("enable_viscosity", |f| f.viscosity_enabled = enable)
    }

    pub fn viscosity_coeff(&self) -> f32 {
        self.config.fluid.xsph_viscosity_coeff
    }

    pub fn set_viscosity_coeff(&mut self, coeff: f32) -> Result<(), ModelError> {
        self.set_fluid_with("set_viscosity_coeff", |f| f.xsph_viscosity_coeff = coeff)
    }

    pub fn is_simple_mode(&self) -> bool {
        self.config.simple_mode
    }

    /// Simple mode skips the per-cell particle cap.
    pub fn set_simple_mode(&mut self, simple: bool) -> Result<(), ModelError> {
        self.core.require_init("set_simple_mode")?;
        self.config.simple_mode = simple;
        Ok(())
    }

    pub fn set_max_parts_in_cell(&mut self, max: u32) -> Result<(), ModelError> {
        self.core.require_init("set_max_parts_in_cell")?;
        if max == 0 {
            return Err(ConfigError::ZeroCellCap.into());
        }
        self.config.max_parts_in_cell = max;
        Ok(())
    }

    /// Write the camera position to its interop handle.
    pub fn set_camera(&mut self, posit: Vec3) -> Result<(), ModelError> {
        let sim = self.sim_mut("set_camera")?;
        sim.interop.set_camera(posit);
        Ok(())
    }

    pub fn set_surface_consumer(&mut self, consumer: Option<Box<dyn SurfaceConsumer>>) {
        self.surface = consumer;
    }

    pub fn interop(&self) -> Option<&InteropBuffers> {
        self.sim.as_ref().map(|s| &s.interop)
    }

    pub fn grid(&self) -> Option<&SpatialGrid> {
        self.sim.as_ref().map(|s| &s.grid)
    }

    /// Per-particle state. Active particles occupy the first `nb_particles()` slots.
    pub fn particles(&self) -> Option<&ParticleBuffers> {
        self.sim.as_ref().map(|s| &s.particles)
    }

    /// Largest relative density deviation from rest density, as of the last Jacobi
    /// iteration. 0 when uninitialized.
    pub fn max_density_error(&self) -> f32 {
        match &self.sim {
            Some(sim) => solver::max_density_error(
                &sim.particles.density[..self.core.nb_particles()],
                self.config.fluid.rest_density,
            ),
            None => 0.,
        }
    }

    pub fn average_density_error(&self) -> f32 {
        match &self.sim {
            Some(sim) => solver::average_density_error(
                &sim.particles.density[..self.core.nb_particles()],
                self.config.fluid.rest_density,
            ),
            None => 0.,
        }
    }

    fn step(&mut self) -> Result<(), ModelError> {
        self.core.require_init("update")?;
        let n = self.core.nb_particles();
        let paused = self.core.is_pause();
        let boundary = self.core.boundary();
        let half_box = self.config.model.box_size / 2.;

        let Some(sim) = self.sim.as_mut() else {
            return Err(ModelError::Uninitialized);
        };
        let fluid = self.config.fluid;
        let ctx = &*sim.ctx;
        let c = &sim.coeffs;
        let p = &mut sim.particles;

        let mut frame = sim.interop.acquire();

        if !paused {
            solver::predict(
                ctx,
                &frame.posits[..n],
                &mut p.vel[..n],
                &mut p.pred_posit[..n],
                fluid.gravity(),
                fluid.time_step,
            );

            sim.grid.assign_cells(ctx, &p.pred_posit, n, &mut p.cell_id);
            p.sort_by(
                SortKey::Cell,
                &mut sim.sorter,
                n,
                &mut frame.posits,
                &mut frame.colors,
            )?;
            sim.grid.build_ranges(ctx, &p.cell_id[..n]);
            if !self.config.simple_mode {
                sim.grid.clamp_ranges(ctx, self.config.max_parts_in_cell);
            }

            solver::apply_boundary(ctx, &mut p.pred_posit[..n], boundary, half_box);

            for _ in 0..self.config.nb_jacobi_iters {
                solver::jacobi_iteration(
                    ctx,
                    &sim.grid,
                    &mut p.pred_posit[..n],
                    &mut p.density[..n],
                    &mut p.constraint[..n],
                    &mut p.corr[..n],
                    c,
                    &fluid,
                );
            }
            // Corrections can push particles back through a wall.
            solver::apply_boundary(ctx, &mut p.pred_posit[..n], boundary, half_box);

            solver::update_velocity(
                ctx,
                &frame.posits[..n],
                &p.pred_posit[..n],
                &mut p.vel[..n],
                fluid.time_step,
                fluid.max_velocity,
                boundary,
                half_box,
            );

            p.vel_prev[..n].copy_from_slice(&p.vel[..n]);

            if fluid.vorticity_enabled {
                solver::compute_vorticity(ctx, &sim.grid, &p.pred_posit[..n], &p.vel_prev[..n], &mut p.vort[..n], c);
                solver::apply_vorticity_confinement(
                    ctx,
                    &sim.grid,
                    &p.pred_posit[..n],
                    &p.vort[..n],
                    &mut p.vel[..n],
                    c,
                    fluid.vorticity_coeff,
                    fluid.time_step,
                );
            }
            if fluid.viscosity_enabled {
                solver::apply_xsph_viscosity(
                    ctx,
                    &sim.grid,
                    &p.pred_posit[..n],
                    &p.vel_prev[..n],
                    &mut p.vel[..n],
                    c,
                    fluid.xsph_viscosity_coeff,
                );
            }

            solver::commit_positions(ctx, &p.pred_posit[..n], &mut frame.posits[..n]);

            if let Some(surface) = self.surface.as_mut() {
                surface.on_commit(&SurfaceView {
                    posits: &frame.posits[..n],
                    grid: &sim.grid,
                });
            }
        }

        render_support::fill_colors(ctx, &p.density, n, fluid.rest_density, &mut frame.colors);
        render_support::fill_occupancy(ctx, &sim.grid, &frame.posits[..n], &mut frame.occupancy);
        render_support::camera_keys(ctx, &frame.posits, n, frame.camera, &mut p.camera_key);
        p.sort_by(
            SortKey::Camera,
            &mut sim.sorter,
            n,
            &mut frame.posits,
            &mut frame.colors,
        )?;

        Ok(())
    }
}

impl SimulationBackend for PositionBasedFluids {
    fn core(&self) -> &ModelCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ModelCore {
        &mut self.core
    }

    fn sim_type(&self) -> SimType {
        SimType::PositionBasedFluids
    }

    fn update(&mut self) -> Result<(), ModelError> {
        self.step()
    }

    fn reset(&mut self) -> Result<(), ModelError> {
        self.core.require_init("reset")?;
        self.refresh_coeffs();

        let config = &self.config;
        let Some(sim) = self.sim.as_mut() else {
            return Err(ModelError::Uninitialized);
        };
        let ctx = &*sim.ctx;
        let capacity = self.core.max_nb_particles();
        let half_box = config.model.box_size / 2.;

        let mut frame = sim.interop.acquire();

        let n = scene::fill_particles(
            &config.scene.regions(config.model.box_size),
            &mut frame.posits[..capacity],
            config.lattice_jitter * config.fluid.effect_radius,
            half_box,
            config.seed,
        )?;

        sim.particles.reset(&frame.posits[..capacity]);
        // Rest density until the first step computes the real one.
        sim.particles.density[..n].fill(config.fluid.rest_density);
        sim.grid.build_ranges(ctx, &[]);

        render_support::fill_colors(
            ctx,
            &sim.particles.density,
            n,
            config.fluid.rest_density,
            &mut frame.colors[..capacity],
        );
        render_support::fill_occupancy(ctx, &sim.grid, &frame.posits[..n], &mut frame.occupancy);

        drop(frame);

        self.core.set_nb_particles(n);
        self.core.mark_ready();

        info!("Reset scene `{}`: {n} particles", config.scene.name());
        Ok(())
    }
}
