//! Tunable parameters. `ModelParams` is fixed when a model is built; `FluidParams`
//! may be changed between steps through the model's setters. `Config` bundles everything
//! we persist.

use std::{f32::consts::PI, io, path::Path};

use bincode::{Decode, Encode};
use lin_alg::f32::Vec3;

use crate::{error::ConfigError, model::Boundary, scene::Scene, util};

pub const SAVE_FILE: &str = "config.pbf";

/// Length of one side of the bounding box the particles evolve in.
pub const BOX_SIZE: f32 = 10.;
/// Number of grid cells along each axis.
pub const GRID_RES: u32 = 30;
/// Largest preset (`Scene::Bath`).
pub const MAX_NB_PARTICLES: usize = 1 << 17;
/// Largest exponent accepted for the artificial pressure term.
pub const MAX_ART_PRESSURE_EXP: u32 = 16;

/// Fixed at construction.
#[derive(Clone, Copy, Debug, PartialEq, Encode, Decode)]
pub struct ModelParams {
    pub max_nb_particles: usize,
    pub box_size: f32,
    pub grid_res: u32,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            max_nb_particles: MAX_NB_PARTICLES,
            box_size: BOX_SIZE,
            grid_res: GRID_RES,
        }
    }
}

impl ModelParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid_res == 0 {
            return Err(ConfigError::ZeroGridRes);
        }
        if !(self.box_size > 0.) || !self.box_size.is_finite() {
            return Err(ConfigError::InvalidBoxSize(self.box_size));
        }
        if self.max_nb_particles == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }

    pub fn nb_cells(&self) -> usize {
        let r = self.grid_res as usize;
        r * r * r
    }

    /// Cell size; this is also the kernel's effective radius.
    pub fn cell_size(&self) -> f32 {
        self.box_size / self.grid_res as f32
    }
}

/// Inputs shared by every solver pass.
#[derive(Clone, Copy, Debug, PartialEq, Encode, Decode)]
pub struct FluidParams {
    /// Derived from `box_size / grid_res`; overwritten on reset.
    pub effect_radius: f32,
    pub rest_density: f32,
    /// Constraint force mixing; regularizes the constraint factor denominator.
    pub relax_cfm: f32,
    pub time_step: f32,
    /// Artificial pressure reduces tensile instability (particle clustering).
    pub art_pressure_enabled: bool,
    pub art_pressure_radius: f32,
    pub art_pressure_coeff: f32,
    pub art_pressure_exp: u32,
    /// Vorticity confinement re-injects energy lost to numerical damping.
    pub vorticity_enabled: bool,
    pub vorticity_coeff: f32,
    pub viscosity_enabled: bool,
    pub xsph_viscosity_coeff: f32,
    pub max_velocity: f32,
    pub gravity: [f32; 3],
}

impl Default for FluidParams {
    fn default() -> Self {
        Self {
            effect_radius: BOX_SIZE / GRID_RES as f32,
            rest_density: 450.,
            relax_cfm: 600.,
            time_step: 0.010,
            art_pressure_enabled: true,
            art_pressure_radius: 0.006,
            art_pressure_coeff: 0.001,
            art_pressure_exp: 4,
            vorticity_enabled: true,
            vorticity_coeff: 0.0004,
            viscosity_enabled: true,
            xsph_viscosity_coeff: 0.0001,
            max_velocity: 30.,
            gravity: [0., -9.81, 0.],
        }
    }
}

impl FluidParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("effect_radius", self.effect_radius),
            ("rest_density", self.rest_density),
            ("time_step", self.time_step),
            ("max_velocity", self.max_velocity),
        ];
        for (name, value) in positive {
            if !(value > 0.) || !value.is_finite() {
                return Err(ConfigError::NonPositive { name, value });
            }
        }

        let non_negative = [
            ("relax_cfm", self.relax_cfm),
            ("art_pressure_radius", self.art_pressure_radius),
            ("art_pressure_coeff", self.art_pressure_coeff),
            ("vorticity_coeff", self.vorticity_coeff),
            ("xsph_viscosity_coeff", self.xsph_viscosity_coeff),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.) || !value.is_finite() {
                return Err(ConfigError::Negative { name, value });
            }
        }

        if self.art_pressure_exp > MAX_ART_PRESSURE_EXP {
            return Err(ConfigError::ArtPressureExpTooLarge {
                exp: self.art_pressure_exp,
                max: MAX_ART_PRESSURE_EXP,
            });
        }
        if let Some(&value) = self.gravity.iter().find(|g| !g.is_finite()) {
            return Err(ConfigError::NonFinite {
                name: "gravity",
                value,
            });
        }
        Ok(())
    }

    pub fn gravity(&self) -> Vec3 {
        Vec3::new(self.gravity[0], self.gravity[1], self.gravity[2])
    }

    /// Derive the kernel coefficients. Run this whenever the effective radius changes.
    pub fn kernel_coeffs(&self) -> KernelCoeffs {
        let h = self.effect_radius;
        let h2 = h * h;

        let poly6 = 315. / (64. * PI * h.powi(9));
        let spiky_grad = -45. / (PI * h.powi(6));

        let dq = self.art_pressure_radius.min(h);
        let w_dq = poly6 * (h2 - dq * dq).powi(3);

        KernelCoeffs {
            h,
            h2,
            poly6,
            spiky_grad,
            w_dq,
        }
    }
}

/// Precomputed from `FluidParams`. Treat as immutable for the duration of a step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KernelCoeffs {
    pub h: f32,
    pub h2: f32,
    pub poly6: f32,
    /// Negative; the gradient points toward the neighbor.
    pub spiky_grad: f32,
    /// Poly6 evaluated at the artificial pressure radius.
    pub w_dq: f32,
}

#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct Config {
    pub model: ModelParams,
    pub fluid: FluidParams,
    pub nb_jacobi_iters: usize,
    pub scene: Scene,
    pub boundary: Boundary,
    /// Skips the per-cell particle cap.
    pub simple_mode: bool,
    pub max_parts_in_cell: u32,
    /// Fraction of the effective radius. 0 places particles exactly on the lattice.
    pub lattice_jitter: f32,
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: Default::default(),
            fluid: Default::default(),
            nb_jacobi_iters: 2,
            scene: Scene::Drop,
            boundary: Boundary::BouncingWall,
            simple_mode: true,
            max_parts_in_cell: 100,
            lattice_jitter: 0.05,
            seed: 0,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> io::Result<Self> {
        util::load(path)
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        util::save(path, self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.model.validate()?;
        self.fluid.validate()?;
        if self.nb_jacobi_iters == 0 {
            return Err(ConfigError::ZeroJacobiIters);
        }
        // Checked even in simple mode, since the mode can be switched at run time.
        if self.max_parts_in_cell == 0 {
            return Err(ConfigError::ZeroCellCap);
        }
        Ok(())
    }
}
