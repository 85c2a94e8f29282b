//! The per-particle passes of a position-based fluids step. Each function is one pass over
//! the active particles: every particle writes only its own slot, and the pass returns once
//! all particles are done. Callers pass slices already truncated to the active count.
//!
//! Neighbors are found through the grid; its ranges index the same (cell-sorted) arrays.

use lin_alg::f32::Vec3;
use rayon::prelude::*;

use crate::{
    config::{FluidParams, KernelCoeffs},
    context::ComputeContext,
    grid::SpatialGrid,
    model::Boundary,
    sph::{art_pressure, poly6, spiky_grad},
};

/// Below this, the vorticity location vector has no meaningful direction.
const VORT_EPS: f32 = 1e-6;

fn posit3(p: &[f32; 4]) -> Vec3 {
    Vec3::new(p[0], p[1], p[2])
}

/// v ← v + Δt g, x* ← x + Δt v.
pub fn predict(
    ctx: &ComputeContext,
    posits: &[[f32; 4]],
    vel: &mut [Vec3],
    pred: &mut [Vec3],
    gravity: Vec3,
    dt: f32,
) {
    ctx.run_pass("predict", || {
        pred.par_iter_mut()
            .zip(vel.par_iter_mut())
            .zip(posits.par_iter())
            .for_each(|((pred, vel), posit)| {
                *vel += gravity * dt;
                *pred = posit3(posit) + *vel * dt;
            });
    });
}

/// Bring one coordinate back inside `[-half_box, half_box]`.
pub fn confine_axis(v: f32, boundary: Boundary, half_box: f32) -> f32 {
    if v.is_nan() {
        return 0.;
    }
    if v.is_infinite() {
        return v.clamp(-half_box, half_box);
    }

    match boundary {
        Boundary::BouncingWall => {
            let mirrored = if v > half_box {
                2. * half_box - v
            } else if v < -half_box {
                -2. * half_box - v
            } else {
                v
            };
            mirrored.clamp(-half_box, half_box)
        }
        Boundary::CyclicWall => {
            let wrapped = (v + half_box).rem_euclid(2. * half_box) - half_box;
            wrapped.clamp(-half_box, half_box)
        }
    }
}

pub fn confine(p: Vec3, boundary: Boundary, half_box: f32) -> Vec3 {
    Vec3::new(
        confine_axis(p.x, boundary, half_box),
        confine_axis(p.y, boundary, half_box),
        confine_axis(p.z, boundary, half_box),
    )
}

pub fn apply_boundary(ctx: &ComputeContext, pred: &mut [Vec3], boundary: Boundary, half_box: f32) {
    ctx.run_pass("boundary", || {
        pred.par_iter_mut()
            .for_each(|p| *p = confine(*p, boundary, half_box));
    });
}

/// ρ_i = Σ_j W(p_i - p_j), unit mass, self term included.
pub fn compute_density(
    ctx: &ComputeContext,
    grid: &SpatialGrid,
    pred: &[Vec3],
    density: &mut [f32],
    c: &KernelCoeffs,
) {
    ctx.run_pass("density", || {
        density.par_iter_mut().enumerate().for_each(|(i, rho)| {
            let pi = pred[i];
            let mut sum = 0.;

            grid.for_each_neighbor(pi, |j| {
                sum += poly6((pi - pred[j]).magnitude_squared(), c);
            });

            *rho = sum;
        });
    });
}

/// λ_i = -C_i / (Σ_k |∇_k C_i|² + ε), where C_i = ρ_i/ρ₀ - 1 and ε is the relaxation CFM.
pub fn compute_constraint_factor(
    ctx: &ComputeContext,
    grid: &SpatialGrid,
    pred: &[Vec3],
    density: &[f32],
    constraint: &mut [f32],
    c: &KernelCoeffs,
    fluid: &FluidParams,
) {
    let ρ0 = fluid.rest_density;

    ctx.run_pass("constraint_factor", || {
        constraint.par_iter_mut().enumerate().for_each(|(i, λ)| {
            let pi = pred[i];
            let c_i = density[i] / ρ0 - 1.;

            let mut grad_i = Vec3::new_zero();
            let mut sum_sq = 0.;

            grid.for_each_neighbor(pi, |j| {
                if j == i {
                    return;
                }
                let grad_j = spiky_grad(pi - pred[j], c) / ρ0;
                grad_i += grad_j;
                sum_sq += grad_j.magnitude_squared();
            });

            *λ = -c_i / (sum_sq + grad_i.magnitude_squared() + fluid.relax_cfm);
        });
    });
}

/// Δp_i = 1/ρ₀ Σ_j (λ_i + λ_j + s_corr) ∇W(p_i - p_j).
pub fn compute_correction(
    ctx: &ComputeContext,
    grid: &SpatialGrid,
    pred: &[Vec3],
    constraint: &[f32],
    corr: &mut [Vec3],
    c: &KernelCoeffs,
    fluid: &FluidParams,
) {
    ctx.run_pass("correction", || {
        corr.par_iter_mut().enumerate().for_each(|(i, dp)| {
            let pi = pred[i];
            let λi = constraint[i];
            let mut sum = Vec3::new_zero();

            grid.for_each_neighbor(pi, |j| {
                if j == i {
                    return;
                }
                let r = pi - pred[j];
                let r_sq = r.magnitude_squared();
                if r_sq >= c.h2 {
                    return;
                }

                let s_corr = if fluid.art_pressure_enabled {
                    art_pressure(r_sq, c, fluid.art_pressure_coeff, fluid.art_pressure_exp)
                } else {
                    0.
                };

                sum += spiky_grad(r, c) * (λi + constraint[j] + s_corr);
            });

            *dp = sum / fluid.rest_density;
        });
    });
}

pub fn apply_correction(ctx: &ComputeContext, pred: &mut [Vec3], corr: &[Vec3]) {
    ctx.run_pass("apply_correction", || {
        pred.par_iter_mut()
            .zip(corr.par_iter())
            .for_each(|(p, dp)| *p += *dp);
    });
}

/// One Jacobi iteration: density, constraint factor, correction, then commit of the
/// correction into the predicted positions. Every particle reads the previous iteration's
/// positions only.
#[allow(clippy::too_many_arguments)]
pub fn jacobi_iteration(
    ctx: &ComputeContext,
    grid: &SpatialGrid,
    pred: &mut [Vec3],
    density: &mut [f32],
    constraint: &mut [f32],
    corr: &mut [Vec3],
    c: &KernelCoeffs,
    fluid: &FluidParams,
) {
    compute_density(ctx, grid, pred, density, c);
    compute_constraint_factor(ctx, grid, pred, density, constraint, c, fluid);
    compute_correction(ctx, grid, pred, constraint, corr, c, fluid);
    apply_correction(ctx, pred, corr);
}

/// Shortest displacement between two positions in a periodic box.
fn min_image(d: f32, half_box: f32) -> f32 {
    let size = 2. * half_box;
    if d > half_box {
        d - size
    } else if d < -half_box {
        d + size
    } else {
        d
    }
}

/// v = (x* - x) / Δt, with its magnitude clamped.
#[allow(clippy::too_many_arguments)]
pub fn update_velocity(
    ctx: &ComputeContext,
    posits: &[[f32; 4]],
    pred: &[Vec3],
    vel: &mut [Vec3],
    dt: f32,
    max_vel: f32,
    boundary: Boundary,
    half_box: f32,
) {
    ctx.run_pass("velocity", || {
        vel.par_iter_mut().enumerate().for_each(|(i, v)| {
            let mut d = pred[i] - posit3(&posits[i]);
            if boundary == Boundary::CyclicWall {
                d = Vec3::new(
                    min_image(d.x, half_box),
                    min_image(d.y, half_box),
                    min_image(d.z, half_box),
                );
            }

            let v_new = d / dt;
            let speed = v_new.magnitude();

            *v = if speed > max_vel {
                v_new * (max_vel / speed)
            } else {
                v_new
            };
        });
    });
}

/// ω_i = Σ_j (v_j - v_i) × ∇_{p_j} W(p_i - p_j).
pub fn compute_vorticity(
    ctx: &ComputeContext,
    grid: &SpatialGrid,
    pred: &[Vec3],
    vel: &[Vec3],
    vort: &mut [Vec3],
    c: &KernelCoeffs,
) {
    ctx.run_pass("vorticity", || {
        vort.par_iter_mut().enumerate().for_each(|(i, ω)| {
            let pi = pred[i];
            let vi = vel[i];
            let mut sum = Vec3::new_zero();

            grid.for_each_neighbor(pi, |j| {
                if j == i {
                    return;
                }
                // ∇ with respect to p_j flips the sign.
                let grad = spiky_grad(pi - pred[j], c) * -1.;
                sum += (vel[j] - vi).cross(grad);
            });

            *ω = sum;
        });
    });
}

/// f_i = ε (N × ω_i), with N the normalized gradient of |ω|. Adds Δt f_i to the velocity.
#[allow(clippy::too_many_arguments)]
pub fn apply_vorticity_confinement(
    ctx: &ComputeContext,
    grid: &SpatialGrid,
    pred: &[Vec3],
    vort: &[Vec3],
    vel: &mut [Vec3],
    c: &KernelCoeffs,
    coeff: f32,
    dt: f32,
) {
    ctx.run_pass("vorticity_confinement", || {
        vel.par_iter_mut().enumerate().for_each(|(i, v)| {
            let pi = pred[i];
            let mut η = Vec3::new_zero();

            grid.for_each_neighbor(pi, |j| {
                if j == i {
                    return;
                }
                η += spiky_grad(pi - pred[j], c) * vort[j].magnitude();
            });

            let len = η.magnitude();
            if len < VORT_EPS {
                return;
            }

            let n = η / len;
            *v += n.cross(vort[i]) * (coeff * dt);
        });
    });
}

/// v_i ← v_i + c Σ_j (v_j - v_i) W(p_i - p_j). Reads the snapshot `vel_prev`; writes `vel`.
pub fn apply_xsph_viscosity(
    ctx: &ComputeContext,
    grid: &SpatialGrid,
    pred: &[Vec3],
    vel_prev: &[Vec3],
    vel: &mut [Vec3],
    c: &KernelCoeffs,
    coeff: f32,
) {
    ctx.run_pass("xsph_viscosity", || {
        vel.par_iter_mut().enumerate().for_each(|(i, v)| {
            let pi = pred[i];
            let vi = vel_prev[i];
            let mut sum = Vec3::new_zero();

            grid.for_each_neighbor(pi, |j| {
                if j == i {
                    return;
                }
                sum += (vel_prev[j] - vi) * poly6((pi - pred[j]).magnitude_squared(), c);
            });

            *v += sum * coeff;
        });
    });
}

/// x ← x*.
pub fn commit_positions(ctx: &ComputeContext, pred: &[Vec3], posits: &mut [[f32; 4]]) {
    ctx.run_pass("commit", || {
        posits
            .par_iter_mut()
            .zip(pred.par_iter())
            .for_each(|(p, pred)| *p = [pred.x, pred.y, pred.z, 1.]);
    });
}

/// Largest |ρ - ρ₀| / ρ₀.
pub fn max_density_error(density: &[f32], rest_density: f32) -> f32 {
    density
        .par_iter()
        .map(|rho| (rho - rest_density).abs() / rest_density)
        .reduce(|| 0., f32::max)
}

/// Mean |ρ - ρ₀| / ρ₀. 0 for no particles.
pub fn average_density_error(density: &[f32], rest_density: f32) -> f32 {
    if density.is_empty() {
        return 0.;
    }
    let sum: f32 = density
        .par_iter()
        .map(|rho| (rho - rest_density).abs() / rest_density)
        .sum();
    sum / density.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bouncing_reflects_then_clamps() {
        let b = Boundary::BouncingWall;
        assert_eq!(confine_axis(5.5, b, 5.), 4.5);
        assert_eq!(confine_axis(-5.25, b, 5.), -4.75);
        assert_eq!(confine_axis(1e30, b, 5.), -5.);
        assert_eq!(confine_axis(f32::NEG_INFINITY, b, 5.), -5.);
        assert_eq!(confine_axis(f32::NAN, b, 5.), 0.);
        assert_eq!(confine_axis(2., b, 5.), 2.);
    }

    #[test]
    fn cyclic_wraps() {
        let b = Boundary::CyclicWall;
        assert!((confine_axis(5.5, b, 5.) - -4.5).abs() < 1e-5);
        assert!((confine_axis(-6., b, 5.) - 4.).abs() < 1e-5);
        assert_eq!(confine_axis(f32::INFINITY, b, 5.), 5.);

        assert_eq!(min_image(9.5, 5.), -0.5);
        assert_eq!(min_image(-9.5, 5.), 0.5);
    }

    #[test]
    fn density_errors() {
        let density = [450., 900., 225.];
        assert_eq!(max_density_error(&density, 450.), 1.);
        assert!((average_density_error(&density, 450.) - 0.5).abs() < 1e-6);
        assert_eq!(average_density_error(&[], 450.), 0.);
    }
}
