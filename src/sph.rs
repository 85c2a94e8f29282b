//! Smoothing kernels. Poly6 for density, the Spiky gradient for the position correction.
//! Both are zero at and beyond the effective radius.

use lin_alg::f32::Vec3;

use crate::config::KernelCoeffs;

/// Below this separation the gradient direction is undefined; treat it as zero.
const MIN_SEPARATION: f32 = 1e-6;

/// W(r) = 315/(64πh⁹) (h² - r²)³, taking r².
pub fn poly6(r_sq: f32, c: &KernelCoeffs) -> f32 {
    if r_sq >= c.h2 {
        return 0.;
    }
    let d = c.h2 - r_sq;
    c.poly6 * d * d * d
}

/// ∇W(r) = -45/(πh⁶) (h - |r|)² r̂, where `r` is `p_i - p_j`.
pub fn spiky_grad(r: Vec3, c: &KernelCoeffs) -> Vec3 {
    let len = r.magnitude();
    if len >= c.h || len < MIN_SEPARATION {
        return Vec3::new_zero();
    }
    let d = c.h - len;
    r * (c.spiky_grad * d * d / len)
}

/// Artificial pressure: s_corr = -k (W(r) / W(Δq))ⁿ. Repulsive at short range, which
/// counters clustering.
pub fn art_pressure(r_sq: f32, c: &KernelCoeffs, coeff: f32, exp: u32) -> f32 {
    if c.w_dq <= 0. {
        return 0.;
    }
    let ratio = poly6(r_sq, c) / c.w_dq;
    -coeff * ratio.powi(exp as i32)
}
