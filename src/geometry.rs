//! Lattice generation for the initial particle layouts.

use std::f32::consts::{PI, TAU};

use bincode::{Decode, Encode};
use lin_alg::f32::Vec3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode)]
pub enum Shape3D {
    Box,
    Sphere,
}

/// A regular box lattice. `res` points per axis, starting at `start` with spacing
/// `(end - start) / res`; `end` itself is excluded.
pub fn box_lattice(res: [u32; 3], start: Vec3, end: Vec3) -> Vec<Vec3> {
    let span = end - start;
    let spacing = Vec3::new(
        span.x / res[0] as f32,
        span.y / res[1] as f32,
        span.z / res[2] as f32,
    );

    let mut result = Vec::with_capacity(lattice_len(res));

    for ix in 0..res[0] {
        for iy in 0..res[1] {
            for iz in 0..res[2] {
                result.push(Vec3::new(
                    start.x + ix as f32 * spacing.x,
                    start.y + iy as f32 * spacing.y,
                    start.z + iz as f32 * spacing.z,
                ));
            }
        }
    }

    result
}

/// A spherical-coordinate lattice inscribed in the box `start..end`. `res` is the number of
/// polar-angle (φ), azimuth (θ) and radial subdivisions. The radius is half the box's
/// diagonal length, and shells run from `radius / res.z` out to `radius`.
///
/// Points at φ = 0 coincide across θ.
pub fn sphere_lattice(res: [u32; 3], start: Vec3, end: Vec3) -> Vec<Vec3> {
    let radius = (end - start).magnitude() / 2.;
    let center = (start + end) / 2.;

    let φ_spacing = PI / res[0] as f32;
    let θ_spacing = TAU / res[1] as f32;
    let r_spacing = radius / res[2] as f32;

    let mut result = Vec::with_capacity(lattice_len(res));

    for iφ in 0..res[0] {
        let φ = iφ as f32 * φ_spacing;
        for iθ in 0..res[1] {
            let θ = iθ as f32 * θ_spacing;
            for ir in 0..res[2] {
                let r = (ir + 1) as f32 * r_spacing;
                result.push(Vec3::new(
                    center.x + r * θ.cos() * φ.sin(),
                    center.y + r * θ.sin() * φ.sin(),
                    center.z + r * φ.cos(),
                ));
            }
        }
    }

    result
}

pub fn lattice_len(res: [u32; 3]) -> usize {
    res.iter().map(|&r| r as usize).product()
}

pub fn lattice(shape: Shape3D, res: [u32; 3], start: Vec3, end: Vec3) -> Vec<Vec3> {
    match shape {
        Shape3D::Box => box_lattice(res, start, end),
        Shape3D::Sphere => sphere_lattice(res, start, end),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_lattice_spans_extents() {
        let pts = box_lattice([4, 2, 3], Vec3::new(-1., 0., 0.), Vec3::new(1., 1., 3.));
        assert_eq!(pts.len(), 24);

        let first = pts[0];
        let last = pts[23];
        assert_eq!((first.x, first.y, first.z), (-1., 0., 0.));
        assert!((last.x - 0.5).abs() < 1e-6);
        assert!((last.y - 0.5).abs() < 1e-6);
        assert!((last.z - 2.).abs() < 1e-6);
    }

    #[test]
    fn sphere_lattice_within_radius() {
        let start = Vec3::new(-1., -1., -1.);
        let end = Vec3::new(1., 1., 1.);
        let radius = (end - start).magnitude() / 2.;

        let pts = sphere_lattice([8, 8, 4], start, end);
        assert_eq!(pts.len(), 256);

        for p in &pts {
            let r = p.magnitude();
            assert!(r <= radius + 1e-5);
            assert!(r >= radius / 4. - 1e-5);
        }
    }
}
