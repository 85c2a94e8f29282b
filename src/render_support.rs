//! Passes that only feed the renderer: density colouring, the cell occupancy detector, and
//! camera-distance sort keys. None of them affect the physics.

use lin_alg::f32::Vec3;
use rayon::prelude::*;

use crate::{context::ComputeContext, grid::SpatialGrid, util::far_first_key};

/// Colour of slots that don't take part. Alpha 0.
pub const SENTINEL_COLOR: [f32; 4] = [0., 0.1, 1., 0.];

/// Light at low density, deep blue at twice rest density or more.
pub fn density_color(density: f32, rest_density: f32) -> [f32; 4] {
    let t = (density / rest_density / 2.).clamp(0., 1.);
    let light = 1. - t;
    [0.1 + 0.6 * light, 0.3 + 0.6 * light, 1., 1.]
}

pub fn fill_colors(
    ctx: &ComputeContext,
    density: &[f32],
    nb_active: usize,
    rest_density: f32,
    colors: &mut [[f32; 4]],
) {
    ctx.run_pass("fill_color", || {
        colors.par_iter_mut().enumerate().for_each(|(i, col)| {
            *col = if i < nb_active {
                density_color(density[i], rest_density)
            } else {
                SENTINEL_COLOR
            };
        });
    });
}

/// 1 for every cell holding at least one active particle, 0 elsewhere.
pub fn fill_occupancy(
    ctx: &ComputeContext,
    grid: &SpatialGrid,
    posits: &[[f32; 4]],
    occupancy: &mut [f32],
) {
    let occupied: Vec<u32> = ctx.run_pass("occupancy", || {
        occupancy.par_iter_mut().for_each(|o| *o = 0.);

        posits
            .par_iter()
            .map(|p| grid.cell_id_of(Vec3::new(p[0], p[1], p[2])))
            .collect()
    });

    for cell in occupied {
        if let Some(o) = occupancy.get_mut(cell as usize) {
            *o = 1.;
        }
    }
}

/// Sort keys that order particles back to front from `camera`. Inactive slots sort last.
pub fn camera_keys(
    ctx: &ComputeContext,
    posits: &[[f32; 4]],
    nb_active: usize,
    camera: Vec3,
    keys: &mut [u32],
) {
    ctx.run_pass("camera_keys", || {
        keys.par_iter_mut()
            .zip(posits.par_iter())
            .enumerate()
            .for_each(|(i, (key, p))| {
                *key = if i < nb_active {
                    let d = Vec3::new(p[0], p[1], p[2]) - camera;
                    far_first_key(d.magnitude())
                } else {
                    u32::MAX
                };
            });
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelParams;

    #[test]
    fn colors_track_density() {
        let rest = density_color(450., 450.);
        let dense = density_color(2_000., 450.);
        assert!(dense[0] < rest[0]);
        assert_eq!(dense[3], 1.);
    }

    #[test]
    fn occupancy_marks_cells() {
        let ctx = ComputeContext::new(Some(2)).unwrap();
        let grid = SpatialGrid::new(&ModelParams {
            max_nb_particles: 4,
            box_size: 10.,
            grid_res: 10,
        })
        .unwrap();

        let posits = [[-4.5, -4.5, -4.5, 1.], [-4.4, -4.6, -4.2, 1.], [4.5, 4.5, 4.5, 1.]];
        let mut occ = vec![0.5; 1_000];
        fill_occupancy(&ctx, &grid, &posits, &mut occ);

        assert_eq!(occ[0], 1.);
        assert_eq!(occ[999], 1.);
        assert_eq!(occ.iter().sum::<f32>(), 2.);
    }

    #[test]
    fn far_particles_first() {
        let ctx = ComputeContext::new(Some(2)).unwrap();
        let posits = [[1., 0., 0., 1.], [4., 0., 0., 1.], [f32::INFINITY; 4]];
        let mut keys = [0; 3];
        camera_keys(&ctx, &posits, 2, Vec3::new_zero(), &mut keys);

        assert!(keys[1] < keys[0]);
        assert_eq!(keys[2], u32::MAX);
    }
}
