//! Invariants of the grid, sorter, boundary and solver, checked on randomized inputs.

use std::{collections::HashMap, sync::Arc};

use lin_alg::f32::Vec3;
use pbf_fluids::{
    config::{Config, FluidParams, ModelParams},
    geometry::Shape3D,
    model::Boundary,
    scene::{self, SceneRegion, SENTINEL_POSIT},
    solver, ComputeContext, InteropBuffers, PositionBasedFluids, RadixSort, SimulationBackend,
    SpatialGrid,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn ctx() -> Arc<ComputeContext> {
    Arc::new(ComputeContext::new(Some(4)).unwrap())
}

fn small_model(capacity: usize) -> PositionBasedFluids {
    let mut config = Config::default();
    config.model.max_nb_particles = capacity;

    let interop = InteropBuffers::new(capacity, config.model.nb_cells()).unwrap();
    let model = PositionBasedFluids::new(ctx(), config, interop);
    assert!(model.is_init(), "{:?}", model.construction_error());
    model
}

/// Bin `posits` into the grid: assign cells, sort (posits follow), build ranges.
fn bin(ctx: &Arc<ComputeContext>, grid: &mut SpatialGrid, posits: &mut Vec<Vec3>) {
    let n = posits.len();
    let mut cell_ids = vec![0; n];
    grid.assign_cells(ctx, posits, n, &mut cell_ids);

    let mut sorter = RadixSort::new(Arc::clone(ctx), n).unwrap();
    sorter.sort(&mut cell_ids, &mut [posits]).unwrap();
    grid.build_ranges(ctx, &cell_ids);
}

fn random_posits(rng: &mut StdRng, n: usize, half: f32) -> Vec<Vec3> {
    (0..n)
        .map(|_| {
            Vec3::new(
                rng.random_range(-half..half),
                rng.random_range(-half..half),
                rng.random_range(-half..half),
            )
        })
        .collect()
}

#[test]
fn sentinels_fill_unused_capacity() {
    let capacity = 64;

    for count in [0, 1, 17, 63, 64] {
        let regions = [SceneRegion {
            shape: Shape3D::Box,
            res: [count, 1, 1],
            start: Vec3::new(-1., 0., 0.),
            end: Vec3::new(1., 0.1, 0.1),
        }];
        let mut posits = vec![[0.; 4]; capacity];
        let n = scene::fill_particles(&regions, &mut posits, 0.01, 5., 9).unwrap();

        assert_eq!(n, count as usize);
        assert_eq!(posits.iter().filter(|p| p[0].is_finite()).count(), n);
        assert!(posits[n..].iter().all(|p| *p == SENTINEL_POSIT));
    }
}

#[test]
fn reset_leaves_exact_active_count() {
    let model = small_model(5_000);
    let n = model.nb_particles();
    assert_eq!(n, 4_096);

    let posits = model.interop().unwrap().posits.read();
    assert!(posits[..n].iter().all(|p| p.iter().all(|v| v.is_finite())));
    assert!(posits[n..].iter().all(|p| p[0].is_infinite() && p[3] == 0.));
}

#[test]
fn cell_ranges_cover_active_particles() {
    let mut model = small_model(4_096);

    for _ in 0..5 {
        model.update().unwrap();

        let grid = model.grid().unwrap();
        let total: usize = grid.ranges().iter().map(|r| r.len()).sum();
        assert_eq!(total, model.nb_particles());

        let mut prev_end = 0;
        for r in grid.ranges().iter().filter(|r| !r.is_empty()) {
            assert!(prev_end <= r.start);
            prev_end = r.end;
        }
    }
}

#[test]
fn sorting_sorted_keys_is_identity() {
    let mut rng = StdRng::seed_from_u64(11);
    let n = 3_000;

    let mut keys: Vec<u32> = (0..n).map(|_| rng.random_range(0..5_000)).collect();
    let mut posits = random_posits(&mut rng, n, 5.);
    let mut sorter = RadixSort::new(ctx(), n).unwrap();
    sorter.sort(&mut keys, &mut [&mut posits]).unwrap();

    let keys_before = keys.clone();
    let posits_before: Vec<[f32; 3]> = posits.iter().map(|p| [p.x, p.y, p.z]).collect();

    sorter.sort(&mut keys, &mut [&mut posits]).unwrap();

    assert_eq!(keys, keys_before);
    let posits_after: Vec<[f32; 3]> = posits.iter().map(|p| [p.x, p.y, p.z]).collect();
    assert_eq!(posits_after, posits_before);
}

#[test]
fn neighbor_search_matches_brute_force() {
    let ctx = ctx();
    let params = ModelParams {
        max_nb_particles: 2_500,
        box_size: 10.,
        grid_res: 30,
    };
    let mut grid = SpatialGrid::new(&params).unwrap();
    let h = params.cell_size();

    let mut rng = StdRng::seed_from_u64(42);
    // Concentrated, so each probe has a useful number of neighbors.
    let mut posits = random_posits(&mut rng, 2_500, 1.5);
    bin(&ctx, &mut grid, &mut posits);

    for _ in 0..200 {
        let probe = Vec3::new(
            rng.random_range(-1.6..1.6),
            rng.random_range(-1.6..1.6),
            rng.random_range(-1.6..1.6),
        );

        let mut found = grid.neighbors_within(probe, h, &posits);
        found.sort_unstable();

        let expected: Vec<usize> = (0..posits.len())
            .filter(|&j| (posits[j] - probe).magnitude_squared() < h * h)
            .collect();

        assert_eq!(found, expected);
    }

    // Corners and faces of the box.
    let mut posits = random_posits(&mut rng, 2_000, 5.);
    bin(&ctx, &mut grid, &mut posits);
    for probe in [Vec3::new(-5., -5., -5.), Vec3::new(5., 4.9, -5.), Vec3::new(0., 5., 0.)] {
        let mut found = grid.neighbors_within(probe, h, &posits);
        found.sort_unstable();
        let expected: Vec<usize> = (0..posits.len())
            .filter(|&j| (posits[j] - probe).magnitude_squared() < h * h)
            .collect();
        assert_eq!(found, expected);
    }
}

#[test]
fn boundary_keeps_positions_in_box() {
    let ctx = ctx();
    let half = 5.;
    let mut rng = StdRng::seed_from_u64(5);

    let mut inputs: Vec<Vec3> = (0..1_000)
        .map(|_| {
            Vec3::new(
                rng.random_range(-1e6..1e6),
                rng.random_range(-20.0..20.),
                rng.random_range(-5.5..5.5),
            )
        })
        .collect();
    inputs.extend([
        Vec3::new(f32::INFINITY, f32::NEG_INFINITY, f32::NAN),
        Vec3::new(f32::MAX, f32::MIN, 5.),
        Vec3::new(-5., 5., 0.),
    ]);

    for boundary in [Boundary::BouncingWall, Boundary::CyclicWall] {
        let mut pred = inputs.clone();
        solver::apply_boundary(&ctx, &mut pred, boundary, half);

        for p in &pred {
            for v in [p.x, p.y, p.z] {
                assert!((-half..=half).contains(&v), "{boundary:?}: {v}");
            }
        }
    }
}

#[test]
fn jacobi_iterations_reduce_density_error() {
    let ctx = ctx();
    let params = ModelParams {
        max_nb_particles: 512,
        box_size: 10.,
        grid_res: 30,
    };
    let mut fluid = FluidParams::default();
    fluid.effect_radius = params.cell_size();
    let c = fluid.kernel_coeffs();

    // 8³ particles, packed tighter than rest spacing.
    let spacing = 0.09;
    let mut pred = Vec::new();
    for i in 0..8 {
        for j in 0..8 {
            for k in 0..8 {
                pred.push(
                    Vec3::new(i as f32, j as f32, k as f32) * spacing
                        - Vec3::new(3.5, 3.5, 3.5) * spacing,
                );
            }
        }
    }

    let mut grid = SpatialGrid::new(&params).unwrap();
    bin(&ctx, &mut grid, &mut pred);

    let n = pred.len();
    let mut density = vec![0.; n];
    let mut constraint = vec![0.; n];
    let mut corr = vec![Vec3::new_zero(); n];

    solver::compute_density(&ctx, &grid, &pred, &mut density, &c);
    let initial = solver::max_density_error(&density, fluid.rest_density);
    assert!(initial > 1., "cluster should start compressed: {initial}");

    let mut errors = vec![initial];
    for _ in 0..6 {
        solver::jacobi_iteration(
            &ctx,
            &grid,
            &mut pred,
            &mut density,
            &mut constraint,
            &mut corr,
            &c,
            &fluid,
        );
        solver::compute_density(&ctx, &grid, &pred, &mut density, &c);
        errors.push(solver::max_density_error(&density, fluid.rest_density));
    }

    for w in errors.windows(2) {
        assert!(w[1] <= w[0] + 1e-4 * initial, "{errors:?}");
    }
    assert!(errors[6] < errors[0], "{errors:?}");
}

#[test]
fn pause_freezes_particles() {
    let mut model = small_model(4_096);
    for _ in 0..5 {
        model.update().unwrap();
    }
    model.set_pause(true).unwrap();

    let snapshot = |model: &PositionBasedFluids| {
        let p = model.particles().unwrap();
        let posits = model.interop().unwrap().posits.read();
        let n = model.nb_particles();

        (0..n)
            .map(|i| {
                let v = p.vel[i];
                (p.id[i], (posits[i], [v.x, v.y, v.z], p.density[i]))
            })
            .collect::<HashMap<_, _>>()
    };

    let before = snapshot(&model);

    for step in 0..4 {
        // Camera moves around; ordering may change.
        model
            .set_camera(Vec3::new(20. * (step as f32 - 1.5), 3., -12.))
            .unwrap();
        model.update().unwrap();

        let keys = &model.particles().unwrap().camera_key[..model.nb_particles()];
        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
    }

    assert!(model.is_pause());
    assert_eq!(snapshot(&model), before);
}
