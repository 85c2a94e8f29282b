//! Uniform spatial grid over the simulation box. Cell size equals the kernel's effective
//! radius, so every neighbor within that radius lies in the 3×3×3 block of cells around a
//! particle.
//!
//! Cell ranges are half-open `[start, end)` intervals into the particle arrays once they
//! are sorted by cell id. Rebuilt every step.

use lin_alg::f32::Vec3;
use rayon::prelude::*;

use crate::{config::ModelParams, context::ComputeContext, error::ModelError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CellRange {
    pub start: u32,
    pub end: u32,
}

impl CellRange {
    pub const EMPTY: Self = Self { start: 0, end: 0 };

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

pub struct SpatialGrid {
    res: u32,
    box_size: f32,
    cell_size: f32,
    ranges: Vec<CellRange>,
}

impl SpatialGrid {
    pub fn new(params: &ModelParams) -> Result<Self, ModelError> {
        params.validate()?;

        let mut ranges = Vec::new();
        ranges.try_reserve_exact(params.nb_cells())?;
        ranges.resize(params.nb_cells(), CellRange::EMPTY);

        Ok(Self {
            res: params.grid_res,
            box_size: params.box_size,
            cell_size: params.cell_size(),
            ranges,
        })
    }

    pub fn res(&self) -> u32 {
        self.res
    }

    pub fn box_size(&self) -> f32 {
        self.box_size
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn nb_cells(&self) -> usize {
        self.ranges.len()
    }

    /// Reserved id for particles that don't take part; sorts after every real cell.
    pub fn out_of_grid_id(&self) -> u32 {
        self.ranges.len() as u32
    }

    pub fn ranges(&self) -> &[CellRange] {
        &self.ranges
    }

    pub fn range(&self, cell_id: u32) -> CellRange {
        self.ranges
            .get(cell_id as usize)
            .copied()
            .unwrap_or(CellRange::EMPTY)
    }

    /// Integer cell coordinates, clamped to the grid extents.
    pub fn cell_coords(&self, posit: Vec3) -> [u32; 3] {
        let half = self.box_size / 2.;
        let max = self.res as i64 - 1;

        // `as` saturates, and maps NaN to 0.
        let axis = |v: f32| (((v + half) / self.cell_size).floor() as i64).clamp(0, max) as u32;

        [axis(posit.x), axis(posit.y), axis(posit.z)]
    }

    pub fn cell_id(&self, coords: [u32; 3]) -> u32 {
        (coords[2] * self.res + coords[1]) * self.res + coords[0]
    }

    pub fn cell_id_of(&self, posit: Vec3) -> u32 {
        self.cell_id(self.cell_coords(posit))
    }

    /// Write a cell id for every slot: the active ones from their position, the rest the
    /// out-of-grid id.
    pub fn assign_cells(
        &self,
        ctx: &ComputeContext,
        posits: &[Vec3],
        nb_active: usize,
        cell_ids: &mut [u32],
    ) {
        let out_of_grid = self.out_of_grid_id();

        ctx.run_pass("assign_cells", || {
            cell_ids
                .par_iter_mut()
                .zip(posits.par_iter())
                .enumerate()
                .for_each(|(i, (id, posit))| {
                    *id = if i < nb_active {
                        self.cell_id_of(*posit)
                    } else {
                        out_of_grid
                    };
                });
        });
    }

    /// Rebuild every cell's range from cell ids sorted ascending. Out-of-grid ids at the
    /// tail are ignored.
    pub fn build_ranges(&mut self, ctx: &ComputeContext, sorted_ids: &[u32]) {
        let nb_cells = self.ranges.len() as u32;
        let ranges = &mut self.ranges;

        ctx.run_pass("reset_cell_ranges", || {
            ranges.par_iter_mut().for_each(|r| *r = CellRange::EMPTY);
        });

        let n = sorted_ids.partition_point(|&c| c < nb_cells);
        let ids = &sorted_ids[..n];

        // (cell, bound) at each run boundary.
        let (starts, ends) = ctx.run_pass("find_cell_bounds", || {
            let starts: Vec<(u32, u32)> = (0..n)
                .into_par_iter()
                .filter(|&i| i == 0 || ids[i] != ids[i - 1])
                .map(|i| (ids[i], i as u32))
                .collect();
            let ends: Vec<(u32, u32)> = (0..n)
                .into_par_iter()
                .filter(|&i| i + 1 == n || ids[i] != ids[i + 1])
                .map(|i| (ids[i], i as u32 + 1))
                .collect();
            (starts, ends)
        });

        for (cell, start) in starts {
            ranges[cell as usize].start = start;
        }
        for (cell, end) in ends {
            ranges[cell as usize].end = end;
        }
    }

    /// Limit every cell to its first `max_per_cell` particles.
    pub fn clamp_ranges(&mut self, ctx: &ComputeContext, max_per_cell: u32) {
        let ranges = &mut self.ranges;
        ctx.run_pass("clamp_cell_ranges", || {
            ranges.par_iter_mut().for_each(|r| {
                if r.len() > max_per_cell as usize {
                    r.end = r.start + max_per_cell;
                }
            });
        });
    }

    /// Visit every particle index in the 27 cells around `posit`. Each index is visited once.
    /// Callers filter by distance.
    pub fn for_each_neighbor<F: FnMut(usize)>(&self, posit: Vec3, mut f: F) {
        let [cx, cy, cz] = self.cell_coords(posit);
        let max = self.res - 1;

        for z in cz.saturating_sub(1)..=(cz + 1).min(max) {
            for y in cy.saturating_sub(1)..=(cy + 1).min(max) {
                for x in cx.saturating_sub(1)..=(cx + 1).min(max) {
                    let r = self.ranges[self.cell_id([x, y, z]) as usize];
                    for j in r.start..r.end {
                        f(j as usize);
                    }
                }
            }
        }
    }

    /// Indices of particles strictly within `radius` of `posit`. Mainly for diagnostics and
    /// tests; the solver passes use `for_each_neighbor` directly.
    pub fn neighbors_within(&self, posit: Vec3, radius: f32, posits: &[Vec3]) -> Vec<usize> {
        let r2 = radius * radius;
        let mut result = Vec::new();

        self.for_each_neighbor(posit, |j| {
            if (posits[j] - posit).magnitude_squared() < r2 {
                result.push(j);
            }
        });

        result
    }
}
