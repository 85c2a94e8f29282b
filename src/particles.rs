//! Per-particle state, as parallel arrays sized to capacity. Slots past the active count
//! hold sentinels and are skipped by every pass.
//!
//! Committed positions and colours live in the interop buffers (`interop.rs`), not here.

use std::collections::TryReserveError;

use lin_alg::f32::Vec3;

use crate::{
    error::SortError,
    sort::{Permute, RadixSort},
};

fn alloc<T: Clone>(len: usize, value: T) -> Result<Vec<T>, TryReserveError> {
    let mut result = Vec::new();
    result.try_reserve_exact(len)?;
    result.resize(len, value);
    Ok(result)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortKey {
    /// Spatial locality, for neighbor ranges.
    Cell,
    /// Back to front, for translucent compositing.
    Camera,
}

pub struct ParticleBuffers {
    /// Predicted position; corrected in place by each Jacobi iteration.
    pub pred_posit: Vec<Vec3>,
    /// Position correction from the current Jacobi iteration.
    pub corr: Vec<Vec3>,
    pub vel: Vec<Vec3>,
    /// Velocity snapshot before the stabilization passes.
    pub vel_prev: Vec<Vec3>,
    pub vort: Vec<Vec3>,
    pub density: Vec<f32>,
    /// λ
    pub constraint: Vec<f32>,
    pub cell_id: Vec<u32>,
    pub camera_key: Vec<u32>,
    /// Stable across sorts.
    pub id: Vec<u32>,
}

impl ParticleBuffers {
    pub fn new(capacity: usize) -> Result<Self, TryReserveError> {
        let zero = Vec3::new_zero();

        Ok(Self {
            pred_posit: alloc(capacity, zero)?,
            corr: alloc(capacity, zero)?,
            vel: alloc(capacity, zero)?,
            vel_prev: alloc(capacity, zero)?,
            vort: alloc(capacity, zero)?,
            density: alloc(capacity, 0.)?,
            constraint: alloc(capacity, 0.)?,
            cell_id: alloc(capacity, 0)?,
            camera_key: alloc(capacity, u32::MAX)?,
            id: alloc(capacity, 0)?,
        })
    }

    pub fn capacity(&self) -> usize {
        self.id.len()
    }

    /// Clear all state, and take predicted positions from the (freshly initialized)
    /// committed ones.
    pub fn reset(&mut self, posits: &[[f32; 4]]) {
        let zero = Vec3::new_zero();

        for (pred, p) in self.pred_posit.iter_mut().zip(posits) {
            *pred = Vec3::new(p[0], p[1], p[2]);
        }
        for v in [&mut self.corr, &mut self.vel, &mut self.vel_prev, &mut self.vort] {
            v.fill(zero);
        }
        self.density.fill(0.);
        self.constraint.fill(0.);
        self.cell_id.fill(0);
        self.camera_key.fill(u32::MAX);

        for (i, id) in self.id.iter_mut().enumerate() {
            *id = i as u32;
        }
    }

    /// Reorder every particle by `key` (ascending), along with the interop positions and
    /// colours. Only the first `nb_active` slots take part; sentinels stay at the tail.
    pub fn sort_by(
        &mut self,
        key: SortKey,
        sorter: &mut RadixSort,
        nb_active: usize,
        posits: &mut Vec<[f32; 4]>,
        colors: &mut Vec<[f32; 4]>,
    ) -> Result<(), SortError> {
        let Self {
            pred_posit,
            corr,
            vel,
            vel_prev,
            vort,
            density,
            constraint,
            cell_id,
            camera_key,
            id,
        } = self;

        let keys = match key {
            SortKey::Cell => cell_id,
            SortKey::Camera => camera_key,
        };

        let mut attributes: [&mut dyn Permute; 10] = [
            pred_posit, corr, vel, vel_prev, vort, density, constraint, id, posits, colors,
        ];

        sorter.sort(&mut keys[..nb_active], &mut attributes)
    }
}
