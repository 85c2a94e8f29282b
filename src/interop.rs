//! Buffers shared with the rendering host. The solver writes positions, colours and cell
//! occupancy while it holds a frame; the host reads them between frames. The camera
//! position goes the other way: written by the host, read by the solver.

use std::sync::Arc;

use lin_alg::f32::Vec3;
use parking_lot::{RwLock, RwLockWriteGuard};

use crate::error::ModelError;

pub type InteropBuffer<T> = Arc<RwLock<Vec<T>>>;

/// Fixed layouts: 4 floats per particle for positions (xyz, and 1 active / 0 inactive)
/// and colours, 1 float per cell for occupancy (0 or 1), 3 for the camera.
#[derive(Clone)]
pub struct InteropBuffers {
    pub posits: InteropBuffer<[f32; 4]>,
    pub colors: InteropBuffer<[f32; 4]>,
    pub occupancy: InteropBuffer<f32>,
    pub camera: Arc<RwLock<[f32; 3]>>,
}

impl InteropBuffers {
    /// Allocate buffers for `nb_particles` particles and `nb_cells` cells. Hosts that bring
    /// their own can build the struct directly; `validate` checks it.
    pub fn new(nb_particles: usize, nb_cells: usize) -> Result<Self, ModelError> {
        let mut posits = Vec::new();
        posits.try_reserve_exact(nb_particles)?;
        posits.resize(nb_particles, [0.; 4]);

        let mut colors = Vec::new();
        colors.try_reserve_exact(nb_particles)?;
        colors.resize(nb_particles, [0.; 4]);

        let mut occupancy = Vec::new();
        occupancy.try_reserve_exact(nb_cells)?;
        occupancy.resize(nb_cells, 0.);

        Ok(Self {
            posits: Arc::new(RwLock::new(posits)),
            colors: Arc::new(RwLock::new(colors)),
            occupancy: Arc::new(RwLock::new(occupancy)),
            camera: Arc::new(RwLock::new([0.; 3])),
        })
    }

    pub fn validate(&self, nb_particles: usize, nb_cells: usize) -> Result<(), ModelError> {
        let check = |name, len, expected| {
            if len < expected {
                Err(ModelError::InteropTooSmall {
                    name,
                    len,
                    expected,
                })
            } else {
                Ok(())
            }
        };

        check("posits", self.posits.read().len(), nb_particles)?;
        check("colors", self.colors.read().len(), nb_particles)?;
        check("occupancy", self.occupancy.read().len(), nb_cells)
    }

    pub fn set_camera(&self, posit: Vec3) {
        *self.camera.write() = [posit.x, posit.y, posit.z];
    }

    /// Start a frame. Blocks until the host has released its read locks. Dropping the
    /// frame releases the buffers.
    pub fn acquire(&self) -> InteropFrame<'_> {
        let c = *self.camera.read();

        InteropFrame {
            posits: self.posits.write(),
            colors: self.colors.write(),
            occupancy: self.occupancy.write(),
            camera: Vec3::new(c[0], c[1], c[2]),
        }
    }
}

pub struct InteropFrame<'a> {
    pub posits: RwLockWriteGuard<'a, Vec<[f32; 4]>>,
    pub colors: RwLockWriteGuard<'a, Vec<[f32; 4]>>,
    pub occupancy: RwLockWriteGuard<'a, Vec<f32>>,
    /// Snapshot at acquire time.
    pub camera: Vec3,
}
