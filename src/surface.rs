//! Hook for a surface-reconstruction consumer (e.g. a mesher). It sees the committed
//! positions and the cell ranges once per step, right after the positions are committed.

use crate::grid::SpatialGrid;

pub struct SurfaceView<'a> {
    /// Active particles only, in the same order the grid ranges index.
    pub posits: &'a [[f32; 4]],
    pub grid: &'a SpatialGrid,
}

impl SurfaceView<'_> {
    pub fn nb_particles(&self) -> usize {
        self.posits.len()
    }
}

pub trait SurfaceConsumer: Send {
    fn on_commit(&mut self, view: &SurfaceView);
}

impl<F: FnMut(&SurfaceView) + Send> SurfaceConsumer for F {
    fn on_commit(&mut self, view: &SurfaceView) {
        self(view)
    }
}
