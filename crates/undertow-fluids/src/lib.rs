use glam::Vec2;
use grid::GridStats;

/// Runs an ndarray `Zip` either on the calling thread or across the rayon pool.
macro_rules! run_pass {
    ($schedule:expr, $zip:expr, $f:expr) => {
        match $schedule {
            $crate::params::Schedule::Sequential => $zip.for_each($f),
            $crate::params::Schedule::Parallel => $zip.par_for_each($f),
        }
    };
}

pub mod error;
pub mod grid;
pub mod kernel;
pub mod params;
pub mod particle;
pub mod pcisph;
pub mod scene;

/// A particle fluid that advances in fixed sub-steps.
pub trait Fluid {
    /// Runs one sub-step, returning the statistics of the grid rebuild that closes it.
    fn substep(&mut self) -> GridStats;

    /// Statistics of the most recent grid rebuild.
    fn grid_stats(&self) -> GridStats;

    fn substeps_per_tick(&self) -> usize;

    /// Domain extents. The domain spans `[0, width] x [0, height]`.
    fn domain(&self) -> Vec2;

    fn particle_radius(&self) -> f32;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn position(&self, i: usize) -> Vec2;

    fn velocity(&self, i: usize) -> Vec2;
}
