use glam::Vec2;
use log::{info, warn};

use crate::{grid::GridStats, Fluid};

/// Counters gathered while stepping, for tuning the grid's cell capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// Most particles seen in a single grid cell over every rebuild so far. Never decreases.
    pub max_cell_occupancy: usize,
    /// Most particles dropped for capacity by a single rebuild during the last tick.
    pub dropped: usize,
    /// Ticks run so far.
    pub ticks: u64,
    /// Sub-steps run so far.
    pub substeps: u64,
}

/// Particle positions and speeds taken after a tick, for a renderer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub positions: Vec<Vec2>,
    pub speeds: Vec<f32>,
}

pub struct Scene<F> {
    /// The fluid for this scene.
    pub fluid: F,
    /// Diagnostics gathered so far.
    diagnostics: Diagnostics,
}

impl<F: Fluid> Scene<F> {
    pub fn new(fluid: F) -> Self {
        let stats = fluid.grid_stats();

        Self {
            fluid,
            diagnostics: Diagnostics {
                max_cell_occupancy: stats.max_occupancy,
                dropped: stats.dropped,
                ..Default::default()
            },
        }
    }

    /// Domain size.
    #[inline(always)]
    pub fn size(&self) -> Vec2 {
        self.fluid.domain()
    }

    #[inline(always)]
    pub fn particle_radius(&self) -> f32 {
        self.fluid.particle_radius()
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    /// Advances the fluid by one tick: a fixed number of fixed-length sub-steps.
    pub fn step(&mut self) {
        let substeps = self.fluid.substeps_per_tick();
        let mut worst = GridStats::default();

        for _ in 0..substeps {
            worst = worst.worst(self.fluid.substep());
        }

        self.diagnostics.ticks += 1;
        self.diagnostics.substeps += substeps as u64;
        self.diagnostics.dropped = worst.dropped;

        if worst.max_occupancy > self.diagnostics.max_cell_occupancy {
            self.diagnostics.max_cell_occupancy = worst.max_occupancy;
            info!("new cell max: {}", worst.max_occupancy);
        }

        if worst.dropped > 0 {
            warn!(
                "tick {}: up to {} particles dropped from full grid cells",
                self.diagnostics.ticks,
                worst.dropped,
            );
        }
    }

    pub fn iter_particles(&self) -> impl Iterator<Item = (Vec2, Vec2)> + '_ {
        (0..self.fluid.len()).map(|i| (self.fluid.position(i), self.fluid.velocity(i)))
    }

    pub fn snapshot(&self) -> Snapshot {
        let (positions, speeds) = self.iter_particles()
            .map(|(p, v)| (p, v.length()))
            .unzip();

        Snapshot { positions, speeds }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        params::PcisphParams,
        particle::Lattice,
        pcisph::d2::PcisphFluid2D,
    };

    use super::*;

    fn scene() -> Scene<PcisphFluid2D> {
        let params = PcisphParams::default();
        let particles = Lattice::dam(params.particle_radius).build(0);
        Scene::new(PcisphFluid2D::new(params, particles).unwrap())
    }

    #[test]
    fn tick_runs_every_substep() {
        let mut scene = scene();
        scene.step();
        scene.step();

        let diagnostics = scene.diagnostics();
        assert_eq!(diagnostics.ticks, 2);
        assert_eq!(diagnostics.substeps, 20);
        assert_eq!(scene.fluid.substeps(), 20);
    }

    #[test]
    fn cell_maximum_never_decreases() {
        let mut scene = scene();
        let mut last = scene.diagnostics().max_cell_occupancy;
        assert!(last > 0);

        for _ in 0..30 {
            scene.step();
            let max = scene.diagnostics().max_cell_occupancy;
            assert!(max >= last);
            last = max;
        }
    }

    #[test]
    fn snapshot_matches_particles() {
        let mut scene = scene();
        scene.step();

        let snapshot = scene.snapshot();
        assert_eq!(snapshot.positions.len(), 500);
        assert_eq!(snapshot.speeds.len(), 500);

        for ((p, v), (&sp, &ss)) in scene.iter_particles().zip(snapshot.positions.iter().zip(&snapshot.speeds)) {
            assert_eq!(p, sp);
            assert_eq!(v.length(), ss);
        }
    }

    #[test]
    fn water_falls_under_gravity() {
        let mut scene = scene();
        let before: f32 = scene.snapshot().positions.iter().map(|p| p.y).sum();

        for _ in 0..5 {
            scene.step();
        }

        let after: f32 = scene.snapshot().positions.iter().map(|p| p.y).sum();
        assert!(after < before);
    }
}
