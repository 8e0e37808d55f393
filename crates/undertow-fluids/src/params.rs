use glam::Vec2;

use crate::{error::ConfigError, grid::GridLayout};

/// How the spatial grid is rebuilt between sub-steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum GridStrategy {
    /// Two-pass counting sort into a flat lookup array. Safe for parallel schedules.
    #[default]
    CountingSort,
    /// Mutable per-cell lists with swap-remove migration. Always rebuilt on one thread.
    CellLists,
}

/// Whether per-particle stages run on the calling thread or across the rayon pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Schedule {
    #[default]
    Sequential,
    Parallel,
}

/// Immutable solver configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PcisphParams {
    /// Smoothing radius `h`. Pairs further apart than this do not interact.
    pub smoothing_radius: f32,
    /// Radius used for lattice spacing and rendering.
    pub particle_radius: f32,
    pub rest_density: f32,
    /// Scales density error into `pressure`.
    pub stiffness: f32,
    /// Scales near density into `pressure_vary`.
    pub near_stiffness: f32,
    pub surface_tension: f32,
    pub linear_viscosity: f32,
    pub quadratic_viscosity: f32,
    /// Mass shared by every particle. Non-uniform masses are not supported.
    pub particle_mass: f32,
    /// Sub-steps per tick.
    pub num_substeps: usize,
    /// Fixed sub-step length in seconds.
    pub dt: f32,
    pub gravity: Vec2,
    pub width: f32,
    pub height: f32,
    /// Grid cell side. Must be at least `smoothing_radius`.
    pub cell_size: f32,
    /// Maximum particles listed per grid cell. Excess particles are dropped for that rebuild.
    pub cell_capacity: usize,
    /// Pairs closer than this are treated as degenerate and skipped.
    pub epsilon: f32,
    /// Upper bound of the inward offset applied when a particle is clamped to a wall.
    pub boundary_jitter: f32,
    /// Fraction of the normal velocity kept (and reversed) on a wall hit.
    pub boundary_restitution: f32,
    pub grid: GridStrategy,
    pub schedule: Schedule,
    /// Seeds boundary jitter.
    pub seed: u64,
}

impl Default for PcisphParams {
    fn default() -> Self {
        let particle_radius = 0.03;
        let smoothing_radius = 6.0 * particle_radius;
        let num_substeps = 10;

        Self {
            smoothing_radius,
            particle_radius,
            rest_density: 35.0,
            stiffness: 0.08,
            near_stiffness: 0.1,
            surface_tension: 0.0001,
            linear_viscosity: 0.25,
            quadratic_viscosity: 0.5,
            particle_mass: 1.0,
            num_substeps,
            dt: 1.0 / 60.0 / num_substeps as f32,
            gravity: Vec2::new(0.0, -9.81),
            width: 6.0,
            height: 4.0,
            cell_size: smoothing_radius,
            cell_capacity: 32,
            epsilon: 0.00001,
            boundary_jitter: 0.001,
            boundary_restitution: 0.5,
            grid: GridStrategy::default(),
            schedule: Schedule::default(),
            seed: 0,
        }
    }
}

impl PcisphParams {
    /// The wide tank setup: a 52 x 30 domain with 0.2 cells.
    pub fn tank() -> Self {
        Self {
            width: 52.0,
            height: 30.0,
            cell_size: 0.2,
            ..Self::default()
        }
    }

    /// Sets `dt` so that one tick of `num_substeps` sub-steps spans one frame at `fps`. Leaves
    /// `dt` alone while `num_substeps` is zero, so that `validate` reports the missing sub-steps.
    pub fn with_frame_rate(mut self, fps: u32) -> Self {
        if self.num_substeps > 0 {
            self.dt = 1.0 / fps as f32 / self.num_substeps as f32;
        }
        self
    }

    /// Sets the sub-step count, keeping the tick duration unchanged.
    pub fn with_substeps(mut self, num_substeps: usize) -> Self {
        if num_substeps > 0 {
            self.dt *= self.num_substeps as f32 / num_substeps as f32;
        }
        self.num_substeps = num_substeps;
        self
    }

    pub fn domain(&self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }

    /// Length of one tick in seconds.
    pub fn tick_duration(&self) -> f32 {
        self.dt * self.num_substeps as f32
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("smoothing radius", self.smoothing_radius)?;
        positive("particle radius", self.particle_radius)?;
        positive("particle mass", self.particle_mass)?;
        positive("dt", self.dt)?;
        positive("width", self.width)?;
        positive("height", self.height)?;
        positive("cell size", self.cell_size)?;
        positive("epsilon", self.epsilon)?;

        non_negative("rest density", self.rest_density)?;
        non_negative("stiffness", self.stiffness)?;
        non_negative("near stiffness", self.near_stiffness)?;
        non_negative("surface tension", self.surface_tension)?;
        non_negative("linear viscosity", self.linear_viscosity)?;
        non_negative("quadratic viscosity", self.quadratic_viscosity)?;
        non_negative("boundary jitter", self.boundary_jitter)?;

        if !(0.0..=1.0).contains(&self.boundary_restitution) {
            return Err(ConfigError::Restitution(self.boundary_restitution));
        }

        if !self.gravity.is_finite() {
            return Err(ConfigError::Gravity(self.gravity.into()));
        }

        if self.num_substeps == 0 {
            return Err(ConfigError::NoSubsteps);
        }

        if self.cell_capacity == 0 {
            return Err(ConfigError::NoCellCapacity);
        }

        if self.cell_capacity > u32::MAX as usize {
            return Err(ConfigError::CellCapacityTooLarge(self.cell_capacity));
        }

        if self.cell_size < self.smoothing_radius {
            return Err(ConfigError::CellTooSmall {
                cell_size: self.cell_size,
                smoothing_radius: self.smoothing_radius,
            });
        }

        let dims = GridLayout::dims_for(self.width, self.height, self.cell_size);
        if GridLayout::checked_num_cells(dims).is_none() {
            return Err(ConfigError::GridTooLarge { cells_x: dims.x, cells_y: dims.y });
        }

        Ok(())
    }
}

fn positive(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}

fn non_negative(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { name, value })
    }
}
