use glam::Vec2;
use log::debug;
use ndarray::Zip;

use crate::{
    error::ConfigError,
    grid::{build_grid, CellBuckets, GridStats},
    kernel::Kernel,
    params::PcisphParams,
    particle::{Particle, Particles},
    Fluid,
};

use super::wall_jitter;

/// Two-dimensional PCISPH fluid.
///
/// A sub-step runs the stages in this order:
///
/// 1. [`pressure_step`](Self::pressure_step)
/// 2. [`project`](Self::project)
/// 3. [`correct`](Self::correct)
/// 4. [`apply_external_forces`](Self::apply_external_forces)
/// 5. [`integrate`](Self::integrate)
/// 6. [`enforce_boundary`](Self::enforce_boundary)
/// 7. [`rebuild_grid`](Self::rebuild_grid)
///
/// The grid is first built at construction, so the pressure stage of the first sub-step already
/// sees a consistent grid. Each stage writes only the fields of the particle it is visiting and
/// finishes before the next one starts.
pub struct PcisphFluid2D {
    params: PcisphParams,
    kernel: Kernel,
    particles: Particles,
    grid: Box<dyn CellBuckets>,
    grid_stats: GridStats,
    /// Sub-steps run so far.
    substeps: u64,
}

impl PcisphFluid2D {
    pub fn new(params: PcisphParams, mut particles: Particles) -> Result<Self, ConfigError> {
        params.validate()?;

        if particles.is_empty() {
            return Err(ConfigError::NoParticles);
        }

        // `u32::MAX` marks unlisted particles in the cell lists.
        if particles.len() >= u32::MAX as usize {
            return Err(ConfigError::TooManyParticles { count: particles.len() });
        }

        let kernel = Kernel::new(params.smoothing_radius, params.particle_mass, params.epsilon);

        // The first correction derives velocity from the previous position, so seed it such
        // that the initial velocity survives.
        let dt = params.dt;
        Zip::from(&mut particles.previous)
            .and(&particles.positions)
            .and(&particles.velocities)
            .for_each(|last, &x, &v| *last = x - v * dt);
        particles.projected.assign(&particles.positions);

        let mut grid = build_grid(&params);
        let grid_stats = grid.rebuild(particles.positions.view(), params.schedule);

        debug!(
            "pcisph fluid with {} particles on a {}x{} grid ({:?}, {:?})",
            particles.len(),
            grid.layout().dims().x,
            grid.layout().dims().y,
            params.grid,
            params.schedule,
        );

        Ok(Self {
            params,
            kernel,
            particles,
            grid,
            grid_stats,
            substeps: 0,
        })
    }

    pub fn params(&self) -> &PcisphParams {
        &self.params
    }

    pub fn particles(&self) -> &Particles {
        &self.particles
    }

    pub fn particle(&self, i: usize) -> Particle {
        self.particles.get(i)
    }

    pub fn grid(&self) -> &dyn CellBuckets {
        self.grid.as_ref()
    }

    /// Sub-steps run since construction.
    pub fn substeps(&self) -> u64 {
        self.substeps
    }

    /// Estimates density around every particle from its current position and turns the
    /// error against the rest density into `pressure` and `pressure_vary`.
    pub fn pressure_step(&mut self) {
        let kernel = &self.kernel;
        let grid = self.grid.as_ref();
        let stiffness = self.params.stiffness;
        let near_stiffness = self.params.near_stiffness;
        let rest = kernel.mass() * self.params.rest_density;

        let Particles { positions, pressures, near_pressures, .. } = &mut self.particles;
        let positions = &*positions;

        run_pass!(
            self.params.schedule,
            Zip::from(pressures).and(near_pressures).and(positions),
            |pressure: &mut f32, near_pressure: &mut f32, &xi: &Vec2| {
                let mut density = 0.0;
                let mut near_density = 0.0;

                for j in grid.neighbors(grid.layout().cell_of(xi)) {
                    let Some(s) = kernel.sample((positions[j] - xi).length_squared()) else {
                        continue;
                    };

                    density += kernel.density(s);
                    near_density += kernel.near_density(s);
                }

                *pressure = stiffness * (density - rest);
                *near_pressure = near_stiffness * near_density;
            }
        );
    }

    /// Accumulates the pressure relaxation, surface tension and viscosity displacements of
    /// every particle into `position_proj`. Positions are left untouched.
    pub fn project(&mut self) {
        let kernel = &self.kernel;
        let grid = self.grid.as_ref();
        let dt = self.params.dt;
        let dt2 = dt * dt;
        let mass = kernel.mass();
        let kern = kernel.kern();
        let kern_norm = kernel.kern_norm();
        let surface_tension = self.params.surface_tension;
        let linear_viscosity = self.params.linear_viscosity;
        let quadratic_viscosity = self.params.quadratic_viscosity;

        let Particles { positions, projected, velocities, pressures, near_pressures, .. } =
            &mut self.particles;
        let (positions, velocities) = (&*positions, &*velocities);
        let (pressures, near_pressures) = (&*pressures, &*near_pressures);

        run_pass!(
            self.params.schedule,
            Zip::from(projected)
                .and(positions)
                .and(velocities)
                .and(pressures)
                .and(near_pressures),
            |proj: &mut Vec2, &xi: &Vec2, &vi: &Vec2, &pi: &f32, &pvi: &f32| {
                let mut xx = xi;

                for j in grid.neighbors(grid.layout().cell_of(xi)) {
                    let dx = positions[j] - xi;
                    let Some(s) = kernel.sample(dx.length_squared()) else {
                        continue;
                    };

                    let a = s.a;
                    let a2 = a * a;

                    // Relaxation
                    let d = dt2
                        * ((pvi + near_pressures[j]) * a2 * a * kern_norm
                            + (pi + pressures[j]) * a2 * kern)
                        / 2.0;
                    xx -= d * dx / (s.r * mass);

                    // Surface tension, exact for a single uniform-mass material only.
                    xx += surface_tension * a2 * kern * dx;

                    // Viscosity, for approaching pairs only.
                    let u = (vi - velocities[j]).dot(dx);
                    if u > 0.0 {
                        let u = u / s.r;
                        let impulse = 0.5 * dt * a * (linear_viscosity * u + quadratic_viscosity * u * u);
                        xx -= impulse * dx * dt;
                    }
                }

                *proj = xx;
            }
        );
    }

    /// Commits the projected positions and derives velocity from the total displacement since
    /// the last integration.
    pub fn correct(&mut self) {
        let dt = self.params.dt;
        let Particles { positions, velocities, projected, previous, .. } = &mut self.particles;

        run_pass!(
            self.params.schedule,
            Zip::from(positions).and(velocities).and(&*projected).and(&*previous),
            |x: &mut Vec2, v: &mut Vec2, &proj: &Vec2, &last: &Vec2| {
                *x = proj;
                *v = (proj - last) / dt;
            }
        );
    }

    pub fn apply_external_forces(&mut self) {
        let gravity_dt = self.params.gravity * self.params.dt;

        run_pass!(
            self.params.schedule,
            Zip::from(&mut self.particles.velocities),
            |v: &mut Vec2| *v += gravity_dt
        );
    }

    pub fn integrate(&mut self) {
        let dt = self.params.dt;
        let Particles { positions, velocities, previous, .. } = &mut self.particles;

        run_pass!(
            self.params.schedule,
            Zip::from(previous).and(positions).and(&*velocities),
            |last: &mut Vec2, x: &mut Vec2, &v: &Vec2| {
                *last = *x;
                *x += v * dt;
            }
        );
    }

    /// Clamps particles that left the domain back inside with a small random inward offset,
    /// reversing and damping the velocity component normal to the wall.
    pub fn enforce_boundary(&mut self) {
        let extent = self.params.domain();
        let jitter = self.params.boundary_jitter;
        let restitution = self.params.boundary_restitution;
        let seed = self.params.seed;
        let substep = self.substeps;
        let Particles { positions, velocities, .. } = &mut self.particles;

        run_pass!(
            self.params.schedule,
            Zip::indexed(positions).and(velocities),
            |i: usize, x: &mut Vec2, v: &mut Vec2| {
                for axis in 0..2 {
                    if x[axis] < 0.0 {
                        let offset = wall_jitter(seed, substep, i, axis) * jitter;
                        x[axis] = offset.min(extent[axis]);
                        v[axis] *= -restitution;
                    } else if x[axis] > extent[axis] {
                        let offset = wall_jitter(seed, substep, i, axis) * jitter;
                        x[axis] = (extent[axis] - offset).max(0.0);
                        v[axis] *= -restitution;
                    }
                }
            }
        );
    }

    /// Rebuilds the neighbor grid from the current positions. Must run before the next
    /// pressure stage.
    pub fn rebuild_grid(&mut self) -> GridStats {
        self.grid_stats = self.grid.rebuild(self.particles.positions.view(), self.params.schedule);
        self.grid_stats
    }
}

impl Fluid for PcisphFluid2D {
    fn substep(&mut self) -> GridStats {
        self.pressure_step();
        self.project();
        self.correct();
        self.apply_external_forces();
        self.integrate();
        self.enforce_boundary();
        let stats = self.rebuild_grid();

        self.substeps += 1;
        stats
    }

    fn grid_stats(&self) -> GridStats {
        self.grid_stats
    }

    fn substeps_per_tick(&self) -> usize {
        self.params.num_substeps
    }

    fn domain(&self) -> Vec2 {
        self.params.domain()
    }

    fn particle_radius(&self) -> f32 {
        self.params.particle_radius
    }

    fn len(&self) -> usize {
        self.particles.len()
    }

    fn position(&self, i: usize) -> Vec2 {
        self.particles.positions[i]
    }

    fn velocity(&self, i: usize) -> Vec2 {
        self.particles.velocities[i]
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        params::{GridStrategy, Schedule},
        particle::Lattice,
    };

    use super::*;

    fn still_params() -> PcisphParams {
        PcisphParams {
            gravity: Vec2::ZERO,
            stiffness: 0.0,
            near_stiffness: 0.0,
            surface_tension: 0.0,
            linear_viscosity: 0.0,
            quadratic_viscosity: 0.0,
            ..Default::default()
        }
    }

    fn single(params: PcisphParams, p: Particle) -> PcisphFluid2D {
        PcisphFluid2D::new(params, [p].into_iter().collect()).unwrap()
    }

    #[test]
    fn rejects_empty_fluid() {
        let result = PcisphFluid2D::new(PcisphParams::default(), Particles::new());
        assert!(matches!(result, Err(ConfigError::NoParticles)));
    }

    #[test]
    fn rejects_invalid_params_before_stepping() {
        let params = PcisphParams { dt: -1.0, ..Default::default() };
        let result = PcisphFluid2D::new(params, Lattice::dam(0.03).build(0));
        assert!(matches!(result, Err(ConfigError::NotPositive { name: "dt", .. })));
    }

    #[test]
    fn rejects_domain_too_large_for_the_grid() {
        let params = PcisphParams { width: 1e6, height: 1e6, ..Default::default() };
        let result = PcisphFluid2D::new(params, Lattice::dam(0.03).build(0));
        assert!(matches!(result, Err(ConfigError::GridTooLarge { .. })));
    }

    #[test]
    fn seeds_previous_position_from_velocity() {
        let params = PcisphParams::default();
        let fluid = single(params.clone(), Particle::new(Vec2::new(1.0, 1.0)).with_velocity(Vec2::new(2.0, -1.0)));
        assert_eq!(fluid.params(), &params);

        let p = fluid.particle(0);
        assert!(p.position_last.abs_diff_eq(Vec2::new(1.0, 1.0) - Vec2::new(2.0, -1.0) * params.dt, 1e-6));
        assert_eq!(p.position_proj, p.position);
    }

    #[test]
    fn external_forces_then_integrate() {
        let params = PcisphParams::default();
        let dt = params.dt;
        let mut fluid = single(params, Particle::new(Vec2::new(3.0, 2.0)).with_velocity(Vec2::new(1.0, 0.0)));

        fluid.apply_external_forces();
        fluid.integrate();

        let p = fluid.particle(0);
        let v = Vec2::new(1.0, -9.81 * dt);
        assert!(p.velocity.abs_diff_eq(v, 1e-6));
        assert_eq!(p.position_last, Vec2::new(3.0, 2.0));
        assert!(p.position.abs_diff_eq(Vec2::new(3.0, 2.0) + v * dt, 1e-6));
    }

    #[test]
    fn isolated_particle_has_negative_pressure() {
        let params = PcisphParams::default();
        let mut fluid = single(params.clone(), Particle::new(Vec2::new(3.0, 2.0)));

        fluid.pressure_step();

        let p = fluid.particle(0);
        assert!((p.pressure + params.stiffness * params.rest_density).abs() < 1e-6);
        assert_eq!(p.pressure_vary, 0.0);
    }

    #[test]
    fn near_pressure_is_never_negative() {
        let mut fluid = PcisphFluid2D::new(PcisphParams::default(), Lattice::dam(0.03).build(3)).unwrap();

        for _ in 0..5 {
            fluid.substep();
            fluid.pressure_step();
            assert!(fluid.particles().near_pressures().iter().all(|&pv| pv >= 0.0));
        }
    }

    #[test]
    fn correct_commits_projection() {
        let params = still_params();
        let dt = params.dt;
        let mut fluid = single(params, Particle::new(Vec2::new(3.0, 2.0)));

        fluid.integrate();
        fluid.particles.projected[0] = Vec2::new(3.01, 2.0);
        fluid.correct();

        let p = fluid.particle(0);
        assert_eq!(p.position, Vec2::new(3.01, 2.0));
        assert!(p.velocity.abs_diff_eq(Vec2::new(0.01, 0.0) / dt, 1e-2));
    }

    #[test]
    fn approaching_pair_is_slowed_by_viscosity() {
        let params = PcisphParams {
            gravity: Vec2::ZERO,
            stiffness: 0.0,
            near_stiffness: 0.0,
            surface_tension: 0.0,
            ..Default::default()
        };

        let particles = [
            Particle::new(Vec2::new(3.0, 2.0)).with_velocity(Vec2::new(1.0, 0.0)),
            Particle::new(Vec2::new(3.1, 2.0)).with_velocity(Vec2::new(-1.0, 0.0)),
        ];
        let mut fluid = PcisphFluid2D::new(params, particles.into_iter().collect()).unwrap();

        fluid.pressure_step();
        fluid.project();

        assert!(fluid.particle(0).position_proj.x < 3.0);
        assert!(fluid.particle(1).position_proj.x > 3.1);
    }

    #[test]
    fn boundary_keeps_particles_inside() {
        let params = PcisphParams::default();
        let extent = params.domain();
        let particles = [
            Vec2::new(-1.0, 2.0),
            Vec2::new(7.0, 2.0),
            Vec2::new(3.0, -0.5),
            Vec2::new(3.0, 4.5),
            Vec2::new(-3.0, 9.0),
            Vec2::new(3.0, 2.0),
        ]
        .map(|x| Particle::new(x).with_velocity(Vec2::new(1.0, -2.0)));

        let mut fluid = PcisphFluid2D::new(params, particles.into_iter().collect()).unwrap();
        fluid.enforce_boundary();

        for p in fluid.particles().iter() {
            assert!(p.position.cmpge(Vec2::ZERO).all() && p.position.cmple(extent).all());
        }

        assert_eq!(fluid.particle(0).velocity, Vec2::new(-0.5, -2.0));
        assert_eq!(fluid.particle(2).velocity, Vec2::new(1.0, 1.0));
        assert_eq!(fluid.particle(4).velocity, Vec2::new(-0.5, 1.0));
        assert_eq!(fluid.particle(5).velocity, Vec2::new(1.0, -2.0));
        assert_eq!(fluid.particle(5).position, Vec2::new(3.0, 2.0));
        assert!(fluid.particle(1).position.x >= extent.x - 0.001);
        assert!(fluid.particle(3).position.y >= extent.y - 0.001);
    }

    #[test]
    fn schedules_produce_identical_state() {
        let params = PcisphParams::default();
        let particles = Lattice::dam(params.particle_radius).build(9);

        let mut seq = PcisphFluid2D::new(params.clone(), particles.clone()).unwrap();
        let mut par = PcisphFluid2D::new(
            PcisphParams { schedule: Schedule::Parallel, ..params },
            particles,
        )
        .unwrap();

        for _ in 0..20 {
            assert_eq!(seq.substep(), par.substep());
        }

        assert_eq!(seq.particles().positions(), par.particles().positions());
        assert_eq!(seq.particles().velocities(), par.particles().velocities());
        assert_eq!(seq.particles().pressures(), par.particles().pressures());
    }

    #[test]
    fn grid_strategies_agree() {
        let params = PcisphParams::default();
        let particles = Lattice::dam(params.particle_radius).build(4);

        let mut sorted = PcisphFluid2D::new(params.clone(), particles.clone()).unwrap();
        let mut lists = PcisphFluid2D::new(
            PcisphParams { grid: GridStrategy::CellLists, ..params },
            particles,
        )
        .unwrap();

        for _ in 0..10 {
            sorted.substep();
            lists.substep();
        }

        for (a, b) in sorted.particles().iter().zip(lists.particles().iter()) {
            assert!(a.position.abs_diff_eq(b.position, 1e-4));
        }
    }

    #[test]
    fn substeps_are_counted() {
        let mut fluid = PcisphFluid2D::new(PcisphParams::default(), Lattice::dam(0.03).build(0)).unwrap();
        fluid.substep();
        fluid.substep();
        assert_eq!(fluid.substeps(), 2);
        assert_eq!(fluid.substeps_per_tick(), 10);
    }
}
