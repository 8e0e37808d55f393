use glam::{UVec2, Vec2};
use ndarray::{Array0, Array1, ArrayView1, Axis};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// One particle's full state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Particle {
    /// Current position.
    pub position: Vec2,
    /// Position proposed by the projection stage, committed by the correction stage.
    pub position_proj: Vec2,
    /// Position before the last integration.
    pub position_last: Vec2,
    pub velocity: Vec2,
    /// Stiffness-scaled density error. Negative when under-dense.
    pub pressure: f32,
    /// Near-field pressure. Never negative.
    pub pressure_vary: f32,
}

impl Particle {
    /// A particle at rest at `position`.
    pub fn new(position: Vec2) -> Self {
        Self {
            position,
            position_proj: position,
            position_last: position,
            ..Default::default()
        }
    }

    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.velocity = velocity;
        self
    }
}

/// Particle store, one array per field.
///
/// Stages write one field while reading others across all particles, which the split layout
/// allows without aliasing.
#[derive(Debug, Clone, Default)]
pub struct Particles {
    pub(crate) positions: Array1<Vec2>,
    pub(crate) projected: Array1<Vec2>,
    pub(crate) previous: Array1<Vec2>,
    pub(crate) velocities: Array1<Vec2>,
    pub(crate) pressures: Array1<f32>,
    pub(crate) near_pressures: Array1<f32>,
}

impl Particles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, p: Particle) {
        let _ = self.positions.push(Axis(0), Array0::from_elem((), p.position).view());
        let _ = self.projected.push(Axis(0), Array0::from_elem((), p.position_proj).view());
        let _ = self.previous.push(Axis(0), Array0::from_elem((), p.position_last).view());
        let _ = self.velocities.push(Axis(0), Array0::from_elem((), p.velocity).view());
        let _ = self.pressures.push(Axis(0), Array0::from_elem((), p.pressure).view());
        let _ = self.near_pressures.push(Axis(0), Array0::from_elem((), p.pressure_vary).view());
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Panics if `i` is out of range.
    pub fn get(&self, i: usize) -> Particle {
        Particle {
            position: self.positions[i],
            position_proj: self.projected[i],
            position_last: self.previous[i],
            velocity: self.velocities[i],
            pressure: self.pressures[i],
            pressure_vary: self.near_pressures[i],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Particle> + '_ {
        (0..self.len()).map(|i| self.get(i))
    }

    pub fn positions(&self) -> ArrayView1<Vec2> {
        self.positions.view()
    }

    pub fn velocities(&self) -> ArrayView1<Vec2> {
        self.velocities.view()
    }

    pub fn pressures(&self) -> ArrayView1<f32> {
        self.pressures.view()
    }

    pub fn near_pressures(&self) -> ArrayView1<f32> {
        self.near_pressures.view()
    }

    /// Velocity magnitudes, for coloring.
    pub fn speeds(&self) -> Array1<f32> {
        self.velocities.mapv(Vec2::length)
    }
}

impl FromIterator<Particle> for Particles {
    fn from_iter<I: IntoIterator<Item = Particle>>(iter: I) -> Self {
        let (mut positions, mut projected, mut previous) = (Vec::new(), Vec::new(), Vec::new());
        let (mut velocities, mut pressures, mut near_pressures) = (Vec::new(), Vec::new(), Vec::new());

        for p in iter {
            positions.push(p.position);
            projected.push(p.position_proj);
            previous.push(p.position_last);
            velocities.push(p.velocity);
            pressures.push(p.pressure);
            near_pressures.push(p.pressure_vary);
        }

        Self {
            positions: Array1::from_vec(positions),
            projected: Array1::from_vec(projected),
            previous: Array1::from_vec(previous),
            velocities: Array1::from_vec(velocities),
            pressures: Array1::from_vec(pressures),
            near_pressures: Array1::from_vec(near_pressures),
        }
    }
}

/// A rectangular block of particles at rest, each nudged by a small random offset so that
/// the lattice's symmetry is broken.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lattice {
    /// Position of the first particle.
    pub origin: Vec2,
    /// Particles along each axis.
    pub count: UVec2,
    pub spacing: f32,
    /// Upper bound of the random offset added on each axis.
    pub jitter: f32,
}

impl Lattice {
    /// A 25 x 20 block for the default 6 x 4 domain.
    pub fn dam(particle_radius: f32) -> Self {
        Self {
            origin: Vec2::new(2.0, 2.0),
            count: UVec2::new(25, 20),
            spacing: 3.0 * particle_radius,
            jitter: 0.001,
        }
    }

    /// A 410 x 120 block for the tank domain.
    pub fn tank(particle_radius: f32) -> Self {
        Self {
            origin: Vec2::new(1.0, 2.0),
            count: UVec2::new(410, 120),
            spacing: 4.0 * particle_radius,
            jitter: 0.001,
        }
    }

    pub fn len(&self) -> usize {
        (self.count.x * self.count.y) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Particles are laid out column by column, `y` varying fastest.
    pub fn build(&self, seed: u64) -> Particles {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut particles = Vec::with_capacity(self.len());

        for x in 0..self.count.x {
            for y in 0..self.count.y {
                let offset = Vec2::new(rng.gen::<f32>(), rng.gen::<f32>()) * self.jitter;
                let position = self.origin + UVec2::new(x, y).as_vec2() * self.spacing + offset;
                particles.push(Particle::new(position));
            }
        }

        particles.into_iter().collect()
    }
}
