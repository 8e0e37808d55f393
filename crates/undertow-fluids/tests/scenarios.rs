use glam::Vec2;
use undertow_fluids::{
    params::{GridStrategy, PcisphParams, Schedule},
    particle::{Lattice, Particle, Particles},
    pcisph::d2::PcisphFluid2D,
    scene::Scene,
    Fluid,
};

fn inside(p: Vec2, extent: Vec2) -> bool {
    p.cmpge(Vec2::ZERO).all() && p.cmple(extent).all()
}

#[test]
fn free_particle_keeps_its_velocity() {
    let params = PcisphParams {
        gravity: Vec2::ZERO,
        stiffness: 0.0,
        near_stiffness: 0.0,
        surface_tension: 0.0,
        linear_viscosity: 0.0,
        quadratic_viscosity: 0.0,
        ..Default::default()
    };
    let dt = params.dt;
    let start = Vec2::new(3.0, 2.0);
    let v = Vec2::new(0.5, 0.25);

    let particles: Particles = [Particle::new(start).with_velocity(v)].into_iter().collect();
    let mut fluid = PcisphFluid2D::new(params, particles).unwrap();

    for _ in 0..20 {
        fluid.substep();

        let p = fluid.particle(0);
        assert!(p.velocity.abs_diff_eq(v, 1e-3));
        assert!(p.position.abs_diff_eq(p.position_last + p.velocity * dt, 1e-5));
    }

    assert!(fluid.particle(0).position.abs_diff_eq(start + v * 20.0 * dt, 1e-4));
}

#[test]
fn close_pair_is_pushed_apart() {
    let params = PcisphParams {
        gravity: Vec2::ZERO,
        rest_density: 1.0,
        surface_tension: 0.0,
        linear_viscosity: 0.0,
        quadratic_viscosity: 0.0,
        ..Default::default()
    };

    let particles: Particles = [Vec2::new(3.0, 2.0), Vec2::new(3.09, 2.0)]
        .map(Particle::new)
        .into_iter()
        .collect();
    let mut fluid = PcisphFluid2D::new(params, particles).unwrap();

    fluid.pressure_step();
    assert!(fluid.particle(0).pressure > 0.0);
    assert!(fluid.particle(0).pressure_vary > 0.0);
    assert!(fluid.particle(1).pressure > 0.0);

    fluid.project();
    fluid.correct();

    let (a, b) = (fluid.particle(0), fluid.particle(1));
    assert!(b.position.x - a.position.x > 0.09);
    assert!(a.velocity.x < 0.0 && b.velocity.x > 0.0);
    assert!((a.position.y - 2.0).abs() < 1e-6 && (b.position.y - 2.0).abs() < 1e-6);
}

#[test]
fn particle_outside_the_left_wall_bounces_back() {
    let params = PcisphParams { gravity: Vec2::ZERO, ..Default::default() }.with_substeps(1);

    let particles: Particles = [Particle::new(Vec2::new(-1.0, 2.0)).with_velocity(Vec2::new(-1.0, 0.0))]
        .into_iter()
        .collect();
    let mut scene = Scene::new(PcisphFluid2D::new(params, particles).unwrap());

    scene.step();

    let (p, v) = scene.iter_particles().next().unwrap();
    assert!((0.0..=0.001).contains(&p.x));
    assert!(v.x > 0.0);
    assert_eq!(scene.diagnostics().substeps, 1);
}

#[test]
fn dam_stays_inside_the_domain() {
    let params = PcisphParams::default();
    let extent = params.domain();
    let particles = Lattice::dam(params.particle_radius).build(5);
    let mut scene = Scene::new(PcisphFluid2D::new(params, particles).unwrap());

    for _ in 0..120 {
        scene.step();

        for (p, v) in scene.iter_particles() {
            assert!(inside(p, extent), "particle escaped to {p}");
            assert!(v.is_finite());
        }
    }

    assert_eq!(scene.diagnostics().ticks, 120);
}

#[test]
fn grid_lists_every_particle_after_stepping() {
    for (grid, schedule) in [
        (GridStrategy::CountingSort, Schedule::Sequential),
        (GridStrategy::CountingSort, Schedule::Parallel),
        (GridStrategy::CellLists, Schedule::Parallel),
    ] {
        let params = PcisphParams { grid, schedule, ..Default::default() };
        let particles = Lattice::dam(params.particle_radius).build(2);
        let mut fluid = PcisphFluid2D::new(params, particles).unwrap();

        for _ in 0..30 {
            fluid.substep();
        }

        let grid = fluid.grid();
        let mut seen = vec![0usize; fluid.len()];

        for (i, &p) in fluid.particles().positions().iter().enumerate() {
            assert!(grid.bucket(grid.layout().cell_of(p)).contains(&i));
        }

        for cell in 0..grid.layout().num_cells() {
            assert!(grid.occupancy(cell) <= grid.layout().capacity());
            for slot in 0..grid.occupancy(cell) {
                seen[grid.entry(cell, slot)] += 1;
            }
        }

        assert!(seen.iter().all(|&n| n == 1));
    }
}

#[test]
fn neighbors_cover_every_interacting_pair() {
    let params = PcisphParams::default();
    let h = params.smoothing_radius;
    let particles = Lattice::dam(params.particle_radius).build(8);
    let mut fluid = PcisphFluid2D::new(params, particles).unwrap();

    for _ in 0..10 {
        fluid.substep();
    }

    let positions = fluid.particles().positions();
    let grid = fluid.grid();

    for (i, &xi) in positions.iter().enumerate() {
        let found: Vec<usize> = grid.neighbors(grid.layout().cell_of(xi)).collect();

        for (j, &xj) in positions.iter().enumerate() {
            if (xj - xi).length() <= h {
                assert!(found.contains(&j), "pair ({i}, {j}) missed");
            }
        }
    }
}
