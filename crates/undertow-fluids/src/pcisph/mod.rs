pub mod d2;

use rand::{rngs::StdRng, Rng, SeedableRng};

/// Offset in `[0, 1)` used to push a clamped particle back inside a wall.
///
/// Drawn from a generator keyed on the run seed, the sub-step and the particle, so that every
/// worker draws the same value no matter how particles are distributed across threads.
fn wall_jitter(seed: u64, substep: u64, particle: usize, axis: usize) -> f32 {
    let key = seed
        ^ substep.wrapping_mul(0x9e37_79b9_7f4a_7c15)
        ^ (particle as u64).wrapping_mul(0xbf58_476d_1ce4_e5b9)
        ^ (axis as u64).wrapping_mul(0x94d0_49bb_1331_11eb);

    StdRng::seed_from_u64(key).gen()
}
