use std::path::PathBuf;

use indicatif::{ProgressBar, ProgressIterator, ProgressStyle};
use log::info;
use thiserror::Error;
use undertow_fluids::{
    error::ConfigError,
    params::PcisphParams,
    particle::Lattice,
    pcisph::d2::PcisphFluid2D,
    scene::Scene,
};
use undertow_io::{
    decode::{DecodingError, FluidDataDecoder},
    encode::{EncodingError, FluidDataEncoder},
};

use crate::{Preset, SimulateArgs};

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Decoding(#[from] DecodingError),
    #[error("frame rate must be positive")]
    NoFrameRate,
    #[error("duration must be positive and finite, got {0}")]
    Duration(f32),
}

fn progress_bar(label: &str, len: u64) -> ProgressBar {
    let bar_template = format!("{label} {{spinner:.green}} [{{elapsed}}] [{{bar:50.white/white}}] {{pos}}/{{len}} ({{eta}})");

    match ProgressStyle::with_template(&bar_template) {
        Ok(style) => ProgressBar::new(len).with_style(
            style.progress_chars("=> ").tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        ),
        Err(_) => ProgressBar::new(len),
    }
}

fn build_params(args: &SimulateArgs) -> PcisphParams {
    let mut params = match args.preset {
        Preset::Dam => PcisphParams::default(),
        Preset::Tank => PcisphParams::tank(),
    };

    if let Some(substeps) = args.substeps {
        params = params.with_substeps(substeps);
    }

    params.grid = args.grid.into();
    params.schedule = args.schedule();
    params.seed = args.seed;

    params.with_frame_rate(args.fps)
}

pub fn simulate(args: &SimulateArgs) -> Result<(), RunError> {
    if args.fps == 0 {
        return Err(RunError::NoFrameRate);
    }
    if !(args.duration.is_finite() && args.duration > 0.0) {
        return Err(RunError::Duration(args.duration));
    }

    let params = build_params(args);
    let lattice = match args.preset {
        Preset::Dam => Lattice::dam(params.particle_radius),
        Preset::Tank => Lattice::tank(params.particle_radius),
    };

    let fluid = PcisphFluid2D::new(params, lattice.build(args.seed))?;
    let mut scene = Scene::new(fluid);

    let frames = (args.duration * args.fps as f32).ceil() as u64;
    let mut encoder = FluidDataEncoder::new(args.output.clone(), frames, args.fps)?;
    encoder.encode_metadata(&scene)?;

    info!(
        "simulating {} particles for {frames} frames, dt = {}",
        lattice.len(),
        scene.fluid.params().dt,
    );

    for _ in (0..frames).progress_with(progress_bar("Running Simulation", frames)) {
        scene.step();
        encoder.encode_frame(&scene)?;
    }

    let diagnostics = scene.diagnostics();
    info!(
        "wrote {} frames over {} ticks ({} sub-steps), largest cell held {} particles",
        encoder.frames_written(),
        diagnostics.ticks,
        diagnostics.substeps,
        diagnostics.max_cell_occupancy,
    );

    Ok(())
}

pub fn inspect(input: PathBuf) -> Result<(), RunError> {
    let mut decoder = FluidDataDecoder::new(input);
    let meta = decoder.decode_metadata()?;
    let extent = meta.extent();

    println!(
        "{}D run, {} frames at {} fps, domain {} x {}, particle radius {}",
        meta.dim, meta.num_frames, meta.fps, extent.x, extent.y, meta.particle_radius,
    );

    let mut frame = 0;
    while let Some(data) = decoder.decode_frame()? {
        let max_speed = data.speeds.iter().copied().fold(0.0f32, f32::max);
        let mean_height = data.positions.iter().map(|p| p.y).sum::<f32>() / data.positions.len().max(1) as f32;

        println!("{frame:>6}: {} particles, max speed {max_speed:.3}, mean height {mean_height:.3}", data.positions.len());
        frame += 1;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use undertow_fluids::params::{GridStrategy, Schedule};

    use crate::GridArg;

    use super::*;

    fn args(substeps: Option<usize>) -> SimulateArgs {
        SimulateArgs {
            output: PathBuf::from("unused"),
            fps: 30,
            duration: 1.0,
            preset: Preset::Dam,
            parallel: true,
            grid: GridArg::Lists,
            substeps,
            seed: 7,
        }
    }

    #[test]
    fn flags_override_the_preset() {
        let params = build_params(&args(Some(4)));

        assert_eq!(params.num_substeps, 4);
        assert!((params.tick_duration() - 1.0 / 30.0).abs() < 1e-6);
        assert_eq!(params.grid, GridStrategy::CellLists);
        assert_eq!(params.schedule, Schedule::Parallel);
        assert_eq!(params.seed, 7);
    }

    #[test]
    fn zero_substeps_are_reported_as_such() {
        let params = build_params(&args(Some(0)));
        let result = PcisphFluid2D::new(params, Lattice::dam(0.03).build(0));

        assert!(matches!(result, Err(ConfigError::NoSubsteps)));
    }
}
