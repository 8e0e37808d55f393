use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand, ValueEnum};
use log::error;
use undertow_fluids::params::{GridStrategy, Schedule};

mod run;

#[derive(Parser)]
#[command(version, about = "Two-dimensional PCISPH fluid simulation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Runs a simulation and writes every frame to a new directory.
    Simulate(SimulateArgs),
    /// Prints the metadata and per-frame summary of a recorded run.
    Inspect {
        input: PathBuf,
    },
}

#[derive(clap::Args)]
struct SimulateArgs {
    /// Directory to write frames to. Must not exist yet.
    #[arg(short, long, default_value = "output")]
    output: PathBuf,
    #[arg(long, default_value_t = 60)]
    fps: u32,
    /// Simulated seconds.
    #[arg(short, long, default_value_t = 10.0)]
    duration: f32,
    #[arg(long, value_enum, default_value_t = Preset::Dam)]
    preset: Preset,
    /// Spread per-particle stages across all cores.
    #[arg(long)]
    parallel: bool,
    #[arg(long, value_enum, default_value_t = GridArg::Sort)]
    grid: GridArg,
    /// Sub-steps per frame.
    #[arg(long)]
    substeps: Option<usize>,
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

#[derive(Clone, Copy, ValueEnum)]
enum Preset {
    /// 500 particles in a 6 x 4 box.
    Dam,
    /// 49,200 particles in a 52 x 30 box.
    Tank,
}

#[derive(Clone, Copy, ValueEnum)]
enum GridArg {
    Sort,
    Lists,
}

impl From<GridArg> for GridStrategy {
    fn from(grid: GridArg) -> Self {
        match grid {
            GridArg::Sort => GridStrategy::CountingSort,
            GridArg::Lists => GridStrategy::CellLists,
        }
    }
}

impl SimulateArgs {
    fn schedule(&self) -> Schedule {
        if self.parallel { Schedule::Parallel } else { Schedule::Sequential }
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Simulate(args) => run::simulate(&args),
        Command::Inspect { input } => run::inspect(input),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
