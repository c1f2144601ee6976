//! Diffra command-line interface.
//!
//! Run diffractive network forward passes from TOML configuration files:
//! ```sh
//! diffra run job.toml
//! diffra validate job.toml
//! diffra grid --size 4 --length 0.5 --z 1.0
//! ```

mod config;
mod runner;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use diffra_geometry::PlaneGrid;

#[derive(Parser)]
#[command(name = "diffra")]
#[command(about = "Diffra: Rayleigh-Sommerfeld diffractive network simulator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a forward pass from a TOML configuration file.
    Run {
        /// Path to the job configuration file.
        config: PathBuf,
        /// Output directory (overrides config file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file without running the simulation.
    Validate {
        /// Path to the job configuration file.
        config: PathBuf,
    },
    /// Print the element centres of a plane grid.
    Grid {
        /// Elements along one side.
        #[arg(long)]
        size: usize,
        /// Physical side length.
        #[arg(long)]
        length: f64,
        /// Plane z-coordinate.
        #[arg(long, default_value_t = 0.0)]
        z: f64,
        /// Print as JSON instead of CSV.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, output } => {
            println!("Diffra Forward Pass");
            println!("===================");
            let job = config::load_config(&config)?;
            println!("Configuration: {}", config.display());

            let base_dir = job_dir(&config);
            let result = runner::run_simulation(&job, base_dir)?;

            let out_dir = output.unwrap_or_else(|| PathBuf::from(&job.output.directory));

            if job.output.save_intensity {
                runner::write_map_csv(
                    &result.intensity,
                    &out_dir.join("intensity.csv"),
                    "Detector intensity",
                    &job,
                )?;
            }

            if job.output.save_json {
                runner::write_detector_json(&result, &out_dir.join("detector.json"), &job)?;
            }

            if job.output.save_masks {
                for (idx, (amplitude, phase)) in result
                    .amplitude_maps
                    .iter()
                    .zip(&result.phase_maps)
                    .enumerate()
                {
                    runner::write_map_csv(
                        amplitude,
                        &out_dir.join(format!("mask_{}_amplitude.csv", idx)),
                        &format!("Mask {} amplitude", idx),
                        &job,
                    )?;
                    runner::write_map_csv(
                        phase,
                        &out_dir.join(format!("mask_{}_phase.csv", idx)),
                        &format!("Mask {} phase", idx),
                        &job,
                    )?;
                }
            }

            println!("Simulation complete.");
            Ok(())
        }
        Commands::Validate { config } => {
            let job = config::load_config(&config)?;
            runner::validate_job(&job, job_dir(&config))?;
            println!("Configuration is valid: {}", config.display());
            Ok(())
        }
        Commands::Grid {
            size,
            length,
            z,
            json,
        } => {
            let grid = PlaneGrid::new(size, length, z).context("Invalid grid")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&grid)?);
            } else {
                println!("# pitch: {}", grid.pitch());
                println!("i,j,x,y,z");
                for i in 0..grid.size() {
                    for j in 0..grid.size() {
                        let [x, y, z] = grid.position(i, j);
                        println!("{},{},{},{},{}", i, j, x, y, z);
                    }
                }
            }
            Ok(())
        }
    }
}

fn job_dir(config: &Path) -> &Path {
    config.parent().unwrap_or_else(|| Path::new("."))
}
