//! TOML configuration deserialisation for network simulation jobs.
//!
//! ```toml
//! [simulation]
//! wavelength = 0.652
//! backend = "cpu"
//!
//! [[plane]]
//! kind = "input"
//! size = 28
//! length = 1.0
//! z = 0.0
//!
//! [[plane]]
//! kind = "diffractive"
//! size = 10
//! length = 1.0
//! z = 0.2
//! mask = "random"
//! seed = 7
//!
//! [[plane]]
//! kind = "detector"
//! size = 10
//! length = 1.0
//! z = 0.3
//!
//! [input]
//! type = "point"
//! row = 14
//! col = 14
//! ```

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use diffra_core::SimulationParams;

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
pub struct JobConfig {
    pub simulation: SimulationConfig,
    /// Planes in optical order.
    #[serde(rename = "plane")]
    pub planes: Vec<PlaneConfig>,
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Simulation parameters from TOML.
#[derive(Debug, Deserialize)]
pub struct SimulationConfig {
    /// Free-space wavelength, in the same length unit as the planes.
    pub wavelength: f64,
    #[serde(default = "default_min_distance")]
    pub min_distance: f64,
    #[serde(default = "default_cache_limit")]
    pub transfer_cache_limit: usize,
    /// Compute backend: "auto", "cpu", or "gpu". Default: "auto".
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Worker threads for the CPU backend (default: all cores).
    #[serde(default)]
    pub threads: Option<usize>,
}

impl SimulationConfig {
    pub fn params(&self) -> SimulationParams {
        SimulationParams {
            wavelength: self.wavelength,
            min_distance: self.min_distance,
            transfer_cache_limit: self.transfer_cache_limit,
        }
    }
}

fn default_min_distance() -> f64 {
    SimulationParams::default().min_distance
}
fn default_cache_limit() -> usize {
    SimulationParams::default().transfer_cache_limit
}
fn default_backend() -> String {
    "auto".into()
}

/// One plane of the network.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlaneConfig {
    Input {
        size: usize,
        length: f64,
        z: f64,
    },
    Diffractive {
        size: usize,
        length: f64,
        z: f64,
        #[serde(default)]
        mask: MaskInit,
        /// RNG seed for random masks (default: 0).
        #[serde(default)]
        seed: u64,
    },
    Detector {
        size: usize,
        length: f64,
        z: f64,
    },
}

/// Initial transmission mask of a diffractive plane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskInit {
    Unity,
    #[default]
    Random,
    RandomPhase,
}

/// Field emitted by the input plane.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputConfig {
    /// A single lit element.
    Point {
        row: usize,
        col: usize,
        #[serde(default = "default_amplitude")]
        amplitude: f64,
    },
    /// Every element lit with the same amplitude.
    Uniform {
        #[serde(default = "default_amplitude")]
        amplitude: f64,
    },
    /// Real amplitudes from a comma-separated file, one row per line.
    /// Relative paths resolve against the job file's directory.
    Csv { path: String },
}

fn default_amplitude() -> f64 {
    1.0
}

/// Output configuration.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Output directory (default: "./output").
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Whether to save the detector intensity as CSV (default: true).
    #[serde(default = "default_true")]
    pub save_intensity: bool,
    /// Whether to also save the detector intensity as JSON (default: false).
    #[serde(default)]
    pub save_json: bool,
    /// Whether to save clipped amplitude and phase maps of every mask (default: false).
    #[serde(default)]
    pub save_masks: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            save_intensity: true,
            save_json: false,
            save_masks: false,
        }
    }
}

fn default_output_dir() -> String {
    "./output".into()
}
fn default_true() -> bool {
    true
}

/// Load and parse a TOML job configuration file.
pub fn load_config(path: &Path) -> anyhow::Result<JobConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Invalid job file {}", path.display()))
}

pub fn parse_config(content: &str) -> anyhow::Result<JobConfig> {
    let config: JobConfig = toml::from_str(content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOB: &str = r#"
        [simulation]
        wavelength = 0.652
        backend = "cpu"

        [[plane]]
        kind = "input"
        size = 4
        length = 1.0
        z = 0.0

        [[plane]]
        kind = "diffractive"
        size = 3
        length = 1.0
        z = 0.1
        mask = "random_phase"
        seed = 11

        [[plane]]
        kind = "detector"
        size = 3
        length = 1.0
        z = 0.2

        [input]
        type = "point"
        row = 1
        col = 2
    "#;

    #[test]
    fn test_parse_full_job() {
        let job = parse_config(JOB).unwrap();
        assert_eq!(job.simulation.backend, "cpu");
        assert_eq!(job.simulation.params().min_distance, 1e-12);
        assert_eq!(job.planes.len(), 3);
        match &job.planes[1] {
            PlaneConfig::Diffractive { size, mask, seed, .. } => {
                assert_eq!(*size, 3);
                assert_eq!(*mask, MaskInit::RandomPhase);
                assert_eq!(*seed, 11);
            }
            other => panic!("Expected diffractive plane, got {:?}", other),
        }
        match job.input {
            InputConfig::Point { row, col, amplitude } => {
                assert_eq!((row, col), (1, 2));
                assert_eq!(amplitude, 1.0);
            }
            other => panic!("Expected point input, got {:?}", other),
        }
        assert!(job.output.save_intensity);
        assert!(!job.output.save_masks);
    }

    #[test]
    fn test_mask_defaults_to_random() {
        let job = parse_config(&JOB.replace("mask = \"random_phase\"", "")).unwrap();
        assert!(matches!(
            job.planes[1],
            PlaneConfig::Diffractive {
                mask: MaskInit::Random,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_plane_kind_rejected() {
        assert!(parse_config(&JOB.replace("kind = \"detector\"", "kind = \"lens\"")).is_err());
    }

    #[test]
    fn test_demo_job_parses() {
        let job = parse_config(include_str!("../../../demos/two_layer.toml")).unwrap();
        assert_eq!(job.planes.len(), 4);
        assert!(job.output.save_masks);
    }

    #[test]
    fn test_missing_wavelength_rejected() {
        assert!(parse_config(&JOB.replace("wavelength = 0.652", "")).is_err());
    }
}
