//! Simulation runner: ties together job configuration, network and backend.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use ndarray::Array2;
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use diffra_compute::{ComputeBackend, CpuBackend};
use diffra_core::types::{amplitude_map, field_from_amplitudes, phase_map};
use diffra_core::{
    ComplexField, DiffractiveNetwork, IntensityMap, NetworkBuilder, SimulationParams,
    TransmissionMask,
};

use crate::config::{InputConfig, JobConfig, MaskInit, PlaneConfig};

/// Results from one forward pass.
pub struct RunOutput {
    pub intensity: IntensityMap,
    pub detector_field: ComplexField,
    pub amplitude_maps: Vec<Array2<f64>>,
    pub phase_maps: Vec<Array2<f64>>,
}

/// Run a forward pass described by a parsed job.
///
/// `base_dir` is where relative input paths are resolved.
pub fn run_simulation(job: &JobConfig, base_dir: &Path) -> Result<RunOutput> {
    let backend = create_backend(&job.simulation.backend, job.simulation.threads)?;
    let network = build_network(job, job.simulation.params(), backend)?;

    let input_size = network
        .input_grid()
        .map(|g| g.size())
        .context("Network has no input plane")?;
    let input = build_input(&job.input, input_size, base_dir)?;
    println!(
        "Network: {} planes, {} masks, input {}x{}",
        network.layers().len(),
        network.masks().count(),
        input_size,
        input_size
    );

    let detector_field = network
        .forward_field(&input)
        .context("Forward pass failed")?;
    let intensity = network
        .read(&detector_field)
        .context("Detector readout failed")?;

    let peak = detector_field.iter().map(|c| c.norm()).fold(0.0, f64::max);
    println!("Detector peak |E| = {:.4e}", peak);

    Ok(RunOutput {
        intensity,
        detector_field,
        amplitude_maps: network.amplitude_maps(),
        phase_maps: network.phase_maps(),
    })
}

/// Check a job without assembling any transfer matrix.
pub fn validate_job(job: &JobConfig, base_dir: &Path) -> Result<()> {
    let params = SimulationParams {
        transfer_cache_limit: 0,
        ..job.simulation.params()
    };
    let network = build_network(job, params, Arc::new(CpuBackend::new()))?;
    let size = network
        .input_grid()
        .map(|g| g.size())
        .context("Network has no input plane")?;
    build_input(&job.input, size, base_dir)?;
    Ok(())
}

/// Assemble the network planes in the order given by the job.
pub fn build_network(
    job: &JobConfig,
    params: SimulationParams,
    backend: Arc<dyn ComputeBackend>,
) -> Result<DiffractiveNetwork> {
    log::debug!("Job defines {} planes", job.planes.len());
    let mut builder = NetworkBuilder::new(params, backend);
    for (idx, plane) in job.planes.iter().enumerate() {
        builder = match *plane {
            PlaneConfig::Input { size, length, z } => builder.input(size, length, z),
            PlaneConfig::Detector { size, length, z } => builder.detector(size, length, z),
            PlaneConfig::Diffractive {
                size,
                length,
                z,
                mask,
                seed,
            } => {
                let mask = build_mask(mask, size, seed)
                    .with_context(|| format!("Plane {}: invalid mask", idx))?;
                builder.diffractive(size, length, z, mask)
            }
        };
    }
    builder.build().context("Invalid network")
}

fn build_mask(init: MaskInit, size: usize, seed: u64) -> Result<TransmissionMask> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mask = match init {
        MaskInit::Unity => TransmissionMask::unity(size)?,
        MaskInit::Random => TransmissionMask::random(size, &mut rng)?,
        MaskInit::RandomPhase => TransmissionMask::random_phase(size, &mut rng)?,
    };
    Ok(mask)
}

/// Build the field emitted by an input plane of `size × size` elements.
pub fn build_input(input: &InputConfig, size: usize, base_dir: &Path) -> Result<ComplexField> {
    match input {
        InputConfig::Point {
            row,
            col,
            amplitude,
        } => {
            if *row >= size || *col >= size {
                anyhow::bail!(
                    "Input point [{}][{}] outside {}x{} input plane",
                    row,
                    col,
                    size,
                    size
                );
            }
            let mut field = ComplexField::zeros((size, size));
            field[[*row, *col]] = Complex64::new(*amplitude, 0.0);
            Ok(field)
        }
        InputConfig::Uniform { amplitude } => {
            Ok(ComplexField::from_elem((size, size), Complex64::new(*amplitude, 0.0)))
        }
        InputConfig::Csv { path } => {
            let full = base_dir.join(path);
            let content = std::fs::read_to_string(&full)
                .with_context(|| format!("Cannot read input {}", full.display()))?;
            let amplitudes = parse_amplitude_csv(&content)
                .with_context(|| format!("Invalid input {}", full.display()))?;
            if amplitudes.dim() != (size, size) {
                anyhow::bail!(
                    "Input {} is {}x{}, input plane is {}x{}",
                    full.display(),
                    amplitudes.nrows(),
                    amplitudes.ncols(),
                    size,
                    size
                );
            }
            Ok(field_from_amplitudes(&amplitudes))
        }
    }
}

/// Parse rows of comma-separated reals. Blank lines and `#` comments are skipped.
pub fn parse_amplitude_csv(content: &str) -> Result<Array2<f64>> {
    let mut values = Vec::new();
    let mut rows = 0;
    let mut cols = None;
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let row: Vec<f64> = line
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .with_context(|| format!("Line {}: expected comma-separated numbers", line_no + 1))?;
        match cols {
            None => cols = Some(row.len()),
            Some(n) if n != row.len() => anyhow::bail!(
                "Line {}: {} values, expected {}",
                line_no + 1,
                row.len(),
                n
            ),
            Some(_) => {}
        }
        values.extend(row);
        rows += 1;
    }
    let cols = cols.context("No data rows")?;
    Ok(Array2::from_shape_vec((rows, cols), values)?)
}

/// Write a real-valued map to CSV with a metadata header.
pub fn write_map_csv(map: &Array2<f64>, path: &Path, title: &str, job: &JobConfig) -> Result<()> {
    use std::io::Write;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::File::create(path)?;
    writeln!(file, "# Diffra: {}", title)?;
    writeln!(file, "# Version: {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(file, "# wavelength: {}", job.simulation.wavelength)?;
    writeln!(file, "# Grid: {}x{}", map.nrows(), map.ncols())?;
    writeln!(file, "#")?;

    for row in map.rows() {
        let line: Vec<String> = row.iter().map(|v| format!("{:.6e}", v)).collect();
        writeln!(file, "{}", line.join(","))?;
    }

    println!("{} written to: {}", title, path.display());
    Ok(())
}

#[derive(Serialize)]
struct DetectorReport<'a> {
    version: &'a str,
    wavelength: f64,
    size: usize,
    intensity: Vec<Vec<f64>>,
    amplitude: Vec<Vec<f64>>,
    phase: Vec<Vec<f64>>,
}

fn nested(map: &Array2<f64>) -> Vec<Vec<f64>> {
    map.rows().into_iter().map(|r| r.to_vec()).collect()
}

/// Write the detector intensity and field to a JSON file.
pub fn write_detector_json(output: &RunOutput, path: &Path, job: &JobConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let report = DetectorReport {
        version: env!("CARGO_PKG_VERSION"),
        wavelength: job.simulation.wavelength,
        size: output.intensity.nrows(),
        intensity: nested(&output.intensity),
        amplitude: nested(&amplitude_map(&output.detector_field)),
        phase: nested(&phase_map(&output.detector_field)),
    };
    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| anyhow::anyhow!("JSON serialisation error: {}", e))?;
    std::fs::write(path, json)?;

    println!("Detector (JSON) written to: {}", path.display());
    Ok(())
}

/// Create a compute backend based on the user's preference string.
///
/// - `"gpu"`: GPU or an error.
/// - `"cpu"`: always CPU.
/// - `"auto"` (default): try GPU, fall back to CPU.
pub fn create_backend(preference: &str, threads: Option<usize>) -> Result<Arc<dyn ComputeBackend>> {
    let cpu = || -> Result<Arc<dyn ComputeBackend>> {
        let backend = match threads {
            Some(n) => CpuBackend::with_threads(n)?,
            None => CpuBackend::new(),
        };
        Ok(Arc::new(backend))
    };

    match preference {
        "cpu" => {
            println!("Backend: CPU");
            cpu()
        }
        "gpu" => {
            #[cfg(feature = "gpu")]
            {
                let gpu = diffra_compute::GpuBackend::new_blocking()
                    .context("GPU requested but unavailable")?;
                println!("Backend: {}", gpu.device_info().name);
                Ok(Arc::new(gpu))
            }
            #[cfg(not(feature = "gpu"))]
            {
                anyhow::bail!("GPU requested but binary was built without --features gpu")
            }
        }
        "auto" => {
            #[cfg(feature = "gpu")]
            {
                match diffra_compute::GpuBackend::new_blocking() {
                    Ok(gpu) => {
                        println!("Backend: {} (auto-detected)", gpu.device_info().name);
                        return Ok(Arc::new(gpu));
                    }
                    Err(e) => {
                        println!("GPU not available ({}), using CPU", e);
                    }
                }
            }
            cpu()
        }
        other => anyhow::bail!("Unknown backend '{}'. Valid values: auto, cpu, gpu", other),
    }
}
