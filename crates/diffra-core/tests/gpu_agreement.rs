//! Integration test: GPU propagation agrees with the CPU to f32 precision.
//!
//! Skips when no GPU adapter is present.

#![cfg(feature = "gpu")]

use std::sync::Arc;

use diffra_compute::{ComputeBackend, CpuBackend, GpuBackend};
use diffra_core::{ComplexField, PlanePropagator, SimulationParams};
use diffra_geometry::PlaneGrid;
use num_complex::Complex64;

#[test]
fn test_gpu_propagator_matches_cpu() {
    let gpu = match GpuBackend::new_blocking() {
        Ok(gpu) => gpu,
        Err(_) => {
            eprintln!("Skipping GPU test: no adapter available");
            return;
        }
    };
    let gpu: Arc<dyn ComputeBackend> = Arc::new(gpu);
    let cpu: Arc<dyn ComputeBackend> = Arc::new(CpuBackend::new());

    let source = PlaneGrid::new(8, 1.0, 0.0).unwrap();
    let target = PlaneGrid::new(8, 1.0, 0.1).unwrap();
    let params = SimulationParams::with_wavelength(0.652);
    let on_gpu = PlanePropagator::new(source.clone(), target.clone(), params.clone(), gpu).unwrap();
    let on_cpu = PlanePropagator::new(source, target, params, cpu).unwrap();

    let fields: Vec<ComplexField> = (0..3)
        .map(|b| {
            ComplexField::from_shape_fn((8, 8), |(i, j)| {
                Complex64::from_polar(1.0, 0.1 * (i * 8 + j + b) as f64)
            })
        })
        .collect();

    let gpu_out = on_gpu.propagate_batch(&fields).unwrap();
    for (field, g) in fields.iter().zip(&gpu_out) {
        let c = on_cpu.propagate(field).unwrap();
        let scale = c.iter().map(|v| v.norm()).fold(0.0, f64::max);
        for (a, b) in g.iter().zip(c.iter()) {
            assert!((a - b).norm() < 1e-4 * scale, "{} vs {}", a, b);
        }
    }
}
