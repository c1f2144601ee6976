//! Core types shared across the Diffra framework.

use ndarray::Array2;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::propagation::DiffractionError;

/// Complex optical field sampled on an $N \times N$ plane.
///
/// Each entry's modulus is the local amplitude and its argument the phase
/// (radians, in $(-\pi, \pi]$). There is no normalisation constraint.
pub type ComplexField = Array2<Complex64>;

/// Real-valued intensity map, as recorded by a detector.
pub type IntensityMap = Array2<f64>;

/// Parameters shared by every propagation in one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Free-space wavelength (m).
    pub wavelength: f64,
    /// Smallest source/observation separation at which the kernel is
    /// evaluated (m). Closer pairs are a domain error.
    pub min_distance: f64,
    /// Largest transfer matrix, in complex entries ($K^2 N^2$), that a
    /// propagator assembles and keeps. Larger couplings are evaluated on the
    /// fly on every pass.
    pub transfer_cache_limit: usize,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            wavelength: 652e-9,
            min_distance: 1e-12,
            // 16M entries = 256 MiB of Complex64
            transfer_cache_limit: 16_000_000,
        }
    }
}

impl SimulationParams {
    /// Parameters for a given wavelength, other settings at their defaults.
    pub fn with_wavelength(wavelength: f64) -> Self {
        Self {
            wavelength,
            ..Default::default()
        }
    }

    /// Check that wavelength and minimum distance are positive and finite.
    pub fn validate(&self) -> Result<(), DiffractionError> {
        if !(self.wavelength.is_finite() && self.wavelength > 0.0) {
            return Err(DiffractionError::InvalidArgument(format!(
                "wavelength must be positive and finite, got {}",
                self.wavelength
            )));
        }
        if !(self.min_distance.is_finite() && self.min_distance > 0.0) {
            return Err(DiffractionError::InvalidArgument(format!(
                "minimum distance must be positive and finite, got {}",
                self.min_distance
            )));
        }
        Ok(())
    }

    /// Free-space wavenumber $k = 2\pi / \lambda$ (m⁻¹).
    pub fn wavenumber(&self) -> f64 {
        2.0 * std::f64::consts::PI / self.wavelength
    }
}

/// Amplitude map $|E|$ of a field.
pub fn amplitude_map(field: &ComplexField) -> Array2<f64> {
    field.mapv(|c| c.norm())
}

/// Phase map $\arg E$ of a field, in $(-\pi, \pi]$.
pub fn phase_map(field: &ComplexField) -> Array2<f64> {
    field.mapv(|c| c.arg())
}

/// Coerce real amplitudes (e.g. image pixel values) into a zero-phase field.
pub fn field_from_amplitudes(amplitudes: &Array2<f64>) -> ComplexField {
    amplitudes.mapv(|a| Complex64::new(a, 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_default_params_are_valid() {
        let params = SimulationParams::default();
        assert!(params.validate().is_ok());
        assert_abs_diff_eq!(params.wavenumber(), 2.0 * std::f64::consts::PI / 652e-9, epsilon = 1e-3);
    }

    #[test]
    fn test_invalid_params_rejected() {
        for wavelength in [0.0, -1e-6, f64::NAN, f64::INFINITY] {
            let params = SimulationParams::with_wavelength(wavelength);
            assert!(matches!(params.validate(), Err(DiffractionError::InvalidArgument(_))));
        }
        let params = SimulationParams {
            min_distance: 0.0,
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(DiffractionError::InvalidArgument(_))));
    }

    #[test]
    fn test_amplitude_and_phase_maps() {
        let field = ComplexField::from_shape_vec(
            (1, 2),
            vec![Complex64::new(0.0, 2.0), Complex64::new(-3.0, 0.0)],
        )
        .unwrap();
        let amp = amplitude_map(&field);
        let phase = phase_map(&field);
        assert_abs_diff_eq!(amp[[0, 0]], 2.0, epsilon = 1e-15);
        assert_abs_diff_eq!(amp[[0, 1]], 3.0, epsilon = 1e-15);
        assert_abs_diff_eq!(phase[[0, 0]], std::f64::consts::FRAC_PI_2, epsilon = 1e-15);
        assert_abs_diff_eq!(phase[[0, 1]], std::f64::consts::PI, epsilon = 1e-15);
    }
}
