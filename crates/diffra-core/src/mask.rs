//! Learnable complex transmission masks.
//!
//! A passive optical element cannot amplify, so every read of a mask goes
//! through an amplitude clip
//!
//! $$
//! \tilde{m} = \begin{cases} m / |m| & |m| > 1 \\ m & \text{otherwise} \end{cases}
//! $$
//!
//! which preserves phase. The stored weights are never rewritten by the
//! clip: an optimiser updates the raw values through
//! [`TransmissionMask::parameters_mut`] and the constraint is reapplied on
//! the next read.

use std::f64::consts::PI;

use ndarray::Array2;
use num_complex::Complex64;
use rand::Rng;

use crate::propagation::superposition::check_field;
use crate::propagation::DiffractionError;
use crate::types::ComplexField;

/// Clamp a single weight to unit amplitude, keeping its phase.
#[inline]
pub fn clip_amplitude(m: Complex64) -> Complex64 {
    let amplitude = m.norm();
    if amplitude > 1.0 {
        m / amplitude
    } else {
        m
    }
}

/// Square array of complex transmission coefficients.
#[derive(Debug, Clone, PartialEq)]
pub struct TransmissionMask {
    weights: Array2<Complex64>,
}

impl TransmissionMask {
    /// Wrap existing weights. They must form a non-empty square of finite values.
    pub fn new(weights: Array2<Complex64>) -> Result<Self, DiffractionError> {
        let (rows, cols) = weights.dim();
        if rows == 0 || rows != cols {
            return Err(DiffractionError::InvalidArgument(format!(
                "mask must be a non-empty square array, got {}x{}",
                rows, cols
            )));
        }
        check_field(&weights, rows)?;
        Ok(Self { weights })
    }

    /// Fully transparent mask (every weight `1 + 0i`).
    pub fn unity(size: usize) -> Result<Self, DiffractionError> {
        Self::new(Array2::from_elem((size, size), Complex64::new(1.0, 0.0)))
    }

    /// Real and imaginary parts drawn independently from $[0, 1)$.
    ///
    /// Amplitudes range up to $\sqrt{2}$, so roughly a fifth of the raw
    /// weights are clipped on read.
    pub fn random<R: Rng + ?Sized>(size: usize, rng: &mut R) -> Result<Self, DiffractionError> {
        let weights = Array2::from_shape_simple_fn((size, size), || {
            Complex64::new(rng.gen::<f64>(), rng.gen::<f64>())
        });
        Self::new(weights)
    }

    /// Unit amplitude with phase uniform in $[-\pi, \pi)$: a phase-only mask.
    pub fn random_phase<R: Rng + ?Sized>(
        size: usize,
        rng: &mut R,
    ) -> Result<Self, DiffractionError> {
        let weights = Array2::from_shape_simple_fn((size, size), || {
            Complex64::cis(rng.gen_range(-PI..PI))
        });
        Self::new(weights)
    }

    /// Number of elements along one side.
    pub fn size(&self) -> usize {
        self.weights.nrows()
    }

    /// Stored weights, before clipping.
    pub fn raw(&self) -> &Array2<Complex64> {
        &self.weights
    }

    /// Mutable access to the stored weights for an external optimiser.
    ///
    /// No constraint is enforced on write; values with $|m| > 1$ are
    /// clipped whenever the mask is read.
    pub fn parameters_mut(&mut self) -> &mut Array2<Complex64> {
        &mut self.weights
    }

    /// Weights as seen by light: amplitudes clipped to at most 1.
    pub fn clipped(&self) -> Array2<Complex64> {
        self.weights.mapv(clip_amplitude)
    }

    /// Clipped amplitude map, in $[0, 1]$.
    pub fn amplitude_map(&self) -> Array2<f64> {
        self.weights.mapv(|m| clip_amplitude(m).norm())
    }

    /// Phase map in $(-\pi, \pi]$. Clipping never changes phase.
    pub fn phase_map(&self) -> Array2<f64> {
        self.weights.mapv(|m| m.arg())
    }

    /// Elementwise product of `field` with the clipped mask.
    pub fn apply(&self, field: &ComplexField) -> Result<ComplexField, DiffractionError> {
        check_field(field, self.size())?;
        let mut out = field.clone();
        out.zip_mut_with(&self.weights, |f, &m| *f *= clip_amplitude(m));
        Ok(out)
    }
}
