//! Scalar Rayleigh–Sommerfeld diffraction kernel.
//!
//! The field at an observation point $\mathbf{r}_o$ radiated by a unit point
//! source at $\mathbf{r}_s$ is
//!
//! $$
//! w = \frac{z_o - z_s}{r^2}
//! \left(\frac{1}{2\pi r} + \frac{1}{i\lambda}\right)
//! \exp\!\left(\frac{i 2\pi r}{\lambda}\right),
//! \qquad r = |\mathbf{r}_o - \mathbf{r}_s|
//! $$
//!
//! The $1/(2\pi r)$ term dominates in the near field and $1/(i\lambda)$ in
//! the far field. The kernel is singular at $r = 0$; evaluations closer
//! than a configurable minimum distance are rejected.
//!
//! # Reference
//! Lin et al., "All-optical machine learning using diffractive deep neural
//! networks", *Science* **361**, 1004 (2018), supplementary materials.

use std::f64::consts::PI;

use diffra_geometry::Position;
use num_complex::Complex64;

use super::DiffractionError;

/// Evaluate the kernel between one source and one observation point.
///
/// # Arguments
/// * `source` - Position of the point source (m).
/// * `observation` - Position at which the field is evaluated (m).
/// * `wavelength` - Free-space wavelength (m).
/// * `min_distance` - Smallest separation accepted (m).
///
/// # Errors
/// [`DiffractionError::InvalidArgument`] for a non-positive wavelength or
/// minimum distance; [`DiffractionError::DegenerateGeometry`] when the two
/// points are closer than `min_distance`.
pub fn rayleigh_sommerfeld(
    source: &Position,
    observation: &Position,
    wavelength: f64,
    min_distance: f64,
) -> Result<Complex64, DiffractionError> {
    if !(wavelength.is_finite() && wavelength > 0.0) {
        return Err(DiffractionError::InvalidArgument(format!(
            "wavelength must be positive and finite, got {}",
            wavelength
        )));
    }
    if !(min_distance.is_finite() && min_distance > 0.0) {
        return Err(DiffractionError::InvalidArgument(format!(
            "minimum distance must be positive and finite, got {}",
            min_distance
        )));
    }

    let r = distance(source, observation);
    // Negated comparison also catches NaN coordinates.
    if !(r >= min_distance) {
        return Err(DiffractionError::DegenerateGeometry {
            distance: r,
            min_distance,
        });
    }

    Ok(kernel_at(observation[2] - source[2], r, wavelength))
}

/// Kernel for a pair already known to be separated by `r > 0`.
///
/// `dz` is $z_o - z_s$. Used in the hot loops once geometry has been
/// validated for the whole plane pair.
#[inline]
pub(crate) fn kernel_at(dz: f64, r: f64, wavelength: f64) -> Complex64 {
    let factor = dz / (r * r);
    // 1/(2πr) + 1/(iλ) = 1/(2πr) − i/λ
    let radial = Complex64::new(1.0 / (2.0 * PI * r), -1.0 / wavelength);
    let spherical_wave = Complex64::cis(2.0 * PI * r / wavelength);
    factor * radial * spherical_wave
}

/// Euclidean distance between two points.
#[inline]
pub(crate) fn distance(a: &Position, b: &Position) -> f64 {
    let dx = b[0] - a[0];
    let dy = b[1] - a[1];
    let dz = b[2] - a[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}
