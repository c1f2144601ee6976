//! Coherent superposition of point-source contributions.
//!
//! The field at observation point $o$ radiated by a source plane with
//! complex amplitudes $a_s$ is
//!
//! $$
//! E_o = \sum_s w(\mathbf{r}_s, \mathbf{r}_o)\, a_s
//! $$
//!
//! Over whole planes this is a dense $K^2 \times N^2$ coupling. Three
//! equivalent evaluations are provided:
//!
//! - [`superpose_naive`]: nested loops over sources then observers. Slow,
//!   kept as the reference the others are checked against.
//! - [`superpose`]: one independent reduction per observation point on a
//!   [`ComputeBackend`], without storing the coupling.
//! - [`transfer_matrix`]: the coupling assembled explicitly, so that fields
//!   over fixed geometry propagate by a single matrix-vector product.
//!
//! Every form validates geometry for the whole plane pair before evaluating
//! anything, so failures never leave partial output behind.

use diffra_compute::ComputeBackend;
use diffra_geometry::{PlaneGrid, Position};
use ndarray::{Array1, Array2};
use num_complex::Complex64;

use super::kernel::{distance, kernel_at, rayleigh_sommerfeld};
use super::DiffractionError;
use crate::types::{ComplexField, SimulationParams};

/// Total field at one observation point from every element of `source`.
///
/// Terms are summed in row-major source order.
pub fn field_at_point(
    observation: &Position,
    source: &PlaneGrid,
    field: &ComplexField,
    params: &SimulationParams,
) -> Result<Complex64, DiffractionError> {
    params.validate()?;
    check_field(field, source.size())?;

    let mut total = Complex64::new(0.0, 0.0);
    for (pos, amplitude) in source.positions().iter().zip(field.iter()) {
        let w = rayleigh_sommerfeld(pos, observation, params.wavelength, params.min_distance)?;
        total += w * amplitude;
    }
    Ok(total)
}

/// Reference double loop: for each source element, add its contribution to
/// every observation point.
pub fn superpose_naive(
    field: &ComplexField,
    source: &PlaneGrid,
    target: &PlaneGrid,
    params: &SimulationParams,
) -> Result<ComplexField, DiffractionError> {
    params.validate()?;
    check_field(field, source.size())?;

    let mut out = ComplexField::zeros((target.size(), target.size()));
    for (src, amplitude) in source.positions().iter().zip(field.iter()) {
        for (obs, acc) in target.positions().iter().zip(out.iter_mut()) {
            let w = rayleigh_sommerfeld(src, obs, params.wavelength, params.min_distance)?;
            *acc += w * amplitude;
        }
    }
    Ok(out)
}

/// Batched superposition of a whole source plane onto a whole target plane.
///
/// Each observation point is an independent reduction over the source
/// elements; `backend` decides how those reductions are scheduled.
pub fn superpose(
    backend: &dyn ComputeBackend,
    field: &ComplexField,
    source: &PlaneGrid,
    target: &PlaneGrid,
    params: &SimulationParams,
) -> Result<ComplexField, DiffractionError> {
    params.validate()?;
    check_field(field, source.size())?;
    check_separation(source, target, params.min_distance)?;
    superpose_prechecked(backend, field, source, target, params.wavelength)
}

/// Assemble the $K^2 \times N^2$ transfer matrix $T_{os} = w(\mathbf{r}_s, \mathbf{r}_o)$.
///
/// Rows follow the target's row-major element order, columns the source's.
pub fn transfer_matrix(
    backend: &dyn ComputeBackend,
    source: &PlaneGrid,
    target: &PlaneGrid,
    params: &SimulationParams,
) -> Result<Array2<Complex64>, DiffractionError> {
    params.validate()?;
    check_separation(source, target, params.min_distance)?;
    transfer_matrix_prechecked(backend, source, target, params.wavelength)
}

/// Ensure no source/target pair is closer than `min_distance`.
///
/// Planes further apart along $z$ than `min_distance` pass immediately. For
/// nearer planes every pair is checked, and the closest offending pair is
/// reported.
pub fn check_separation(
    source: &PlaneGrid,
    target: &PlaneGrid,
    min_distance: f64,
) -> Result<(), DiffractionError> {
    if source.separation(target) >= min_distance {
        return Ok(());
    }

    let mut closest = f64::INFINITY;
    for src in source.positions() {
        for obs in target.positions() {
            closest = closest.min(distance(src, obs));
        }
    }
    if closest < min_distance {
        return Err(DiffractionError::DegenerateGeometry {
            distance: closest,
            min_distance,
        });
    }
    Ok(())
}

/// On-the-fly superposition for geometry already passed through
/// [`check_separation`] and a field already passed through [`check_field`].
pub(crate) fn superpose_prechecked(
    backend: &dyn ComputeBackend,
    field: &ComplexField,
    source: &PlaneGrid,
    target: &PlaneGrid,
    wavelength: f64,
) -> Result<ComplexField, DiffractionError> {
    let amplitudes = flatten(field);
    let sources = source.positions();
    let observers = target.positions();
    let dz = target.z() - source.z();

    let term = |o: usize, s: usize| {
        let a = amplitudes[s];
        if a == Complex64::new(0.0, 0.0) {
            return a;
        }
        kernel_at(dz, distance(&sources[s], &observers[o]), wavelength) * a
    };
    let out = backend.parallel_row_sum(observers.len(), sources.len(), &term)?;
    unflatten(out, target.size())
}

pub(crate) fn transfer_matrix_prechecked(
    backend: &dyn ComputeBackend,
    source: &PlaneGrid,
    target: &PlaneGrid,
    wavelength: f64,
) -> Result<Array2<Complex64>, DiffractionError> {
    let sources = source.positions();
    let observers = target.positions();
    let dz = target.z() - source.z();

    let entry = |o: usize, s: usize| kernel_at(dz, distance(&sources[s], &observers[o]), wavelength);
    Ok(backend.parallel_matrix_fill(observers.len(), sources.len(), &entry)?)
}

/// Reject fields that are not `size × size` or contain NaN/Inf.
pub(crate) fn check_field(field: &ComplexField, size: usize) -> Result<(), DiffractionError> {
    let (rows, cols) = field.dim();
    if rows != size || cols != size {
        return Err(DiffractionError::ShapeMismatch {
            expected: size,
            rows,
            cols,
        });
    }
    if let Some(((i, j), bad)) = field.indexed_iter().find(|(_, c)| !c.is_finite()) {
        return Err(DiffractionError::InvalidArgument(format!(
            "field entry [{}][{}] is not finite: {}",
            i, j, bad
        )));
    }
    Ok(())
}

/// Field in row-major element order.
pub(crate) fn flatten(field: &ComplexField) -> Array1<Complex64> {
    field.iter().copied().collect()
}

pub(crate) fn unflatten(
    values: Array1<Complex64>,
    size: usize,
) -> Result<ComplexField, DiffractionError> {
    let len = values.len();
    values.into_shape_with_order((size, size)).map_err(|_| {
        DiffractionError::InvalidArgument(format!(
            "{} values cannot form a {}x{} field",
            len, size, size
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use diffra_compute::CpuBackend;

    fn params() -> SimulationParams {
        SimulationParams::with_wavelength(0.652)
    }

    #[test]
    fn test_single_source_equals_kernel() {
        let source = PlaneGrid::new(2, 2.0, 0.0).unwrap();
        let mut field = ComplexField::zeros((2, 2));
        field[[1, 0]] = Complex64::new(0.5, -0.5);
        let obs = [0.3, 1.2, 0.7];

        let total = field_at_point(&obs, &source, &field, &params()).unwrap();
        let w = rayleigh_sommerfeld(&source.position(1, 0), &obs, 0.652, 1e-12).unwrap();
        let expected = w * Complex64::new(0.5, -0.5);
        assert_abs_diff_eq!(total.re, expected.re, epsilon = 1e-14);
        assert_abs_diff_eq!(total.im, expected.im, epsilon = 1e-14);
    }

    #[test]
    fn test_naive_matches_field_at_point() {
        let source = PlaneGrid::new(3, 1.0, 0.0).unwrap();
        let target = PlaneGrid::new(2, 1.0, 0.2).unwrap();
        let field = ComplexField::from_shape_fn((3, 3), |(i, j)| {
            Complex64::from_polar(1.0 + i as f64, 0.3 * j as f64)
        });

        let out = superpose_naive(&field, &source, &target, &params()).unwrap();
        for i in 0..2 {
            for j in 0..2 {
                let point = field_at_point(&target.position(i, j), &source, &field, &params()).unwrap();
                assert_abs_diff_eq!(out[[i, j]].re, point.re, epsilon = 1e-12);
                assert_abs_diff_eq!(out[[i, j]].im, point.im, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_transfer_matrix_layout() {
        let backend = CpuBackend::new();
        let source = PlaneGrid::new(2, 1.0, 0.0).unwrap();
        let target = PlaneGrid::new(3, 1.5, 0.4).unwrap();
        let matrix = transfer_matrix(&backend, &source, &target, &params()).unwrap();
        assert_eq!(matrix.dim(), (9, 4));

        let w = rayleigh_sommerfeld(&source.position(0, 1), &target.position(2, 1), 0.652, 1e-12).unwrap();
        let entry = matrix[[2 * 3 + 1, 1]];
        assert_abs_diff_eq!(entry.re, w.re, epsilon = 1e-14);
        assert_abs_diff_eq!(entry.im, w.im, epsilon = 1e-14);
    }

    #[test]
    fn test_separation_fast_path_and_scan() {
        let a = PlaneGrid::new(2, 1.0, 0.0).unwrap();
        let b = PlaneGrid::new(2, 1.0, 0.1).unwrap();
        assert!(check_separation(&a, &b, 1e-12).is_ok());

        // Coplanar grids: the single centre (0.5, 0.5) is 0.25·√2 from every 2x2 centre
        let c = PlaneGrid::new(1, 1.0, 0.0).unwrap();
        assert!(check_separation(&a, &c, 0.1).is_ok());
        match check_separation(&a, &c, 0.5) {
            Err(DiffractionError::DegenerateGeometry { distance, .. }) => {
                assert_abs_diff_eq!(distance, 0.25 * 2f64.sqrt(), epsilon = 1e-15);
            }
            other => panic!("Expected degenerate geometry, got {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_field_rejected() {
        let source = PlaneGrid::new(2, 1.0, 0.0).unwrap();
        let target = PlaneGrid::new(2, 1.0, 0.1).unwrap();
        let mut field = ComplexField::zeros((2, 2));
        field[[0, 1]] = Complex64::new(f64::INFINITY, 0.0);
        let err = superpose_naive(&field, &source, &target, &params()).unwrap_err();
        assert!(matches!(err, DiffractionError::InvalidArgument(_)));
    }

    #[test]
    fn test_flatten_is_row_major() {
        let field = ComplexField::from_shape_fn((2, 2), |(i, j)| Complex64::new((i * 2 + j) as f64, 0.0));
        let flat = flatten(&field);
        for (k, v) in flat.iter().enumerate() {
            assert_eq!(v.re, k as f64);
        }
        assert_eq!(unflatten(flat, 2).unwrap(), field);
    }
}
