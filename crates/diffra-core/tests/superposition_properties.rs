//! Integration tests: agreement between the superposition forms and the
//! physical properties every form must satisfy.
//!
//! Lengths are in units where λ = 0.652 and planes span L = 1, which keeps
//! element pitch comparable to the wavelength as in real devices.

use std::sync::Arc;

use diffra_compute::{ComputeBackend, CpuBackend};
use diffra_core::intensity_readout;
use diffra_core::propagation::superposition::{
    field_at_point, superpose, superpose_naive, transfer_matrix,
};
use diffra_core::{ComplexField, DiffractionError, PlanePropagator, SimulationParams};
use diffra_geometry::PlaneGrid;
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn params() -> SimulationParams {
    SimulationParams::with_wavelength(0.652)
}

fn random_field(size: usize, rng: &mut StdRng) -> ComplexField {
    ComplexField::from_shape_simple_fn((size, size), || {
        Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0))
    })
}

fn max_norm(field: &ComplexField) -> f64 {
    field.iter().map(|c| c.norm()).fold(0.0, f64::max)
}

fn assert_fields_close(a: &ComplexField, b: &ComplexField, rel_tol: f64) {
    assert_eq!(a.dim(), b.dim());
    let scale = max_norm(a).max(max_norm(b)).max(f64::MIN_POSITIVE);
    for ((idx, x), y) in a.indexed_iter().zip(b.iter()) {
        let err = (x - y).norm() / scale;
        assert!(err < rel_tol, "entry {:?}: {} vs {} (rel err {:.2e})", idx, x, y, err);
    }
}

#[test]
fn test_superposition_is_linear() {
    let backend = CpuBackend::new();
    let source = PlaneGrid::new(6, 1.0, 0.0).unwrap();
    let target = PlaneGrid::new(5, 1.0, 0.1).unwrap();
    let mut rng = StdRng::seed_from_u64(2018);
    let a = random_field(6, &mut rng);
    let b = random_field(6, &mut rng);

    let sum = superpose(&backend, &(&a + &b), &source, &target, &params()).unwrap();
    let ea = superpose(&backend, &a, &source, &target, &params()).unwrap();
    let eb = superpose(&backend, &b, &source, &target, &params()).unwrap();
    assert_fields_close(&sum, &(&ea + &eb), 1e-6);

    let scaled = superpose(&backend, &a.mapv(|c| c * Complex64::new(0.0, 2.0)), &source, &target, &params())
        .unwrap();
    assert_fields_close(&scaled, &ea.mapv(|c| c * Complex64::new(0.0, 2.0)), 1e-6);
}

#[test]
fn test_batched_matches_naive() {
    let backend = CpuBackend::new();
    let source = PlaneGrid::new(5, 1.0, 0.0).unwrap();
    let target = PlaneGrid::new(4, 0.8, 0.05).unwrap();
    let field = random_field(5, &mut StdRng::seed_from_u64(1));

    let naive = superpose_naive(&field, &source, &target, &params()).unwrap();
    let batched = superpose(&backend, &field, &source, &target, &params()).unwrap();
    assert_fields_close(&naive, &batched, 1e-10);
}

#[test]
fn test_transfer_matrix_product_matches_naive() {
    let backend = CpuBackend::new();
    let source = PlaneGrid::new(4, 1.0, 0.0).unwrap();
    let target = PlaneGrid::new(3, 1.0, 0.2).unwrap();
    let field = random_field(4, &mut StdRng::seed_from_u64(3));

    let matrix = transfer_matrix(&backend, &source, &target, &params()).unwrap();
    let flat: ndarray::Array1<Complex64> = field.iter().copied().collect();
    let product = matrix.dot(&flat).into_shape_with_order((3, 3)).unwrap();
    let naive = superpose_naive(&field, &source, &target, &params()).unwrap();
    assert_fields_close(&naive, &product, 1e-10);
}

#[test]
fn test_cached_and_on_the_fly_propagators_agree() {
    let backend: Arc<dyn ComputeBackend> = Arc::new(CpuBackend::new());
    let source = PlaneGrid::new(4, 1.0, 0.0).unwrap();
    let target = PlaneGrid::new(4, 1.0, 0.1).unwrap();
    let cached = PlanePropagator::new(source.clone(), target.clone(), params(), Arc::clone(&backend)).unwrap();
    let on_the_fly = PlanePropagator::new(
        source,
        target,
        SimulationParams {
            transfer_cache_limit: 0,
            ..params()
        },
        backend,
    )
    .unwrap();
    assert!(cached.is_cached());
    assert!(!on_the_fly.is_cached());

    let mut rng = StdRng::seed_from_u64(42);
    let fields: Vec<ComplexField> = (0..3).map(|_| random_field(4, &mut rng)).collect();
    for field in &fields {
        assert_fields_close(
            &cached.propagate(field).unwrap(),
            &on_the_fly.propagate(field).unwrap(),
            1e-10,
        );
    }

    let batch = cached.propagate_batch(&fields).unwrap();
    let batch_fly = on_the_fly.propagate_batch(&fields).unwrap();
    for ((field, a), b) in fields.iter().zip(&batch).zip(&batch_fly) {
        assert_fields_close(a, &cached.propagate(field).unwrap(), 1e-10);
        assert_fields_close(a, b, 1e-10);
    }
}

#[test]
fn test_field_at_point_matches_plane_result() {
    let backend = CpuBackend::new();
    let source = PlaneGrid::new(3, 1.0, 0.0).unwrap();
    let target = PlaneGrid::new(3, 1.0, 0.3).unwrap();
    let field = random_field(3, &mut StdRng::seed_from_u64(9));

    let plane = superpose(&backend, &field, &source, &target, &params()).unwrap();
    let point = field_at_point(&target.position(2, 0), &source, &field, &params()).unwrap();
    assert!((plane[[2, 0]] - point).norm() < 1e-12 * point.norm().max(1.0));
}

/// N = 2, L = 2: centres at {0.5, 1.5}. One lit source cell at z = 0,
/// detector at z = 1.
#[test]
fn test_single_source_falls_off_radially() {
    let backend = CpuBackend::new();
    let source = PlaneGrid::new(2, 2.0, 0.0).unwrap();
    let detector = PlaneGrid::new(2, 2.0, 1.0).unwrap();
    assert_eq!(source.position(0, 0), [0.5, 0.5, 0.0]);
    assert_eq!(detector.position(1, 1), [1.5, 1.5, 1.0]);

    let mut field = ComplexField::zeros((2, 2));
    field[[0, 0]] = Complex64::new(1.0, 0.0);

    let out = superpose(&backend, &field, &source, &detector, &params()).unwrap();
    let above = out[[0, 0]].norm();
    let opposite = out[[1, 1]].norm();
    assert!(above > opposite, "above {} should exceed diagonal {}", above, opposite);
    // The two off-diagonal cells are equidistant from the source
    assert!((out[[0, 1]] - out[[1, 0]]).norm() < 1e-14);

    let intensity = intensity_readout(&out).unwrap();
    assert_eq!(intensity[[0, 0]], 1.0);

    // A dark source gives a dark detector, which cannot be normalised
    let dark = superpose(&backend, &ComplexField::zeros((2, 2)), &source, &detector, &params()).unwrap();
    assert!(dark.iter().all(|c| c.norm() == 0.0));
    let err = intensity_readout(&dark).unwrap_err();
    assert!(matches!(err, DiffractionError::ZeroField));
}

#[test]
fn test_coincident_planes_fail_without_output() {
    let backend = CpuBackend::new();
    let grid = PlaneGrid::new(3, 1.0, 0.5).unwrap();
    let field = ComplexField::from_elem((3, 3), Complex64::new(1.0, 0.0));

    for result in [
        superpose(&backend, &field, &grid, &grid, &params()),
        superpose_naive(&field, &grid, &grid, &params()),
    ] {
        let err = result.unwrap_err();
        assert!(err.is_domain_error(), "unexpected error {:?}", err);
    }
    assert!(transfer_matrix(&backend, &grid, &grid, &params()).is_err());
}

#[test]
fn test_input_errors_are_not_domain_errors() {
    let backend = CpuBackend::new();
    let source = PlaneGrid::new(2, 1.0, 0.0).unwrap();
    let target = PlaneGrid::new(2, 1.0, 0.1).unwrap();

    let wrong_shape = ComplexField::zeros((3, 2));
    let err = superpose(&backend, &wrong_shape, &source, &target, &params()).unwrap_err();
    assert!(matches!(err, DiffractionError::ShapeMismatch { expected: 2, rows: 3, cols: 2 }));

    let mut nan = ComplexField::zeros((2, 2));
    nan[[1, 1]] = Complex64::new(0.0, f64::NAN);
    let err = superpose(&backend, &nan, &source, &target, &params()).unwrap_err();
    assert!(matches!(err, DiffractionError::InvalidArgument(_)));

    let bad_lambda = SimulationParams::with_wavelength(-1.0);
    let err = superpose(&backend, &ComplexField::zeros((2, 2)), &source, &target, &bad_lambda).unwrap_err();
    assert!(!err.is_domain_error());
}
