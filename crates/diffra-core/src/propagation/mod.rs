//! Free-space propagation between parallel planes.
//!
//! [`kernel`] holds the closed-form point-to-point coupling and
//! [`superposition`] sums it over whole planes. [`PlanePropagator`] binds a
//! source and target grid to a compute backend and, when small enough, keeps
//! the assembled transfer matrix so that repeated forward passes reduce to a
//! matrix product.

pub mod kernel;
pub mod superposition;

use std::fmt;
use std::sync::Arc;

use diffra_compute::{ComputeBackend, ComputeError};
use diffra_geometry::{GeometryError, PlaneGrid};
use ndarray::{Array2, Axis};
use num_complex::Complex64;
use thiserror::Error;

use crate::types::{ComplexField, SimulationParams};

/// Errors raised by the diffraction model.
#[derive(Debug, Error)]
pub enum DiffractionError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Degenerate geometry: points {distance:.3e} m apart (minimum {min_distance:.3e} m)")]
    DegenerateGeometry { distance: f64, min_distance: f64 },

    #[error("Field is zero everywhere; intensity cannot be normalised")]
    ZeroField,

    #[error("Field shape {rows}x{cols} does not match {expected}x{expected} grid")]
    ShapeMismatch {
        expected: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Compute backend error: {0}")]
    Compute(#[from] ComputeError),
}

impl DiffractionError {
    /// True for failures inherent to the physical configuration (coincident
    /// points, an unlit detector) rather than to malformed input.
    pub fn is_domain_error(&self) -> bool {
        matches!(
            self,
            DiffractionError::DegenerateGeometry { .. } | DiffractionError::ZeroField
        )
    }
}

/// Propagates fields from one plane grid to another.
pub struct PlanePropagator {
    source: PlaneGrid,
    target: PlaneGrid,
    params: SimulationParams,
    backend: Arc<dyn ComputeBackend>,
    transfer: Option<Array2<Complex64>>,
}

impl PlanePropagator {
    /// Bind two planes to a backend.
    ///
    /// Fails if the parameters are invalid or any source/target pair is
    /// closer than `params.min_distance`. The transfer matrix is assembled
    /// here when it holds at most `params.transfer_cache_limit` entries.
    pub fn new(
        source: PlaneGrid,
        target: PlaneGrid,
        params: SimulationParams,
        backend: Arc<dyn ComputeBackend>,
    ) -> Result<Self, DiffractionError> {
        params.validate()?;
        superposition::check_separation(&source, &target, params.min_distance)?;

        let entries = source.len().saturating_mul(target.len());
        let transfer = if entries <= params.transfer_cache_limit {
            Some(superposition::transfer_matrix_prechecked(
                backend.as_ref(),
                &source,
                &target,
                params.wavelength,
            )?)
        } else {
            None
        };

        log::debug!(
            "Propagator z={:.4e} -> z={:.4e}: {}x{} -> {}x{} on {}, transfer {}",
            source.z(),
            target.z(),
            source.size(),
            source.size(),
            target.size(),
            target.size(),
            backend.device_info().name,
            if transfer.is_some() { "cached" } else { "on the fly" }
        );

        Ok(Self {
            source,
            target,
            params,
            backend,
            transfer,
        })
    }

    /// Propagate one field from the source plane to the target plane.
    pub fn propagate(&self, field: &ComplexField) -> Result<ComplexField, DiffractionError> {
        superposition::check_field(field, self.source.size())?;
        match &self.transfer {
            Some(matrix) => {
                let out = self.backend.matvec(matrix, &superposition::flatten(field))?;
                superposition::unflatten(out, self.target.size())
            }
            None => superposition::superpose_prechecked(
                self.backend.as_ref(),
                field,
                &self.source,
                &self.target,
                self.params.wavelength,
            ),
        }
    }

    /// Propagate a batch of fields. All-or-nothing: any invalid field fails
    /// the whole batch.
    pub fn propagate_batch(
        &self,
        fields: &[ComplexField],
    ) -> Result<Vec<ComplexField>, DiffractionError> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        let Some(matrix) = &self.transfer else {
            return fields.iter().map(|f| self.propagate(f)).collect();
        };

        let k2 = self.source.len();
        let mut columns = Array2::<Complex64>::zeros((k2, fields.len()));
        for (b, field) in fields.iter().enumerate() {
            superposition::check_field(field, self.source.size())?;
            columns
                .column_mut(b)
                .assign(&superposition::flatten(field));
        }

        let out = self.backend.matmul(matrix, &columns)?;
        out.axis_iter(Axis(1))
            .map(|col| superposition::unflatten(col.to_owned(), self.target.size()))
            .collect()
    }

    pub fn source(&self) -> &PlaneGrid {
        &self.source
    }

    pub fn target(&self) -> &PlaneGrid {
        &self.target
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn backend(&self) -> &Arc<dyn ComputeBackend> {
        &self.backend
    }

    /// Whether the transfer matrix was assembled and kept.
    pub fn is_cached(&self) -> bool {
        self.transfer.is_some()
    }

    /// The cached $K^2 \times N^2$ transfer matrix (target rows, source
    /// columns), if any.
    pub fn transfer_matrix(&self) -> Option<&Array2<Complex64>> {
        self.transfer.as_ref()
    }
}

impl fmt::Debug for PlanePropagator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanePropagator")
            .field("source_z", &self.source.z())
            .field("target_z", &self.target.z())
            .field("source_size", &self.source.size())
            .field("target_size", &self.target.size())
            .field("params", &self.params)
            .field("backend", &self.backend.device_info().name)
            .field("cached", &self.is_cached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diffra_compute::CpuBackend;

    fn cpu() -> Arc<dyn ComputeBackend> {
        Arc::new(CpuBackend::new())
    }

    fn planes() -> (PlaneGrid, PlaneGrid) {
        (
            PlaneGrid::new(3, 1.0, 0.0).unwrap(),
            PlaneGrid::new(2, 1.0, 0.1).unwrap(),
        )
    }

    #[test]
    fn test_cache_respects_limit() {
        let (source, target) = planes();
        let params = SimulationParams::with_wavelength(0.652);
        let cached = PlanePropagator::new(source.clone(), target.clone(), params.clone(), cpu()).unwrap();
        assert!(cached.is_cached());
        let matrix = cached.transfer_matrix().unwrap();
        // 2x2 target rows, 3x3 source columns.
        assert_eq!(matrix.dim(), (4, 9));

        let tight = SimulationParams {
            transfer_cache_limit: 35,
            ..params
        };
        let uncached = PlanePropagator::new(source, target, tight, cpu()).unwrap();
        assert!(!uncached.is_cached());
    }

    #[test]
    fn test_coplanar_planes_rejected() {
        let grid = PlaneGrid::new(2, 1.0, 0.0).unwrap();
        let err = PlanePropagator::new(grid.clone(), grid, SimulationParams::with_wavelength(0.652), cpu())
            .unwrap_err();
        assert!(matches!(err, DiffractionError::DegenerateGeometry { .. }));
    }

    #[test]
    fn test_wrong_field_shape_rejected() {
        let (source, target) = planes();
        let prop = PlanePropagator::new(source, target, SimulationParams::with_wavelength(0.652), cpu()).unwrap();
        let field = ComplexField::zeros((2, 2));
        match prop.propagate(&field) {
            Err(DiffractionError::ShapeMismatch { expected, rows, cols }) => {
                assert_eq!((expected, rows, cols), (3, 2, 2));
            }
            other => panic!("Expected shape mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_batch() {
        let (source, target) = planes();
        let prop = PlanePropagator::new(source, target, SimulationParams::with_wavelength(0.652), cpu()).unwrap();
        assert!(prop.propagate_batch(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_error_classification() {
        assert!(DiffractionError::ZeroField.is_domain_error());
        assert!(!DiffractionError::InvalidArgument("x".into()).is_domain_error());
        let geom: DiffractionError = GeometryError::InvalidSize(0).into();
        assert!(!geom.is_domain_error());
    }
}
