//! Compute backend trait and device abstraction.
//!
//! The [`ComputeBackend`] trait abstracts over execution environments (CPU,
//! GPU) so that the propagation code in `diffra-core` remains device-agnostic.
//! Every hot-path operation is a data-parallel map or reduction with no
//! ordering dependency between output elements, and each call writes into a
//! freshly allocated result.

use ndarray::{Array1, Array2};
use num_complex::Complex64;
use thiserror::Error;

/// Errors originating from compute backends.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Backend not available: {0}")]
    Unavailable(String),

    #[error("Device error: {0}")]
    DeviceError(String),

    #[error("Dimension mismatch: matrix is {rows}x{cols}, operand has {operand} rows")]
    DimensionMismatch {
        rows: usize,
        cols: usize,
        operand: usize,
    },
}

/// Describes the capabilities of a compute backend.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub backend_type: BackendType,
    pub memory_bytes: Option<usize>,
    pub compute_units: Option<usize>,
}

/// The type of compute backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Cpu,
    Gpu,
}

/// Element function evaluated independently for every `(row, col)` pair.
pub type PairFn<'a> = &'a (dyn Fn(usize, usize) -> Complex64 + Send + Sync);

/// Abstraction over compute backends.
///
/// Implementations provide device-specific execution for the pairwise
/// source/observation coupling: explicit transfer-matrix assembly, on-the-fly
/// row reductions, and transfer-matrix products.
pub trait ComputeBackend: Send + Sync {
    /// Return information about the device.
    fn device_info(&self) -> DeviceInfo;

    /// Evaluate `fill_fn(i, j)` for every entry of a `rows x cols` matrix.
    ///
    /// Used to assemble the transfer matrix between two planes once, so that
    /// later forward passes reduce to a product.
    fn parallel_matrix_fill(
        &self,
        rows: usize,
        cols: usize,
        fill_fn: PairFn<'_>,
    ) -> Result<Array2<Complex64>, ComputeError>;

    /// Compute $y_i = \sum_j f(i, j)$ for every row without storing the matrix.
    ///
    /// Rows are independent; the summation order within a row is unspecified.
    fn parallel_row_sum(
        &self,
        rows: usize,
        cols: usize,
        term_fn: PairFn<'_>,
    ) -> Result<Array1<Complex64>, ComputeError>;

    /// Complex matrix-vector product $\mathbf{y} = \mathbf{A}\mathbf{x}$ for a
    /// rectangular $\mathbf{A}$.
    fn matvec(
        &self,
        matrix: &Array2<Complex64>,
        vector: &Array1<Complex64>,
    ) -> Result<Array1<Complex64>, ComputeError>;

    /// Product $\mathbf{Y} = \mathbf{A}\mathbf{X}$ where each column of
    /// $\mathbf{X}$ is an independent input (a batch of fields).
    fn matmul(
        &self,
        matrix: &Array2<Complex64>,
        columns: &Array2<Complex64>,
    ) -> Result<Array2<Complex64>, ComputeError> {
        check_operand(matrix, columns.nrows())?;
        Ok(matrix.dot(columns))
    }
}

/// Ensure an operand with `operand_rows` rows can be multiplied by `matrix`.
pub(crate) fn check_operand(
    matrix: &Array2<Complex64>,
    operand_rows: usize,
) -> Result<(), ComputeError> {
    if matrix.ncols() != operand_rows {
        return Err(ComputeError::DimensionMismatch {
            rows: matrix.nrows(),
            cols: matrix.ncols(),
            operand: operand_rows,
        });
    }
    Ok(())
}
